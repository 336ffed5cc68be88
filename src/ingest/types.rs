// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::store::NaturalKeys;

/// Normalized article record produced by a source adapter, before dedup and
/// persistence. Carries whichever natural key(s) the provider supports.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CandidateArticle {
    pub finnhub_id: Option<String>,
    pub gnews_url: Option<String>,
    pub original_url: String,
    pub headline: String,
    pub snippet: Option<String>,
    pub source_name: String,
    pub image_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Topic slug hint used for sector pre-tagging at ingestion time.
    pub region: Option<String>,
    /// Watch-list symbols the provider associated with the item.
    pub tickers: Vec<String>,
}

impl CandidateArticle {
    pub fn keys(&self) -> NaturalKeys {
        NaturalKeys {
            finnhub_id: self.finnhub_id.clone(),
            gnews_url: self.gnews_url.clone(),
            original_url: Some(self.original_url.clone()),
        }
    }
}

#[async_trait::async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<CandidateArticle>>;
    fn name(&self) -> &'static str;
}
