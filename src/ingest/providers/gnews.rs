// src/ingest/providers/gnews.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Deserialize;
use std::time::Duration;

use crate::ingest::types::{CandidateArticle, NewsSource};

const BASE_URL: &str = "https://gnews.io/api/v4/search";
const MAX_PER_TOPIC: usize = 10;

/// (sector slug, search query). The two groups run on alternating cycles so
/// the daily call volume stays under the provider's free-tier ceiling.
pub const WORLD_TOPICS: [(&str, &str); 7] = [
    ("asia", "asia finance OR economy"),
    ("europe", "europe finance OR economy"),
    ("india", "india finance OR economy"),
    ("china", "china finance OR economy"),
    ("japan", "japan finance OR economy"),
    ("americas", "americas finance OR economy"),
    ("war", "war sanctions economy impact"),
];

pub const MARKET_TOPICS: [(&str, &str); 6] = [
    ("stocks", "stock market earnings"),
    ("crypto", "cryptocurrency bitcoin market"),
    ("bonds", "bond market treasury yields"),
    ("currency", "currency exchange forex"),
    ("etfs", "ETF exchange traded funds"),
    ("indices", "stock index S&P OR Nasdaq OR Dow"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicGroup {
    World,
    Markets,
}

impl TopicGroup {
    pub fn other(self) -> Self {
        match self {
            TopicGroup::World => TopicGroup::Markets,
            TopicGroup::Markets => TopicGroup::World,
        }
    }

    fn topics(self) -> &'static [(&'static str, &'static str)] {
        match self {
            TopicGroup::World => &WORLD_TOPICS,
            TopicGroup::Markets => &MARKET_TOPICS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    articles: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    image: Option<String>,
    #[serde(rename = "publishedAt", default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    source: Option<SearchItemSource>,
}

#[derive(Debug, Deserialize)]
struct SearchItemSource {
    #[serde(default)]
    name: String,
}

pub struct GnewsProvider {
    http: reqwest::Client,
    api_key: String,
    group: TopicGroup,
}

impl GnewsProvider {
    pub fn new(api_key: String, group: TopicGroup) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            group,
        }
    }

    async fn topic_news(&self, slug: &str, query: &str) -> Result<Vec<CandidateArticle>> {
        let max = MAX_PER_TOPIC.to_string();
        let body: SearchResponse = self
            .http
            .get(BASE_URL)
            .query(&[
                ("q", query),
                ("lang", "en"),
                ("max", max.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .context("gnews request")?
            .error_for_status()
            .context("gnews status")?
            .json()
            .await
            .context("gnews body")?;

        Ok(body
            .articles
            .into_iter()
            .filter(|item| !item.url.is_empty())
            .map(|item| CandidateArticle {
                gnews_url: Some(item.url.clone()),
                original_url: item.url,
                headline: item.title,
                snippet: {
                    let d = item.description.trim();
                    (!d.is_empty()).then(|| d.to_string())
                },
                source_name: item.source.map(|s| s.name).unwrap_or_default(),
                image_url: item.image.filter(|i| !i.trim().is_empty()),
                published_at: item.published_at,
                region: Some(slug.to_string()),
                ..Default::default()
            })
            .collect())
    }
}

#[async_trait]
impl NewsSource for GnewsProvider {
    /// One query per topic in this provider's group, sequential on purpose —
    /// the ceiling is daily volume, not latency. Topic failures are isolated.
    async fn fetch_latest(&self) -> Result<Vec<CandidateArticle>> {
        let mut out = Vec::new();
        for (slug, query) in self.group.topics() {
            match self.topic_news(slug, query).await {
                Ok(mut v) => out.append(&mut v),
                Err(e) => {
                    tracing::warn!(error = ?e, topic = slug, "gnews topic fetch failed");
                    counter!("ingest_provider_errors_total").increment(1);
                }
            }
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        match self.group {
            TopicGroup::World => "GNews/world",
            TopicGroup::Markets => "GNews/markets",
        }
    }
}
