// src/ingest/providers/finnhub.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::future::join_all;
use metrics::counter;
use serde::Deserialize;
use std::time::Duration;

use crate::ingest::types::{CandidateArticle, NewsSource};

const BASE_URL: &str = "https://finnhub.io/api/v1";

pub const TOP_TICKERS: [&str; 20] = [
    "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA", "BRK.B", "JPM", "V", "JNJ", "WMT",
    "PG", "MA", "UNH", "HD", "DIS", "BAC", "XOM", "NFLX",
];

const NEWS_CATEGORIES: [&str; 4] = ["general", "forex", "crypto", "merger"];

const PAYWALLED_SOURCES: [&str; 6] = [
    "MarketWatch",
    "SeekingAlpha",
    "Bloomberg",
    "Barron's",
    "WSJ",
    "Financial Times",
];

// Sources where Finnhub proxies/hides the real URL (returns finnhub.io links)
const BROKEN_URL_SOURCES: [&str; 6] = [
    "Yahoo",
    "Motley Fool",
    "Business Insider",
    "Forbes",
    "ChartMill",
    "Benzinga",
];

// Press releases / wire services, not journalism
const WIRE_SOURCES: [&str; 5] = [
    "GlobalNewswire",
    "BusinessWire",
    "PR Newswire",
    "GlobeNewsWire",
    "Cryptocurrency News",
];

const BROKEN_IMAGE_HOSTS: [&str; 4] = [
    "s.yimg.com",
    "media.zenfs.com",
    "static.finnhub.io",
    "static2.finnhub.io",
];

// Per-ticker scan/keep caps for the 7-day company-news window
const COMPANY_NEWS_SCAN: usize = 10;
const COMPANY_NEWS_KEEP: usize = 5;

fn is_blocked_source(source: &str) -> bool {
    PAYWALLED_SOURCES
        .iter()
        .chain(BROKEN_URL_SOURCES.iter())
        .chain(WIRE_SOURCES.iter())
        .any(|s| *s == source)
}

/// Null out image URLs on CDNs that no longer resolve for hotlinking.
fn clean_image_url(url: Option<&str>) -> Option<String> {
    let url = url?.trim();
    if url.is_empty() || BROKEN_IMAGE_HOSTS.iter().any(|h| url.contains(h)) {
        return None;
    }
    Some(url.to_string())
}

#[derive(Debug, Deserialize)]
struct NewsItem {
    id: Option<i64>,
    #[serde(default)]
    datetime: i64,
    #[serde(default)]
    headline: String,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    source: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    url: String,
}

fn normalize_item(item: NewsItem, ticker: Option<&str>) -> Option<CandidateArticle> {
    let id = item.id?;
    if is_blocked_source(&item.source) {
        return None;
    }
    // finnhub.io URLs are unresolved proxy links
    if item.url.is_empty() || item.url.contains("finnhub.io") {
        return None;
    }
    if item.datetime <= 0 {
        return None;
    }
    let published_at = Utc.timestamp_opt(item.datetime, 0).single()?;
    let snippet = {
        let s = item.summary.trim();
        (!s.is_empty()).then(|| s.to_string())
    };
    Some(CandidateArticle {
        finnhub_id: Some(id.to_string()),
        original_url: item.url,
        headline: item.headline,
        snippet,
        source_name: item.source,
        image_url: clean_image_url(item.image.as_deref()),
        published_at: Some(published_at),
        tickers: ticker.map(|t| vec![t.to_string()]).unwrap_or_default(),
        ..Default::default()
    })
}

pub struct FinnhubProvider {
    http: reqwest::Client,
    api_key: String,
}

impl FinnhubProvider {
    pub fn new(api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .expect("reqwest client");
        Self { http, api_key }
    }

    async fn category_news(&self, category: &str) -> Result<Vec<CandidateArticle>> {
        let items: Vec<NewsItem> = self
            .http
            .get(format!("{BASE_URL}/news"))
            .query(&[
                ("category", category),
                ("minId", "0"),
                ("token", self.api_key.as_str()),
            ])
            .send()
            .await
            .context("finnhub news request")?
            .error_for_status()
            .context("finnhub news status")?
            .json()
            .await
            .context("finnhub news body")?;
        Ok(items
            .into_iter()
            .filter_map(|it| normalize_item(it, None))
            .collect())
    }

    async fn company_news(&self, ticker: &str) -> Result<Vec<CandidateArticle>> {
        let today = Utc::now().date_naive();
        let week_ago = today - chrono::Days::new(7);
        let items: Vec<NewsItem> = self
            .http
            .get(format!("{BASE_URL}/company-news"))
            .query(&[
                ("symbol", ticker),
                ("from", &week_ago.to_string()),
                ("to", &today.to_string()),
                ("token", self.api_key.as_str()),
            ])
            .send()
            .await
            .context("finnhub company-news request")?
            .error_for_status()
            .context("finnhub company-news status")?
            .json()
            .await
            .context("finnhub company-news body")?;
        Ok(items
            .into_iter()
            .take(COMPANY_NEWS_SCAN)
            .filter_map(|it| normalize_item(it, Some(ticker)))
            .take(COMPANY_NEWS_KEEP)
            .collect())
    }
}

#[async_trait]
impl NewsSource for FinnhubProvider {
    /// Categories plus the watch list, all fetched concurrently. A failing
    /// category or ticker is logged and never aborts its siblings.
    async fn fetch_latest(&self) -> Result<Vec<CandidateArticle>> {
        let categories = join_all(NEWS_CATEGORIES.iter().map(|c| self.category_news(c)));
        let companies = join_all(TOP_TICKERS.iter().map(|t| self.company_news(t)));
        let (category_results, company_results) = tokio::join!(categories, companies);

        let mut out = Vec::new();
        for (category, result) in NEWS_CATEGORIES.iter().zip(category_results) {
            match result {
                Ok(mut v) => out.append(&mut v),
                Err(e) => {
                    tracing::warn!(error = ?e, category, "finnhub category fetch failed");
                    counter!("ingest_provider_errors_total").increment(1);
                }
            }
        }
        for (ticker, result) in TOP_TICKERS.iter().zip(company_results) {
            match result {
                Ok(mut v) => out.append(&mut v),
                Err(e) => {
                    tracing::warn!(error = ?e, ticker, "finnhub company fetch failed");
                    counter!("ingest_provider_errors_total").increment(1);
                }
            }
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "Finnhub"
    }
}
