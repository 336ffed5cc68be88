// src/ingest/providers/rss.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::future::join_all;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::ingest::feeds::FeedSpec;
use crate::ingest::types::{CandidateArticle, NewsSource};
use crate::ingest::{strip_html, truncate_chars};

const MAX_ITEMS_PER_FEED: usize = 15;
const SNIPPET_MAX_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "thumbnail", default)]
    media_thumbnails: Vec<MediaRef>,
    #[serde(rename = "content", default)]
    media_contents: Vec<MediaRef>,
    #[serde(rename = "enclosure", default)]
    enclosures: Vec<MediaRef>,
}

#[derive(Debug, Deserialize)]
struct MediaRef {
    #[serde(rename = "@url")]
    url: Option<String>,
    #[serde(rename = "@type")]
    mime: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    // Feeds still ship the obsolete zone names RFC 2822 deprecated.
    let ts = ts.trim();
    let normalized = ts
        .strip_suffix(" GMT")
        .or_else(|| ts.strip_suffix(" UT"))
        .or_else(|| ts.strip_suffix(" UTC"))
        .or_else(|| ts.strip_suffix(" Z"))
        .map(|base| format!("{base} +0000"))
        .unwrap_or_else(|| ts.to_string());
    OffsetDateTime::parse(&normalized, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC))
        .and_then(|dt| Utc.timestamp_opt(dt.unix_timestamp(), 0).single())
}

/// Image URL from media tags or enclosures, in that order. A media:content
/// without a type is assumed to be an image, matching how feeds ship them.
fn extract_image(item: &Item) -> Option<String> {
    for media in &item.media_thumbnails {
        if let Some(url) = media.url.as_deref() {
            return Some(url.to_string());
        }
    }
    for media in &item.media_contents {
        let is_image = media.mime.as_deref().map_or(true, |m| m.contains("image"));
        if is_image {
            if let Some(url) = media.url.as_deref() {
                return Some(url.to_string());
            }
        }
    }
    for enc in &item.enclosures {
        if enc.mime.as_deref().is_some_and(|m| m.starts_with("image")) {
            if let Some(url) = enc.url.as_deref() {
                return Some(url.to_string());
            }
        }
    }
    None
}

// Feeds routinely embed HTML entities that are not valid XML entities.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

fn parse_feed_str(source_name: &str, xml: &str) -> Result<Vec<CandidateArticle>> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

    let mut out = Vec::new();
    for item in rss.channel.items.into_iter().take(MAX_ITEMS_PER_FEED) {
        let link = item.link.as_deref().unwrap_or_default().trim().to_string();
        let headline = item.title.as_deref().unwrap_or_default().trim().to_string();
        if link.is_empty() || headline.is_empty() {
            continue;
        }

        let snippet = item
            .description
            .as_deref()
            .map(strip_html)
            .map(|s| truncate_chars(&s, SNIPPET_MAX_CHARS))
            .filter(|s| !s.is_empty());

        out.push(CandidateArticle {
            original_url: link,
            headline,
            snippet,
            source_name: source_name.to_string(),
            image_url: extract_image(&item),
            published_at: item.pub_date.as_deref().and_then(parse_rfc2822),
            ..Default::default()
        });
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("ingest_parse_ms").record(ms);
    Ok(out)
}

pub struct RssProvider {
    http: reqwest::Client,
    feeds: Vec<FeedSpec>,
}

impl RssProvider {
    pub fn new(feeds: Vec<FeedSpec>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("finlit-news-engine/0.1 news fetcher")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self { http, feeds }
    }

    async fn fetch_feed(&self, feed: &FeedSpec) -> Result<Vec<CandidateArticle>> {
        let body = self
            .http
            .get(&feed.url)
            .send()
            .await
            .context("rss feed request")?
            .error_for_status()
            .context("rss feed status")?
            .text()
            .await
            .context("rss feed body")?;
        parse_feed_str(&feed.name, &body)
    }
}

#[async_trait]
impl NewsSource for RssProvider {
    /// All feeds fetched concurrently; a broken feed never takes down the
    /// rest of the fleet.
    async fn fetch_latest(&self) -> Result<Vec<CandidateArticle>> {
        let results = join_all(self.feeds.iter().map(|f| self.fetch_feed(f))).await;
        let mut out = Vec::new();
        for (feed, result) in self.feeds.iter().zip(results) {
            match result {
                Ok(mut v) => out.append(&mut v),
                Err(e) => {
                    tracing::warn!(error = ?e, feed = feed.name.as_str(), "rss feed failed");
                    counter!("ingest_provider_errors_total").increment(1);
                }
            }
        }
        tracing::info!(
            feeds = self.feeds.len(),
            fetched = out.len(),
            "rss fleet fetched"
        );
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "RSS"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = include_str!("../../../tests/fixtures/sample_rss.xml");

    #[test]
    fn sample_feed_parses_with_images_and_snippets() {
        let items = parse_feed_str("BBC Business", SAMPLE).unwrap();
        assert_eq!(items.len(), 3);

        let first = &items[0];
        assert_eq!(first.source_name, "BBC Business");
        assert_eq!(first.headline, "Markets rally as inflation cools");
        assert_eq!(
            first.snippet.as_deref(),
            Some("Stocks rose sharply after new data - traders cheered.")
        );
        assert_eq!(
            first.image_url.as_deref(),
            Some("https://img.example.com/thumb.jpg")
        );
        assert!(first.published_at.is_some());

        // enclosure-based image on the second item
        assert_eq!(
            items[1].image_url.as_deref(),
            Some("https://img.example.com/enclosure.jpg")
        );
        // no image at all on the third
        assert_eq!(items[2].image_url, None);
    }

    #[test]
    fn items_without_link_or_title_are_skipped() {
        let xml = r#"<rss><channel>
            <item><title>Has no link</title></item>
            <item><link>https://example.com/x</link><title>Kept</title></item>
        </channel></rss>"#;
        let items = parse_feed_str("X", xml).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].headline, "Kept");
    }

    #[test]
    fn per_feed_item_cap_applies() {
        let mut xml = String::from("<rss><channel>");
        for i in 0..30 {
            xml.push_str(&format!(
                "<item><title>Item {i}</title><link>https://example.com/{i}</link></item>"
            ));
        }
        xml.push_str("</channel></rss>");
        let items = parse_feed_str("X", &xml).unwrap();
        assert_eq!(items.len(), MAX_ITEMS_PER_FEED);
    }

    #[test]
    fn rfc2822_dates_parse_to_utc() {
        let dt = parse_rfc2822("Tue, 05 Aug 2025 14:30:00 GMT").unwrap();
        assert_eq!(dt.timestamp(), 1754404200);
        let dt = parse_rfc2822("Tue, 05 Aug 2025 14:30:00 +0000").unwrap();
        assert_eq!(dt.timestamp(), 1754404200);
        assert!(parse_rfc2822("not a date").is_none());
    }
}
