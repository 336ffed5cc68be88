// src/ingest/mod.rs
pub mod feeds;
pub mod providers;
pub mod types;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;

use crate::ingest::types::{CandidateArticle, NewsSource};
use crate::store::{ArticleStore, NewArticle, ProcessingStatus};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_candidates_total",
            "Candidate articles returned by providers."
        );
        describe_counter!(
            "ingest_saved_total",
            "Candidates persisted as new pending articles."
        );
        describe_counter!(
            "ingest_duplicates_total",
            "Candidates dropped by natural-key deduplication."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Provider fetch/parse errors."
        );
        describe_gauge!(
            "ingest_last_run_ts",
            "Unix ts when an ingest cycle last ran."
        );
    });
}

/// Decode HTML entities and strip tags, collapsing whitespace.
pub fn strip_html(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}

/// Cap a string at `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max).collect()
    } else {
        s.to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub fetched: usize,
    pub saved: usize,
    pub duplicates: usize,
}

/// Run one ingestion cycle for a single source: fetch, deduplicate by
/// natural key, persist the remainder as `pending` rows. Provider failure
/// yields empty stats, never an error — the next scheduled cycle retries.
pub async fn run_source(store: &dyn ArticleStore, source: &dyn NewsSource) -> IngestStats {
    ensure_metrics_described();

    let candidates = match source.fetch_latest().await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = ?e, provider = source.name(), "provider error");
            counter!("ingest_provider_errors_total").increment(1);
            return IngestStats::default();
        }
    };

    let mut stats = IngestStats {
        fetched: candidates.len(),
        ..Default::default()
    };
    counter!("ingest_candidates_total").increment(candidates.len() as u64);

    for candidate in candidates {
        match store.article_exists(&candidate.keys()).await {
            Ok(true) => {
                stats.duplicates += 1;
                counter!("ingest_duplicates_total").increment(1);
            }
            Ok(false) => match insert_candidate(store, candidate).await {
                Ok(_) => {
                    stats.saved += 1;
                    counter!("ingest_saved_total").increment(1);
                }
                Err(e) => {
                    tracing::warn!(error = ?e, provider = source.name(), "article insert failed");
                }
            },
            // Unknown state: skip the insert rather than risk a duplicate row.
            Err(e) => {
                tracing::warn!(error = ?e, provider = source.name(), "dedup check failed");
            }
        }
    }

    gauge!("ingest_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);
    tracing::info!(
        provider = source.name(),
        fetched = stats.fetched,
        saved = stats.saved,
        duplicates = stats.duplicates,
        "ingest cycle"
    );
    stats
}

async fn insert_candidate(store: &dyn ArticleStore, candidate: CandidateArticle) -> anyhow::Result<i64> {
    let region = candidate.region.clone();
    let tickers = candidate.tickers.clone();

    let id = store
        .insert_article(NewArticle {
            finnhub_id: candidate.finnhub_id,
            gnews_url: candidate.gnews_url,
            original_url: candidate.original_url,
            headline: candidate.headline,
            snippet: candidate.snippet,
            source_name: candidate.source_name,
            image_url: candidate.image_url,
            published_at: candidate.published_at,
            processing_status: ProcessingStatus::Pending,
        })
        .await?;

    if !tickers.is_empty() {
        tracing::debug!(article = id, tickers = ?tickers, "watch-list hit");
    }

    // Region-based pre-tag; the generator adds the rest after processing.
    if let Some(slug) = region {
        match store.sectors().await {
            Ok(sectors) => {
                if let Some(sector) = sectors.iter().find(|s| s.slug == slug) {
                    if let Err(e) = store.attach_sectors(id, &[sector.id]).await {
                        tracing::warn!(error = ?e, article = id, "sector pre-tag failed");
                    }
                }
            }
            Err(e) => tracing::warn!(error = ?e, article = id, "sector lookup failed"),
        }
    }

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_html_removes_tags_and_entities() {
        let s = "  <p>Fed &amp; markets:&nbsp;<b>rates</b> hold</p>  ";
        assert_eq!(strip_html(s), "Fed & markets: rates hold");
    }

    #[test]
    fn truncate_is_char_based() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("ééééé", 2), "éé");
    }
}
