// tests/ingest_dedup.rs
use anyhow::Result;
use async_trait::async_trait;

use finlit_news_engine::ingest;
use finlit_news_engine::ingest::types::{CandidateArticle, NewsSource};
use finlit_news_engine::store::memory::MemoryStore;

struct StaticSource(Vec<CandidateArticle>);

#[async_trait]
impl NewsSource for StaticSource {
    async fn fetch_latest(&self) -> Result<Vec<CandidateArticle>> {
        Ok(self.0.clone())
    }
    fn name(&self) -> &'static str {
        "static"
    }
}

fn candidate(url: &str) -> CandidateArticle {
    CandidateArticle {
        original_url: url.to_string(),
        headline: "Fed cuts rates by 50 basis points".to_string(),
        source_name: "Reuters".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn repeated_ingest_creates_a_single_row() {
    let store = MemoryStore::new();
    let source = StaticSource(vec![candidate("https://example.com/a")]);

    let first = ingest::run_source(&store, &source).await;
    assert_eq!(first.saved, 1);
    assert_eq!(first.duplicates, 0);

    let second = ingest::run_source(&store, &source).await;
    assert_eq!(second.saved, 0);
    assert_eq!(second.duplicates, 1);
    assert_eq!(store.article_count(), 1);
}

#[tokio::test]
async fn provider_id_matches_before_url() {
    let store = MemoryStore::new();
    let mut first = candidate("https://example.com/a");
    first.finnhub_id = Some("1001".to_string());
    ingest::run_source(&store, &StaticSource(vec![first])).await;

    // Same provider id re-delivered under a different URL is still the
    // same real-world article.
    let mut redelivered = candidate("https://example.com/a-amp");
    redelivered.finnhub_id = Some("1001".to_string());
    let stats = ingest::run_source(&store, &StaticSource(vec![redelivered])).await;
    assert_eq!(stats.duplicates, 1);
    assert_eq!(store.article_count(), 1);
}

#[tokio::test]
async fn duplicates_within_one_batch_are_dropped() {
    let store = MemoryStore::new();
    let source = StaticSource(vec![
        candidate("https://example.com/a"),
        candidate("https://example.com/a"),
        candidate("https://example.com/b"),
    ]);
    let stats = ingest::run_source(&store, &source).await;
    assert_eq!(stats.saved, 2);
    assert_eq!(stats.duplicates, 1);
}

#[tokio::test]
async fn region_hint_pre_tags_a_sector() {
    let store = MemoryStore::with_sectors(&[(7, "asia")]);
    let mut c = candidate("https://example.com/asia-markets");
    c.region = Some("asia".to_string());
    ingest::run_source(&store, &StaticSource(vec![c])).await;

    let article = store.article(1).expect("row exists");
    assert_eq!(store.sector_ids(article.id), vec![7]);
}

#[tokio::test]
async fn failing_provider_yields_empty_stats() {
    struct Broken;
    #[async_trait]
    impl NewsSource for Broken {
        async fn fetch_latest(&self) -> Result<Vec<CandidateArticle>> {
            anyhow::bail!("upstream 503")
        }
        fn name(&self) -> &'static str {
            "broken"
        }
    }

    let store = MemoryStore::new();
    let stats = ingest::run_source(&store, &Broken).await;
    assert_eq!(stats.saved, 0);
    assert_eq!(store.article_count(), 0);
}
