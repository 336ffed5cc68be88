// tests/recovery_sweep.rs
use std::sync::Arc;

use chrono::{Duration, Utc};

use finlit_news_engine::lesson::{canned_lesson, MockGenerator};
use finlit_news_engine::pipeline::Pipeline;
use finlit_news_engine::scrape::{MockScraper, ScrapeResult};
use finlit_news_engine::store::memory::MemoryStore;
use finlit_news_engine::store::{ArticlePatch, ArticleStore, NewArticle, ProcessingStatus};

fn article(url: &str) -> NewArticle {
    NewArticle {
        finnhub_id: None,
        gnews_url: None,
        original_url: url.to_string(),
        headline: "A headline long enough to stand alone".to_string(),
        snippet: None,
        source_name: "Reuters".to_string(),
        image_url: None,
        published_at: None,
        processing_status: ProcessingStatus::Pending,
    }
}

async fn stuck_in(store: &MemoryStore, url: &str, status: ProcessingStatus) -> i64 {
    let id = store.insert_article(article(url)).await.unwrap();
    store
        .update_article(id, ArticlePatch::status(status))
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn stale_intermediate_rows_reset_to_pending() {
    let store = Arc::new(MemoryStore::new());
    let stale_scraping = stuck_in(&store, "https://example.com/a", ProcessingStatus::Scraping).await;
    let stale_generating =
        stuck_in(&store, "https://example.com/b", ProcessingStatus::Generating).await;
    let fresh = stuck_in(&store, "https://example.com/c", ProcessingStatus::Scraping).await;

    // Age the first two past the 10-minute threshold.
    let old = Utc::now() - Duration::minutes(20);
    store.backdate(stale_scraping, old);
    store.backdate(stale_generating, old);

    let pipeline = Pipeline::new(
        store.clone(),
        Arc::new(MockScraper::new()),
        Arc::new(MockGenerator::failing()),
    );
    let reset = pipeline.recover_stuck().await.unwrap();
    assert_eq!(reset, 2);

    assert_eq!(
        store.article(stale_scraping).unwrap().processing_status,
        ProcessingStatus::Pending
    );
    assert_eq!(
        store.article(stale_generating).unwrap().processing_status,
        ProcessingStatus::Pending
    );
    assert_eq!(
        store.article(fresh).unwrap().processing_status,
        ProcessingStatus::Scraping
    );
}

#[tokio::test]
async fn swept_articles_are_picked_up_by_the_same_cycle() {
    let store = Arc::new(MemoryStore::new());
    let url = "https://example.com/stuck";
    let id = stuck_in(&store, url, ProcessingStatus::Scraping).await;
    store.backdate(id, Utc::now() - Duration::minutes(20));

    let scraper = MockScraper::new();
    scraper.set(
        url,
        ScrapeResult {
            text: Some("word ".repeat(60)),
            image: None,
            author: None,
            final_url: url.to_string(),
        },
    );
    let generator = MockGenerator::always(canned_lesson("Summary.", &[]));
    let pipeline = Pipeline::new(store.clone(), Arc::new(scraper), Arc::new(generator));

    // run_batch sweeps first, so the stuck row is processed right away.
    let stats = pipeline.run_batch(5).await;
    assert_eq!(stats.done, 1);
    assert_eq!(
        store.article(id).unwrap().processing_status,
        ProcessingStatus::Done
    );
}

#[tokio::test]
async fn sweep_respects_its_cap() {
    let store = Arc::new(MemoryStore::new());
    let old = Utc::now() - Duration::minutes(30);
    for i in 0..10 {
        let id = stuck_in(
            &store,
            &format!("https://example.com/{i}"),
            ProcessingStatus::Scraping,
        )
        .await;
        store.backdate(id, old);
    }

    let pipeline = Pipeline::new(
        store.clone(),
        Arc::new(MockScraper::new()),
        Arc::new(MockGenerator::failing()),
    )
    .with_sweep_cap(4);
    let reset = pipeline.recover_stuck().await.unwrap();
    assert_eq!(reset, 4);
}
