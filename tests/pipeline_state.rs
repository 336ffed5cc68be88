// tests/pipeline_state.rs
// State-machine transitions observed through the memory store's status log.

use std::sync::Arc;

use finlit_news_engine::lesson::{canned_lesson, MockGenerator};
use finlit_news_engine::pipeline::Pipeline;
use finlit_news_engine::scrape::{MockScraper, ScrapeResult};
use finlit_news_engine::store::memory::MemoryStore;
use finlit_news_engine::store::{ArticlePatch, ArticleStore, NewArticle, ProcessingStatus};

fn new_article(url: &str) -> NewArticle {
    NewArticle {
        finnhub_id: None,
        gnews_url: None,
        original_url: url.to_string(),
        headline: "Markets digest the central bank decision".to_string(),
        snippet: None,
        source_name: "Reuters".to_string(),
        image_url: None,
        published_at: None,
        processing_status: ProcessingStatus::Pending,
    }
}

fn good_scrape(url: &str) -> ScrapeResult {
    ScrapeResult {
        text: Some("word ".repeat(60)),
        image: Some("https://img.example.com/hero.jpg".to_string()),
        author: Some("Jane Doe".to_string()),
        final_url: url.to_string(),
    }
}

#[tokio::test]
async fn happy_path_walks_every_state() {
    let store = Arc::new(MemoryStore::with_sectors(&[(1, "stocks")]));
    let url = "https://example.com/a";
    let id = store.insert_article(new_article(url)).await.unwrap();

    let scraper = MockScraper::new();
    scraper.set(url, good_scrape(url));
    let generator = MockGenerator::always(canned_lesson("A clear summary.", &["stocks"]));

    let pipeline = Pipeline::new(store.clone(), Arc::new(scraper), Arc::new(generator));
    let stats = pipeline.run_batch(5).await;
    assert_eq!(stats.done, 1);
    assert_eq!(stats.failed, 0);

    assert_eq!(
        store.status_history(id),
        vec![
            ProcessingStatus::Pending,
            ProcessingStatus::Scraping,
            ProcessingStatus::Generating,
            ProcessingStatus::Done,
        ]
    );

    let article = store.article(id).unwrap();
    assert_eq!(article.ai_summary.as_deref(), Some("A clear summary."));
    assert!(article.lesson_data.is_some());
    assert_eq!(article.author.as_deref(), Some("Jane Doe"));
    assert_eq!(store.sector_ids(id), vec![1]);
    assert_eq!(store.quiz_questions(id).len(), 6);
}

#[tokio::test]
async fn generator_failure_lands_in_failed() {
    let store = Arc::new(MemoryStore::new());
    let url = "https://example.com/a";
    let id = store.insert_article(new_article(url)).await.unwrap();

    let scraper = MockScraper::new();
    scraper.set(url, good_scrape(url));
    let pipeline = Pipeline::new(
        store.clone(),
        Arc::new(scraper),
        Arc::new(MockGenerator::failing()),
    );

    let stats = pipeline.run_batch(5).await;
    assert_eq!(stats.failed, 1);
    assert_eq!(
        store.status_history(id),
        vec![
            ProcessingStatus::Pending,
            ProcessingStatus::Scraping,
            ProcessingStatus::Generating,
            ProcessingStatus::Failed,
        ]
    );
    // failed is terminal: not re-selected by the next batch
    let stats = pipeline.run_batch(5).await;
    assert_eq!(stats.done + stats.failed, 0);
}

#[tokio::test]
async fn stored_content_skips_the_scraper() {
    let store = Arc::new(MemoryStore::new());
    let url = "https://example.com/a";
    let id = store.insert_article(new_article(url)).await.unwrap();
    // An earlier run scraped fine but the generator step failed; the sweeper
    // has since reset the row to pending.
    store
        .update_article(
            id,
            ArticlePatch {
                raw_content: Some("already captured ".repeat(20)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let scraper = Arc::new(MockScraper::new()); // would fail every scrape
    let generator = MockGenerator::always(canned_lesson("Summary.", &[]));
    let pipeline = Pipeline::new(store.clone(), scraper.clone(), Arc::new(generator));

    let stats = pipeline.run_batch(5).await;
    assert_eq!(stats.done, 1);
    assert!(scraper.calls().is_empty(), "scraper must not be invoked");
    assert_eq!(
        store.status_history(id),
        vec![
            ProcessingStatus::Pending,
            ProcessingStatus::Generating,
            ProcessingStatus::Done,
        ]
    );
}

#[tokio::test]
async fn redirect_updates_url_and_source_name() {
    let store = Arc::new(MemoryStore::new());
    let url = "https://aggregator.example.com/out?id=9";
    let id = store.insert_article(new_article(url)).await.unwrap();

    let scraper = MockScraper::new();
    scraper.set(
        url,
        ScrapeResult {
            final_url: "https://www.reuters.com/markets/the-real-story".to_string(),
            ..good_scrape(url)
        },
    );
    let generator = MockGenerator::always(canned_lesson("Summary.", &[]));
    let pipeline = Pipeline::new(store.clone(), Arc::new(scraper), Arc::new(generator));
    pipeline.run_batch(5).await;

    let article = store.article(id).unwrap();
    assert_eq!(
        article.original_url,
        "https://www.reuters.com/markets/the-real-story"
    );
    assert_eq!(article.source_name, "Reuters");
    assert_eq!(
        article.image_url.as_deref(),
        Some("https://img.example.com/hero.jpg")
    );
}
