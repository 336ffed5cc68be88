// tests/batch_isolation.rs
// One bad article never takes down its batch siblings, whether it fails
// through the soft path or panics outright.

use std::sync::Arc;

use async_trait::async_trait;

use finlit_news_engine::lesson::{canned_lesson, MockGenerator};
use finlit_news_engine::pipeline::Pipeline;
use finlit_news_engine::scrape::{MockScraper, ScrapeResult, Scraper};
use finlit_news_engine::store::memory::MemoryStore;
use finlit_news_engine::store::{ArticleStore, NewArticle, ProcessingStatus};

fn article(url: &str, headline: &str) -> NewArticle {
    NewArticle {
        finnhub_id: None,
        gnews_url: None,
        original_url: url.to_string(),
        headline: headline.to_string(),
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
        image: Some("https://img.example.com/x.jpg".to_string()),
        author: None,
        final_url: url.to_string(),
    }
}

#[tokio::test]
async fn one_failing_article_does_not_abort_the_batch() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_article(article("https://example.com/a", "Headline for article one"))
        .await
        .unwrap();
    store
        .insert_article(article("https://example.com/b", "Headline for article two"))
        .await
        .unwrap();
    // "short" leaves no fallback once the scrape comes back empty
    let bad = store
        .insert_article(article("https://example.com/c", "short"))
        .await
        .unwrap();

    let scraper = MockScraper::new();
    scraper.set("https://example.com/a", good_scrape("https://example.com/a"));
    scraper.set("https://example.com/b", good_scrape("https://example.com/b"));
    let generator = MockGenerator::always(canned_lesson("Summary.", &[]));

    let pipeline = Pipeline::new(store.clone(), Arc::new(scraper), Arc::new(generator));
    let stats = pipeline.run_batch(5).await;

    assert_eq!(stats.done, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(
        store.article(bad).unwrap().processing_status,
        ProcessingStatus::Failed
    );
}

/// Scraper that panics on one URL — the worst-case "unhandled exception".
struct PanickyScraper {
    panic_on: String,
    inner: MockScraper,
}

#[async_trait]
impl Scraper for PanickyScraper {
    async fn scrape(&self, url: &str) -> Option<ScrapeResult> {
        if url == self.panic_on {
            panic!("scraper exploded");
        }
        self.inner.scrape(url).await
    }
}

#[tokio::test]
async fn a_panicking_article_task_is_contained() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_article(article("https://example.com/a", "Headline for article one"))
        .await
        .unwrap();
    store
        .insert_article(article("https://example.com/boom", "Headline that explodes"))
        .await
        .unwrap();

    let inner = MockScraper::new();
    inner.set("https://example.com/a", good_scrape("https://example.com/a"));
    let scraper = PanickyScraper {
        panic_on: "https://example.com/boom".to_string(),
        inner,
    };
    let generator = MockGenerator::always(canned_lesson("Summary.", &[]));

    let pipeline = Pipeline::new(store.clone(), Arc::new(scraper), Arc::new(generator));
    let stats = pipeline.run_batch(5).await;

    assert_eq!(stats.done, 1);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn an_empty_batch_is_a_no_op() {
    let store = Arc::new(MemoryStore::new());
    let generator = MockGenerator::always(canned_lesson("Summary.", &[]));
    let pipeline = Pipeline::new(
        store.clone(),
        Arc::new(MockScraper::new()),
        Arc::new(generator),
    );
    let stats = pipeline.run_batch(5).await;
    assert_eq!(stats, finlit_news_engine::BatchStats::default());
}
