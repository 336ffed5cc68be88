//! # Processing pipeline
//! Drives a single article through `pending → scraping → generating →
//! done/failed`, persisting status at every transition. Failures are
//! contained per article; a crashed run is healed by the recovery sweeper
//! resetting stale intermediate rows to `pending`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;

use crate::lesson::{LessonContent, LessonGenerator};
use crate::scrape::Scraper;
use crate::store::{Article, ArticlePatch, ArticleStore, NewQuizQuestion, ProcessingStatus};

/// Content fallback chain minimums: scraped full text, provider snippet,
/// bare headline — in that order.
pub const CONTENT_MIN_FULLTEXT: usize = 100;
pub const CONTENT_MIN_SNIPPET: usize = 30;
pub const CONTENT_MIN_HEADLINE: usize = 20;

// Stored content at least this long means an earlier run already scraped
// successfully; the shortest value the fallback chain can ever persist.
const REUSABLE_CONTENT_MIN: usize = 20;

pub const DEFAULT_STALE_AFTER_SECS: u64 = 600;
pub const DEFAULT_SWEEP_CAP: usize = 25;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_done_total", "Articles fully processed.");
        describe_counter!("pipeline_failed_total", "Articles that ended in failed.");
        describe_counter!(
            "pipeline_recovered_total",
            "Stuck articles reset to pending by the sweeper."
        );
        describe_gauge!(
            "pipeline_last_batch_ts",
            "Unix ts when a processing batch last ran."
        );
    });
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BatchStats {
    pub done: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Done,
    Failed,
}

#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn ArticleStore>,
    scraper: Arc<dyn Scraper>,
    generator: Arc<dyn LessonGenerator>,
    stale_after: chrono::Duration,
    sweep_cap: usize,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ArticleStore>,
        scraper: Arc<dyn Scraper>,
        generator: Arc<dyn LessonGenerator>,
    ) -> Self {
        Self {
            store,
            scraper,
            generator,
            stale_after: chrono::Duration::seconds(DEFAULT_STALE_AFTER_SECS as i64),
            sweep_cap: DEFAULT_SWEEP_CAP,
        }
    }

    pub fn with_staleness_secs(mut self, secs: u64) -> Self {
        self.stale_after = chrono::Duration::seconds(secs as i64);
        self
    }

    pub fn with_sweep_cap(mut self, cap: usize) -> Self {
        self.sweep_cap = cap;
        self
    }

    /// One processing cycle: sweep stuck rows, then run the state machine
    /// over up to `size` pending articles concurrently. Batch size is the
    /// concurrency bound. Never raises; sibling failures are isolated.
    pub async fn run_batch(&self, size: usize) -> BatchStats {
        ensure_metrics_described();

        if let Err(e) = self.recover_stuck().await {
            tracing::warn!(error = ?e, "recovery sweep failed");
        }

        let pending = match self
            .store
            .articles_by_status(ProcessingStatus::Pending, size)
            .await
        {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = ?e, "pending fetch failed");
                return BatchStats::default();
            }
        };
        if pending.is_empty() {
            return BatchStats::default();
        }

        let handles: Vec<_> = pending
            .into_iter()
            .map(|article| {
                let pipeline = self.clone();
                tokio::spawn(async move { pipeline.process_article(article).await })
            })
            .collect();

        let mut stats = BatchStats::default();
        for handle in handles {
            match handle.await {
                Ok(Outcome::Done) => stats.done += 1,
                Ok(Outcome::Failed) => stats.failed += 1,
                // A panicked task; the row stays in an intermediate state
                // until the sweeper reclaims it.
                Err(e) => {
                    tracing::warn!(error = ?e, "article task aborted");
                    stats.failed += 1;
                }
            }
        }

        counter!("pipeline_done_total").increment(stats.done as u64);
        counter!("pipeline_failed_total").increment(stats.failed as u64);
        gauge!("pipeline_last_batch_ts").set(Utc::now().timestamp().max(0) as f64);
        tracing::info!(done = stats.done, failed = stats.failed, "batch processed");
        stats
    }

    /// Reset articles stuck in an intermediate state past the staleness
    /// threshold back to `pending`. Bounded per status per call.
    pub async fn recover_stuck(&self) -> Result<usize> {
        let cutoff = Utc::now() - self.stale_after;
        let mut reset = 0usize;
        for status in [ProcessingStatus::Scraping, ProcessingStatus::Generating] {
            let stuck = self
                .store
                .stale_articles(status, cutoff, self.sweep_cap)
                .await?;
            for article in stuck {
                self.store
                    .update_article(article.id, ArticlePatch::status(ProcessingStatus::Pending))
                    .await?;
                tracing::info!(article = article.id, from = %status, "reset stuck article");
                reset += 1;
            }
        }
        if reset > 0 {
            counter!("pipeline_recovered_total").increment(reset as u64);
        }
        Ok(reset)
    }

    /// Per-article boundary: any error below becomes a `failed` transition
    /// and never propagates to batch siblings.
    async fn process_article(&self, article: Article) -> Outcome {
        let id = article.id;
        match self.drive(article).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = ?e, article = id, "article processing error");
                let _ = self
                    .store
                    .update_article(id, ArticlePatch::status(ProcessingStatus::Failed))
                    .await;
                Outcome::Failed
            }
        }
    }

    async fn drive(&self, article: Article) -> Result<Outcome> {
        let content = match self.settle_content(&article).await? {
            Some(content) => content,
            None => {
                self.store
                    .update_article(article.id, ArticlePatch::status(ProcessingStatus::Failed))
                    .await?;
                return Ok(Outcome::Failed);
            }
        };

        let Some(lesson) = self.generator.generate(&article.headline, &content).await else {
            self.store
                .update_article(article.id, ArticlePatch::status(ProcessingStatus::Failed))
                .await?;
            return Ok(Outcome::Failed);
        };

        self.persist_lesson(&article, &lesson).await?;
        self.store
            .update_article(article.id, ArticlePatch::status(ProcessingStatus::Done))
            .await?;

        // Best-effort: the article is done whether or not anyone hears of it.
        if let Err(e) = crate::notify::fan_out(self.store.as_ref(), article.id, &article.headline).await
        {
            tracing::warn!(error = ?e, article = article.id, "notification fan-out failed");
        }
        Ok(Outcome::Done)
    }

    /// Scrape (unless an earlier run already captured content) and settle
    /// what the generator will read. `Ok(None)` means no fallback met its
    /// minimum — terminal failure.
    async fn settle_content(&self, article: &Article) -> Result<Option<String>> {
        // Idempotent retry: an earlier run scraped fine but generation failed.
        if let Some(stored) = article.raw_content.as_deref() {
            let stored = stored.trim();
            if stored.chars().count() >= REUSABLE_CONTENT_MIN {
                self.store
                    .update_article(
                        article.id,
                        ArticlePatch::status(ProcessingStatus::Generating),
                    )
                    .await?;
                return Ok(Some(stored.to_string()));
            }
        }

        self.store
            .update_article(article.id, ArticlePatch::status(ProcessingStatus::Scraping))
            .await?;
        let scraped = self.scraper.scrape(&article.original_url).await;

        let mut patch = ArticlePatch::default();
        let mut scraped_text: Option<String> = None;
        let mut fresh_image: Option<String> = None;
        if let Some(result) = scraped {
            scraped_text = result.text;
            fresh_image = result.image;
            if result.final_url != article.original_url {
                // Redirected: keep the resolved URL, and the human-readable
                // source name when we know the destination domain.
                if let Some(name) = source_name_for_url(&result.final_url) {
                    patch.source_name = Some(name.to_string());
                }
                patch.original_url = Some(result.final_url);
            }
            if article.image_url.is_none() {
                patch.image_url = fresh_image.clone();
            }
            if article.author.is_none() {
                patch.author = result.author;
            }
        }

        let has_usable_text = scraped_text
            .as_deref()
            .map(str::trim)
            .is_some_and(|t| t.chars().count() >= CONTENT_MIN_FULLTEXT);
        let has_image = fresh_image.is_some() || article.image_url.is_some();
        if !has_usable_text && !has_image {
            // Nothing to read and nothing to show.
            return Ok(None);
        }

        let Some(content) = choose_content(
            scraped_text.as_deref(),
            article.snippet.as_deref(),
            &article.headline,
        ) else {
            return Ok(None);
        };

        patch.raw_content = Some(content.clone());
        patch.processing_status = Some(ProcessingStatus::Generating);
        self.store.update_article(article.id, patch).await?;
        Ok(Some(content))
    }

    async fn persist_lesson(&self, article: &Article, lesson: &LessonContent) -> Result<()> {
        let patch = ArticlePatch {
            ai_summary: Some(lesson.summary.clone()),
            lesson_data: Some(serde_json::to_value(lesson)?),
            ..Default::default()
        };
        self.store.update_article(article.id, patch).await?;

        // Sector associations: resolve slugs against the live taxonomy,
        // skip unknowns and anything already attached (re-entrancy guard).
        let sectors = self.store.sectors().await?;
        let by_slug: HashMap<&str, i64> = sectors.iter().map(|s| (s.slug.as_str(), s.id)).collect();
        let wanted: Vec<i64> = lesson
            .sectors
            .iter()
            .filter_map(|slug| by_slug.get(slug.as_str()).copied())
            .collect();
        if !wanted.is_empty() {
            let existing: HashSet<i64> = self
                .store
                .sector_ids_for_article(article.id)
                .await?
                .into_iter()
                .collect();
            let fresh: Vec<i64> = wanted
                .into_iter()
                .filter(|id| !existing.contains(id))
                .collect();
            if !fresh.is_empty() {
                self.store.attach_sectors(article.id, &fresh).await?;
            }
        }

        // One quiz per article; skip when a partial earlier run got this far.
        if !self.store.quiz_exists(article.id).await? {
            let questions: Vec<NewQuizQuestion> = lesson
                .quiz
                .iter()
                .enumerate()
                .map(|(i, q)| NewQuizQuestion {
                    question_text: q.prompt.clone(),
                    options: q.options.clone(),
                    correct_index: q.correct_index,
                    explanation: q.explanation.clone(),
                    order_num: (i + 1) as u32,
                    question_type: (!q.qtype.is_empty()).then(|| q.qtype.clone()),
                })
                .collect();
            self.store.insert_quiz(article.id, &questions).await?;
        }
        Ok(())
    }
}

/// Content fallback chain: scraped full text, else provider snippet, else
/// the headline, each with its own minimum length. `None` means failed.
pub fn choose_content(
    scraped: Option<&str>,
    snippet: Option<&str>,
    headline: &str,
) -> Option<String> {
    if let Some(text) = scraped.map(str::trim) {
        if text.chars().count() >= CONTENT_MIN_FULLTEXT {
            return Some(text.to_string());
        }
    }
    if let Some(snippet) = snippet.map(str::trim) {
        if snippet.chars().count() >= CONTENT_MIN_SNIPPET {
            return Some(snippet.to_string());
        }
    }
    let headline = headline.trim();
    (headline.chars().count() >= CONTENT_MIN_HEADLINE).then(|| headline.to_string())
}

/// Human-readable source names for domains redirects commonly land on.
fn source_name_for_url(url: &str) -> Option<&'static str> {
    const KNOWN: [(&str, &str); 12] = [
        ("reuters.com", "Reuters"),
        ("cnbc.com", "CNBC"),
        ("bbc.co.uk", "BBC"),
        ("bbc.com", "BBC"),
        ("finance.yahoo.com", "Yahoo Finance"),
        ("theguardian.com", "The Guardian"),
        ("investing.com", "Investing.com"),
        ("coindesk.com", "CoinDesk"),
        ("cointelegraph.com", "Cointelegraph"),
        ("aljazeera.com", "Al Jazeera"),
        ("apnews.com", "AP News"),
        ("scmp.com", "South China Morning Post"),
    ];
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    KNOWN
        .iter()
        .find(|(domain, _)| host == *domain || host.ends_with(&format!(".{domain}")))
        .map(|(_, name)| *name)
}
