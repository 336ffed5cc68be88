// src/store/mod.rs
// Persistence seam: the pipeline talks to the article store exclusively
// through the `ArticleStore` trait so jobs and tests can swap backends.

pub mod memory;
pub mod supabase;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an article sits in the processing pipeline. Forward-only except for
/// the recovery sweeper's reset to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Scraping,
    Generating,
    Done,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Scraping => "scraping",
            ProcessingStatus::Generating => "generating",
            ProcessingStatus::Done => "done",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted article row. Unknown columns on the backing table are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub finnhub_id: Option<String>,
    pub gnews_url: Option<String>,
    pub original_url: String,
    pub headline: String,
    pub snippet: Option<String>,
    pub source_name: String,
    pub image_url: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub raw_content: Option<String>,
    pub ai_summary: Option<String>,
    pub lesson_data: Option<serde_json::Value>,
    pub processing_status: ProcessingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload produced by the ingestion cycle.
#[derive(Debug, Clone, Serialize)]
pub struct NewArticle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finnhub_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gnews_url: Option<String>,
    pub original_url: String,
    pub headline: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    pub source_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub processing_status: ProcessingStatus,
}

/// Partial update; only set fields are written. The store bumps `updated_at`
/// on every patch — the recovery sweeper depends on that.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArticlePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_status: Option<ProcessingStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lesson_data: Option<serde_json::Value>,
}

impl ArticlePatch {
    pub fn status(status: ProcessingStatus) -> Self {
        Self {
            processing_status: Some(status),
            ..Default::default()
        }
    }
}

/// Natural keys used to detect the same real-world article across polls.
/// Checked in order: provider id, canonical search URL, original URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NaturalKeys {
    pub finnhub_id: Option<String>,
    pub gnews_url: Option<String>,
    pub original_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sector {
    pub id: i64,
    pub slug: String,
    pub name: String,
}

/// Quiz question row created alongside the article's quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQuizQuestion {
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_index: u32,
    pub explanation: String,
    pub order_num: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_type: Option<String>,
}

/// A (user, sector) favorite pair, read for the notification fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorFavorite {
    pub user_id: String,
    pub sector_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotification {
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// The operations the pipeline needs from the backing store — nothing more.
#[async_trait::async_trait]
pub trait ArticleStore: Send + Sync {
    async fn insert_article(&self, article: NewArticle) -> Result<i64>;

    /// True when any persisted row matches one of the candidate's natural
    /// keys. Must be checked before every insert.
    async fn article_exists(&self, keys: &NaturalKeys) -> Result<bool>;

    /// Up to `limit` rows in `status`, most recently created first.
    async fn articles_by_status(
        &self,
        status: ProcessingStatus,
        limit: usize,
    ) -> Result<Vec<Article>>;

    /// Rows in `status` whose `updated_at` is older than the cutoff, capped.
    async fn stale_articles(
        &self,
        status: ProcessingStatus,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Article>>;

    async fn update_article(&self, id: i64, patch: ArticlePatch) -> Result<()>;

    async fn sectors(&self) -> Result<Vec<Sector>>;
    async fn sector_ids_for_article(&self, article_id: i64) -> Result<Vec<i64>>;
    async fn attach_sectors(&self, article_id: i64, sector_ids: &[i64]) -> Result<()>;

    async fn quiz_exists(&self, article_id: i64) -> Result<bool>;
    async fn insert_quiz(&self, article_id: i64, questions: &[NewQuizQuestion]) -> Result<i64>;

    async fn favorites_by_sector(&self) -> Result<Vec<SectorFavorite>>;
    async fn insert_notification(&self, notification: NewNotification) -> Result<()>;
}
