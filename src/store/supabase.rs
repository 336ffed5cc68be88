// src/store/supabase.rs
// PostgREST passthrough for the hosted Postgres backend. Only the operations
// the pipeline needs; the wider read API lives elsewhere.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{
    Article, ArticlePatch, ArticleStore, NaturalKeys, NewArticle, NewNotification,
    NewQuizQuestion, ProcessingStatus, Sector, SectorFavorite,
};

#[derive(Clone)]
pub struct SupabaseStore {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
}

#[derive(Deserialize)]
struct IdRow {
    id: i64,
}

#[derive(Deserialize)]
struct SectorIdRow {
    sector_id: i64,
}

impl SupabaseStore {
    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.table_url(table))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn key_matches(&self, column: &str, value: &str) -> Result<bool> {
        let rows: Vec<IdRow> = self
            .request(reqwest::Method::GET, "articles")
            .query(&[
                ("select", "id".to_string()),
                (column, format!("eq.{value}")),
                ("limit", "1".to_string()),
            ])
            .send()
            .await
            .context("article_exists request")?
            .error_for_status()
            .context("article_exists status")?
            .json()
            .await
            .context("article_exists body")?;
        Ok(!rows.is_empty())
    }
}

#[async_trait::async_trait]
impl ArticleStore for SupabaseStore {
    async fn insert_article(&self, article: NewArticle) -> Result<i64> {
        let rows: Vec<IdRow> = self
            .request(reqwest::Method::POST, "articles")
            .header("Prefer", "return=representation")
            .json(&article)
            .send()
            .await
            .context("insert_article request")?
            .error_for_status()
            .context("insert_article status")?
            .json()
            .await
            .context("insert_article body")?;
        rows.first()
            .map(|r| r.id)
            .context("insert_article returned no rows")
    }

    async fn article_exists(&self, keys: &NaturalKeys) -> Result<bool> {
        if let Some(fid) = keys.finnhub_id.as_deref() {
            if self.key_matches("finnhub_id", fid).await? {
                return Ok(true);
            }
        }
        if let Some(gurl) = keys.gnews_url.as_deref() {
            if self.key_matches("gnews_url", gurl).await? {
                return Ok(true);
            }
        }
        if let Some(url) = keys.original_url.as_deref() {
            if self.key_matches("original_url", url).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn articles_by_status(
        &self,
        status: ProcessingStatus,
        limit: usize,
    ) -> Result<Vec<Article>> {
        let rows: Vec<Article> = self
            .request(reqwest::Method::GET, "articles")
            .query(&[
                ("select", "*".to_string()),
                ("processing_status", format!("eq.{status}")),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .context("articles_by_status request")?
            .error_for_status()
            .context("articles_by_status status")?
            .json()
            .await
            .context("articles_by_status body")?;
        Ok(rows)
    }

    async fn stale_articles(
        &self,
        status: ProcessingStatus,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Article>> {
        let rows: Vec<Article> = self
            .request(reqwest::Method::GET, "articles")
            .query(&[
                ("select", "*".to_string()),
                ("processing_status", format!("eq.{status}")),
                ("updated_at", format!("lt.{}", older_than.to_rfc3339())),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .context("stale_articles request")?
            .error_for_status()
            .context("stale_articles status")?
            .json()
            .await
            .context("stale_articles body")?;
        Ok(rows)
    }

    async fn update_article(&self, id: i64, patch: ArticlePatch) -> Result<()> {
        let mut body = serde_json::to_value(&patch).context("serializing patch")?;
        body["updated_at"] = json!(Utc::now());
        self.request(reqwest::Method::PATCH, "articles")
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal")
            .json(&body)
            .send()
            .await
            .context("update_article request")?
            .error_for_status()
            .context("update_article status")?;
        Ok(())
    }

    async fn sectors(&self) -> Result<Vec<Sector>> {
        let rows: Vec<Sector> = self
            .request(reqwest::Method::GET, "sectors")
            .query(&[("select", "id,slug,name")])
            .send()
            .await
            .context("sectors request")?
            .error_for_status()
            .context("sectors status")?
            .json()
            .await
            .context("sectors body")?;
        Ok(rows)
    }

    async fn sector_ids_for_article(&self, article_id: i64) -> Result<Vec<i64>> {
        let rows: Vec<SectorIdRow> = self
            .request(reqwest::Method::GET, "article_sectors")
            .query(&[
                ("select", "sector_id".to_string()),
                ("article_id", format!("eq.{article_id}")),
            ])
            .send()
            .await
            .context("sector_ids request")?
            .error_for_status()
            .context("sector_ids status")?
            .json()
            .await
            .context("sector_ids body")?;
        Ok(rows.into_iter().map(|r| r.sector_id).collect())
    }

    async fn attach_sectors(&self, article_id: i64, sector_ids: &[i64]) -> Result<()> {
        let rows: Vec<serde_json::Value> = sector_ids
            .iter()
            .map(|sid| json!({ "article_id": article_id, "sector_id": sid }))
            .collect();
        self.request(reqwest::Method::POST, "article_sectors")
            .header("Prefer", "return=minimal")
            .json(&rows)
            .send()
            .await
            .context("attach_sectors request")?
            .error_for_status()
            .context("attach_sectors status")?;
        Ok(())
    }

    async fn quiz_exists(&self, article_id: i64) -> Result<bool> {
        let rows: Vec<IdRow> = self
            .request(reqwest::Method::GET, "quizzes")
            .query(&[
                ("select", "id".to_string()),
                ("article_id", format!("eq.{article_id}")),
                ("limit", "1".to_string()),
            ])
            .send()
            .await
            .context("quiz_exists request")?
            .error_for_status()
            .context("quiz_exists status")?
            .json()
            .await
            .context("quiz_exists body")?;
        Ok(!rows.is_empty())
    }

    async fn insert_quiz(&self, article_id: i64, questions: &[NewQuizQuestion]) -> Result<i64> {
        let rows: Vec<IdRow> = self
            .request(reqwest::Method::POST, "quizzes")
            .header("Prefer", "return=representation")
            .json(&json!({ "article_id": article_id }))
            .send()
            .await
            .context("insert_quiz request")?
            .error_for_status()
            .context("insert_quiz status")?
            .json()
            .await
            .context("insert_quiz body")?;
        let quiz_id = rows
            .first()
            .map(|r| r.id)
            .context("insert_quiz returned no rows")?;

        let question_rows: Vec<serde_json::Value> = questions
            .iter()
            .map(|q| {
                let mut row = serde_json::to_value(q).expect("question serializes");
                row["quiz_id"] = json!(quiz_id);
                row
            })
            .collect();
        self.request(reqwest::Method::POST, "quiz_questions")
            .header("Prefer", "return=minimal")
            .json(&question_rows)
            .send()
            .await
            .context("insert quiz_questions request")?
            .error_for_status()
            .context("insert quiz_questions status")?;
        Ok(quiz_id)
    }

    async fn favorites_by_sector(&self) -> Result<Vec<SectorFavorite>> {
        let rows: Vec<SectorFavorite> = self
            .request(reqwest::Method::GET, "user_favorites")
            .query(&[("select", "user_id,sector_id")])
            .send()
            .await
            .context("favorites request")?
            .error_for_status()
            .context("favorites status")?
            .json()
            .await
            .context("favorites body")?;
        Ok(rows)
    }

    async fn insert_notification(&self, notification: NewNotification) -> Result<()> {
        self.request(reqwest::Method::POST, "notifications")
            .header("Prefer", "return=minimal")
            .json(&notification)
            .send()
            .await
            .context("insert_notification request")?
            .error_for_status()
            .context("insert_notification status")?;
        Ok(())
    }
}
