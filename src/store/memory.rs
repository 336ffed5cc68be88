// src/store/memory.rs
// In-memory store used by tests. Also records each article's status history
// so tests can assert state-machine monotonicity.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use super::{
    Article, ArticlePatch, ArticleStore, NaturalKeys, NewArticle, NewNotification,
    NewQuizQuestion, ProcessingStatus, Sector, SectorFavorite,
};

#[derive(Default)]
struct Inner {
    next_id: i64,
    articles: Vec<Article>,
    sectors: Vec<Sector>,
    article_sectors: Vec<(i64, i64)>,
    quizzes: HashMap<i64, Vec<NewQuizQuestion>>,
    favorites: Vec<SectorFavorite>,
    notifications: Vec<NewNotification>,
    status_log: Vec<(i64, ProcessingStatus)>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Seed the sector taxonomy.
    pub fn with_sectors(pairs: &[(i64, &str)]) -> Self {
        let store = Self::new();
        {
            let mut g = store.inner.lock().expect("poisoned store");
            g.sectors = pairs
                .iter()
                .map(|(id, slug)| Sector {
                    id: *id,
                    slug: slug.to_string(),
                    name: slug.to_string(),
                })
                .collect();
        }
        store
    }

    pub fn add_favorite(&self, user_id: &str, sector_id: i64) {
        self.inner
            .lock()
            .expect("poisoned store")
            .favorites
            .push(SectorFavorite {
                user_id: user_id.to_string(),
                sector_id,
            });
    }

    pub fn article(&self, id: i64) -> Option<Article> {
        let g = self.inner.lock().expect("poisoned store");
        g.articles.iter().find(|a| a.id == id).cloned()
    }

    pub fn article_count(&self) -> usize {
        self.inner.lock().expect("poisoned store").articles.len()
    }

    /// Every status the article has been in, insertion status included.
    pub fn status_history(&self, id: i64) -> Vec<ProcessingStatus> {
        let g = self.inner.lock().expect("poisoned store");
        g.status_log
            .iter()
            .filter(|(aid, _)| *aid == id)
            .map(|(_, s)| *s)
            .collect()
    }

    pub fn sector_ids(&self, article_id: i64) -> Vec<i64> {
        let g = self.inner.lock().expect("poisoned store");
        g.article_sectors
            .iter()
            .filter(|(aid, _)| *aid == article_id)
            .map(|(_, sid)| *sid)
            .collect()
    }

    pub fn quiz_questions(&self, article_id: i64) -> Vec<NewQuizQuestion> {
        let g = self.inner.lock().expect("poisoned store");
        g.quizzes.get(&article_id).cloned().unwrap_or_default()
    }

    pub fn notifications(&self) -> Vec<NewNotification> {
        self.inner
            .lock()
            .expect("poisoned store")
            .notifications
            .clone()
    }

    /// Rewrite `updated_at`, so tests can age a row past the staleness cutoff.
    pub fn backdate(&self, id: i64, updated_at: DateTime<Utc>) {
        let mut g = self.inner.lock().expect("poisoned store");
        if let Some(a) = g.articles.iter_mut().find(|a| a.id == id) {
            a.updated_at = updated_at;
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ArticleStore for MemoryStore {
    async fn insert_article(&self, article: NewArticle) -> Result<i64> {
        let mut g = self.inner.lock().expect("poisoned store");
        g.next_id += 1;
        let id = g.next_id;
        let now = Utc::now();
        g.status_log.push((id, article.processing_status));
        g.articles.push(Article {
            id,
            finnhub_id: article.finnhub_id,
            gnews_url: article.gnews_url,
            original_url: article.original_url,
            headline: article.headline,
            snippet: article.snippet,
            source_name: article.source_name,
            image_url: article.image_url,
            author: None,
            published_at: article.published_at,
            raw_content: None,
            ai_summary: None,
            lesson_data: None,
            processing_status: article.processing_status,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn article_exists(&self, keys: &NaturalKeys) -> Result<bool> {
        let g = self.inner.lock().expect("poisoned store");
        if let Some(fid) = keys.finnhub_id.as_deref() {
            if g.articles.iter().any(|a| a.finnhub_id.as_deref() == Some(fid)) {
                return Ok(true);
            }
        }
        if let Some(gurl) = keys.gnews_url.as_deref() {
            if g.articles.iter().any(|a| a.gnews_url.as_deref() == Some(gurl)) {
                return Ok(true);
            }
        }
        if let Some(url) = keys.original_url.as_deref() {
            if g.articles.iter().any(|a| a.original_url == url) {
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
        let g = self.inner.lock().expect("poisoned store");
        let mut rows: Vec<Article> = g
            .articles
            .iter()
            .filter(|a| a.processing_status == status)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn stale_articles(
        &self,
        status: ProcessingStatus,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Article>> {
        let g = self.inner.lock().expect("poisoned store");
        let mut rows: Vec<Article> = g
            .articles
            .iter()
            .filter(|a| a.processing_status == status && a.updated_at < older_than)
            .cloned()
            .collect();
        rows.truncate(limit);
        Ok(rows)
    }

    async fn update_article(&self, id: i64, patch: ArticlePatch) -> Result<()> {
        let mut g = self.inner.lock().expect("poisoned store");
        if let Some(status) = patch.processing_status {
            g.status_log.push((id, status));
        }
        let article = g
            .articles
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| anyhow!("no article with id {id}"))?;
        if let Some(status) = patch.processing_status {
            article.processing_status = status;
        }
        if let Some(v) = patch.original_url {
            article.original_url = v;
        }
        if let Some(v) = patch.source_name {
            article.source_name = v;
        }
        if let Some(v) = patch.image_url {
            article.image_url = Some(v);
        }
        if let Some(v) = patch.author {
            article.author = Some(v);
        }
        if let Some(v) = patch.raw_content {
            article.raw_content = Some(v);
        }
        if let Some(v) = patch.ai_summary {
            article.ai_summary = Some(v);
        }
        if let Some(v) = patch.lesson_data {
            article.lesson_data = Some(v);
        }
        article.updated_at = Utc::now();
        Ok(())
    }

    async fn sectors(&self) -> Result<Vec<Sector>> {
        Ok(self.inner.lock().expect("poisoned store").sectors.clone())
    }

    async fn sector_ids_for_article(&self, article_id: i64) -> Result<Vec<i64>> {
        Ok(self.sector_ids(article_id))
    }

    async fn attach_sectors(&self, article_id: i64, sector_ids: &[i64]) -> Result<()> {
        let mut g = self.inner.lock().expect("poisoned store");
        for sid in sector_ids {
            g.article_sectors.push((article_id, *sid));
        }
        Ok(())
    }

    async fn quiz_exists(&self, article_id: i64) -> Result<bool> {
        Ok(self
            .inner
            .lock()
            .expect("poisoned store")
            .quizzes
            .contains_key(&article_id))
    }

    async fn insert_quiz(&self, article_id: i64, questions: &[NewQuizQuestion]) -> Result<i64> {
        let mut g = self.inner.lock().expect("poisoned store");
        g.quizzes.insert(article_id, questions.to_vec());
        Ok(article_id)
    }

    async fn favorites_by_sector(&self) -> Result<Vec<SectorFavorite>> {
        Ok(self.inner.lock().expect("poisoned store").favorites.clone())
    }

    async fn insert_notification(&self, notification: NewNotification) -> Result<()> {
        self.inner
            .lock()
            .expect("poisoned store")
            .notifications
            .push(notification);
        Ok(())
    }
}
