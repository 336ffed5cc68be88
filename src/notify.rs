// src/notify.rs
// Notification fan-out after successful processing: one row per user who
// favorites any of the article's sectors, at most one per user per article.

use std::collections::HashSet;

use anyhow::Result;

use crate::store::{ArticleStore, NewNotification};

const BODY_MAX_CHARS: usize = 200;

pub async fn fan_out(store: &dyn ArticleStore, article_id: i64, headline: &str) -> Result<usize> {
    let sector_ids: HashSet<i64> = store
        .sector_ids_for_article(article_id)
        .await?
        .into_iter()
        .collect();
    if sector_ids.is_empty() {
        return Ok(0);
    }

    let favorites = store.favorites_by_sector().await?;
    let body: String = headline.chars().take(BODY_MAX_CHARS).collect();

    let mut notified: HashSet<String> = HashSet::new();
    let mut sent = 0usize;
    for favorite in favorites {
        if !sector_ids.contains(&favorite.sector_id) {
            continue;
        }
        if !notified.insert(favorite.user_id.clone()) {
            continue;
        }
        store
            .insert_notification(NewNotification {
                user_id: favorite.user_id,
                kind: "new_article".to_string(),
                title: "New article in your sector".to_string(),
                body: body.clone(),
                link: Some(format!("/article/{article_id}")),
            })
            .await?;
        sent += 1;
    }
    if sent > 0 {
        tracing::debug!(article = article_id, sent, "notifications fanned out");
    }
    Ok(sent)
}
