// tests/notify_fanout.rs
// Each favoriting user gets at most one notification per processed article,
// however many of its sectors they favorite.

use finlit_news_engine::notify;
use finlit_news_engine::store::memory::MemoryStore;
use finlit_news_engine::store::{ArticleStore, NewArticle, ProcessingStatus};

async fn seeded_article(store: &MemoryStore) -> i64 {
    store
        .insert_article(NewArticle {
            finnhub_id: None,
            gnews_url: None,
            original_url: "https://example.com/a".to_string(),
            headline: "Chip stocks surge on record data-center demand".to_string(),
            snippet: None,
            source_name: "Reuters".to_string(),
            image_url: None,
            published_at: None,
            processing_status: ProcessingStatus::Done,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn users_are_notified_once_per_article() {
    let store = MemoryStore::with_sectors(&[(1, "stocks"), (2, "asia"), (3, "crypto")]);
    let id = seeded_article(&store).await;
    store.attach_sectors(id, &[1, 2]).await.unwrap();

    // alice favorites both matching sectors, bob one, carol none that match
    store.add_favorite("alice", 1);
    store.add_favorite("alice", 2);
    store.add_favorite("bob", 2);
    store.add_favorite("carol", 3);

    let sent = notify::fan_out(&store, id, "Chip stocks surge on record data-center demand")
        .await
        .unwrap();
    assert_eq!(sent, 2);

    let notifications = store.notifications();
    assert_eq!(notifications.len(), 2);
    let mut users: Vec<String> = notifications.iter().map(|n| n.user_id.clone()).collect();
    users.sort();
    assert_eq!(users, vec!["alice".to_string(), "bob".into()]);
    assert!(notifications.iter().all(|n| n.kind == "new_article"));
    assert!(notifications
        .iter()
        .all(|n| n.link.as_deref() == Some(format!("/article/{id}").as_str())));
}

#[tokio::test]
async fn long_headlines_are_capped_in_the_body() {
    let store = MemoryStore::with_sectors(&[(1, "stocks")]);
    let id = seeded_article(&store).await;
    store.attach_sectors(id, &[1]).await.unwrap();
    store.add_favorite("alice", 1);

    let headline = "h".repeat(500);
    notify::fan_out(&store, id, &headline).await.unwrap();
    assert_eq!(store.notifications()[0].body.chars().count(), 200);
}

#[tokio::test]
async fn articles_without_sectors_notify_nobody() {
    let store = MemoryStore::with_sectors(&[(1, "stocks")]);
    let id = seeded_article(&store).await;
    store.add_favorite("alice", 1);

    let sent = notify::fan_out(&store, id, "headline").await.unwrap();
    assert_eq!(sent, 0);
    assert!(store.notifications().is_empty());
}
