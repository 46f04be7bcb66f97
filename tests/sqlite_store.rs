//! SQLite-backed store and vector index against a scratch database.

use std::collections::HashSet;
use std::sync::Arc;

use tempfile::TempDir;

use thoughtsynth::config::{parse_config, Config};
use thoughtsynth::db;
use thoughtsynth::migrate;
use thoughtsynth::sqlite_store::SqliteStore;
use thoughtsynth::vector_index::SqliteVectorIndex;
use thoughtsynth_core::models::{
    Analysis, ContentType, ContentUpdate, NewChatMessage, NewContentItem, SenderKind, TagKind,
};
use thoughtsynth_core::store::Store;
use thoughtsynth_core::vector::{
    VectorFilter, VectorIndex, VectorKind, VectorMetadata, VectorRecord,
};

fn config_in(dir: &TempDir) -> Config {
    parse_config(&format!(
        r#"
[db]
path = "{}/data/synth.sqlite"

[server]
bind = "127.0.0.1:0"
"#,
        dir.path().display()
    ))
    .unwrap()
}

async fn open_store() -> (TempDir, SqliteStore) {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    migrate::run_migrations(&config).await.unwrap();
    let pool = db::connect(&config).await.unwrap();
    (dir, SqliteStore::new(pool))
}

fn new_item(owner: &str, title: &str, body: &str) -> NewContentItem {
    NewContentItem {
        url: format!("https://example.com/{}", title.replace(' ', "-")),
        title: title.to_string(),
        content_type: ContentType::Article,
        raw_content: body.to_string(),
        ai_analysis: Some(Analysis {
            summary: "s".into(),
            tags: vec!["rust".into()],
            ..Default::default()
        }),
        owner_id: owner.to_string(),
    }
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    migrate::run_migrations(&config).await.unwrap();
    migrate::run_migrations(&config).await.unwrap();
    assert!(dir.path().join("data/synth.sqlite").exists());
}

#[tokio::test]
async fn item_round_trips_with_analysis() {
    let (_dir, store) = open_store().await;
    let created = store
        .create_content_item(&new_item("u1", "Ownership", "body"))
        .await
        .unwrap();
    let loaded = store.get_content_item(created.id).await.unwrap().unwrap();
    assert_eq!(loaded, created);
    assert_eq!(loaded.ai_analysis.unwrap().tags, vec!["rust"]);
    assert!(store.get_content_item(created.id + 100).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_first_access_creates_one_thread() {
    let (_dir, store) = open_store().await;
    let store = Arc::new(store);
    let item = store
        .create_content_item(&new_item("u1", "Race", "body"))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..32 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.get_or_create_thread(item.id).await.unwrap().id
        }));
    }
    let mut ids = HashSet::new();
    for h in handles {
        ids.insert(h.await.unwrap());
    }
    assert_eq!(ids.len(), 1);

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM chat_threads WHERE content_item_id = ?")
            .bind(item.id)
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn thread_requires_existing_item() {
    let (_dir, store) = open_store().await;
    assert!(store.get_or_create_thread(999).await.is_err());
}

#[tokio::test]
async fn messages_are_chronological() {
    let (_dir, store) = open_store().await;
    let item = store
        .create_content_item(&new_item("u1", "Chat", "body"))
        .await
        .unwrap();
    let thread = store.get_or_create_thread(item.id).await.unwrap();

    for i in 0..6 {
        let msg = if i % 2 == 1 {
            NewChatMessage::ai(thread.id, format!("reply {}", i))
        } else {
            NewChatMessage::user(thread.id, "u1", "Ada", format!("msg {}", i))
        };
        store.append_message(msg).await.unwrap();
    }

    let messages = store.list_messages(thread.id).await.unwrap();
    assert_eq!(messages.len(), 6);
    for (i, m) in messages.iter().enumerate() {
        assert!(m.text.ends_with(&i.to_string()));
    }
    assert!(messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    assert_eq!(messages[1].sender_kind, SenderKind::Ai);
    assert!(messages[1].sender_id.is_none());
    assert_eq!(messages[0].sender_id.as_deref(), Some("u1"));
}

#[tokio::test]
async fn delete_cascades_to_derived_rows() {
    let (_dir, store) = open_store().await;
    let item = store
        .create_content_item(&new_item("u1", "Doomed", "body"))
        .await
        .unwrap();
    store.create_tag(item.id, "rust", TagKind::Auto).await.unwrap();
    let takeaway = store.create_takeaway(item.id, "u1", "note").await.unwrap();
    let thread = store.get_or_create_thread(item.id).await.unwrap();
    store
        .append_message(NewChatMessage::user(thread.id, "u1", "Ada", "hi"))
        .await
        .unwrap();

    assert!(store.delete_content_item(item.id).await.unwrap());
    assert!(!store.delete_content_item(item.id).await.unwrap());

    assert!(store.get_content_item(item.id).await.unwrap().is_none());
    assert!(store.get_takeaway(takeaway.id).await.unwrap().is_none());
    assert!(store.list_tags(item.id).await.unwrap().is_empty());
    assert!(store.get_thread(item.id).await.unwrap().is_none());
    assert!(store.list_messages(thread.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn list_and_search_are_owner_scoped_newest_first() {
    let (_dir, store) = open_store().await;
    let first = store
        .create_content_item(&new_item("u1", "Rust Ownership", "borrow checker"))
        .await
        .unwrap();
    let second = store
        .create_content_item(&new_item("u1", "Async", "Rust futures"))
        .await
        .unwrap();
    store
        .create_content_item(&new_item("u2", "Rust for Bob", "x"))
        .await
        .unwrap();

    let listed = store.list_content_items("u1", 10).await.unwrap();
    assert_eq!(
        listed.iter().map(|i| i.id).collect::<Vec<_>>(),
        vec![second.id, first.id]
    );
    assert_eq!(store.list_content_items("u1", 1).await.unwrap().len(), 1);

    let hits = store.search_content_items("u1", "rust", 10).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|i| i.owner_id == "u1"));

    let hits = store.search_content_items("u1", "BORROW", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, first.id);
}

#[tokio::test]
async fn search_folds_non_ascii_case_and_respects_limit() {
    let (_dir, store) = open_store().await;
    let first = store
        .create_content_item(&new_item("u1", "Café Culture", "ÉCOLE notes"))
        .await
        .unwrap();
    let second = store
        .create_content_item(&new_item("u1", "Über Rust", "École again"))
        .await
        .unwrap();

    let hits = store.search_content_items("u1", "école", 10).await.unwrap();
    assert_eq!(
        hits.iter().map(|i| i.id).collect::<Vec<_>>(),
        vec![second.id, first.id]
    );
    let hits = store.search_content_items("u1", "CAFÉ", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, first.id);
    assert_eq!(store.search_content_items("u1", "école", 1).await.unwrap().len(), 1);
    assert!(store.search_content_items("u1", "100%", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn partial_update_keeps_other_fields() {
    let (_dir, store) = open_store().await;
    let item = store
        .create_content_item(&new_item("u1", "Old", "body"))
        .await
        .unwrap();
    let updated = store
        .update_content_item(
            item.id,
            &ContentUpdate {
                title: Some("New".into()),
                raw_content: None,
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.title, "New");
    assert_eq!(updated.raw_content, "body");
    assert!(updated.updated_at >= item.updated_at);

    let missing = store
        .update_content_item(item.id + 1, &ContentUpdate::default())
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn takeaway_update_and_listing() {
    let (_dir, store) = open_store().await;
    let item = store
        .create_content_item(&new_item("u1", "Notes", "body"))
        .await
        .unwrap();
    let a = store.create_takeaway(item.id, "u1", "one").await.unwrap();
    store.create_takeaway(item.id, "u1", "two").await.unwrap();

    let edited = store.update_takeaway(a.id, "uno").await.unwrap().unwrap();
    assert_eq!(edited.text, "uno");
    let texts: Vec<String> = store
        .list_takeaways(item.id)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.text)
        .collect();
    assert_eq!(texts, vec!["uno", "two"]);
}

fn record(id: &str, content_id: i64, owner: &str, kind: VectorKind, values: Vec<f32>) -> VectorRecord {
    VectorRecord {
        id: id.to_string(),
        values,
        metadata: VectorMetadata {
            content_id,
            kind,
            owner_id: owner.to_string(),
            title: format!("item {}", content_id),
            url: None,
            content_type: Some("article".into()),
            summary: None,
            tags: Vec::new(),
            takeaway_id: None,
            takeaway_text: None,
            created_at: "2024-01-01T00:00:00Z".into(),
        },
    }
}

#[tokio::test]
async fn local_vector_index_filters_ranks_and_deletes() {
    let (_dir, store) = open_store().await;
    let index = SqliteVectorIndex::new(store.pool().clone());

    index
        .upsert(&[
            record("content-1", 1, "u1", VectorKind::Content, vec![1.0, 0.0]),
            record("takeaway-5", 1, "u1", VectorKind::Takeaway, vec![0.7, 0.7]),
            record("content-2", 2, "u1", VectorKind::Content, vec![0.0, 1.0]),
            record("content-3", 3, "u2", VectorKind::Content, vec![1.0, 0.0]),
        ])
        .await
        .unwrap();
    // Upsert replaces in place
    index
        .upsert(&[record("content-2", 2, "u1", VectorKind::Content, vec![0.1, 1.0])])
        .await
        .unwrap();

    let hits = index
        .query(&[1.0, 0.0], &VectorFilter::owner("u1"), 10)
        .await
        .unwrap();
    assert_eq!(
        hits.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
        vec!["content-1", "takeaway-5", "content-2"]
    );

    let for_item = index
        .query(&[0.0, 0.0], &VectorFilter::content(1), 100)
        .await
        .unwrap();
    let ids: Vec<String> = for_item.into_iter().map(|m| m.id).collect();
    assert_eq!(ids.len(), 2);

    index.delete_many(&ids).await.unwrap();
    let remaining = index
        .query(&[1.0, 0.0], &VectorFilter::default(), 10)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|m| m.metadata.content_id != 1));
}
