//! Postgres backend tests.
//!
//! Run with a disposable database:
//!
//! ```bash
//! TEST_DATABASE_URL=postgresql://localhost/forum_test cargo test --features postgres --test postgres_store
//! ```
//!
//! Every test creates its own thread, so ids are compared relative to the
//! first post of that thread rather than as absolute values.

#![cfg(feature = "postgres")]

use std::sync::Arc;

use tokio::sync::OnceCell;

use forum_post_store::{
    BulkPostWriter, ErrorKind, NewThread, PageRequest, PostId, Post, PostStore, PostgresConfig,
    PostgresForumStore, SortMode, Thread, ThreadRef, ThreadStore,
};

static SCHEMA: OnceCell<()> = OnceCell::const_new();

/// Connect and apply the schema once per test binary; `None` when no
/// database is configured.
async fn connect() -> Option<Arc<PostgresForumStore>> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return None;
        }
    };

    let mut config = PostgresConfig::with_url(url);
    config.max_connections = 2;
    config.min_connections = 0;
    let store = PostgresForumStore::new(config).await.unwrap();

    SCHEMA
        .get_or_try_init(|| async { store.apply_schema().await })
        .await
        .unwrap();
    Some(Arc::new(store))
}

async fn new_thread(store: &PostgresForumStore, slug: Option<&str>) -> Thread {
    let mut thread = NewThread::new("Postgres", "alice", "rust", "Backend test");
    if let Some(slug) = slug {
        thread = thread.with_slug(slug);
    }
    store.create(thread).await.unwrap()
}

fn unique_slug(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

async fn list(store: &PostgresForumStore, thread: &Thread, mode: SortMode, page: PageRequest) -> Vec<PostId> {
    store
        .list_posts(thread.id, mode, &page)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect()
}

#[tokio::test]
async fn test_listing_modes_over_a_small_forest() {
    let Some(store) = connect().await else { return };
    let thread = new_thread(&store, None).await;
    let writer = BulkPostWriter::new(Arc::clone(&store));

    let mut a = vec![Post::new("bob", "a", None)];
    writer.create_posts(&thread, &mut a).await.unwrap();
    let a = a[0].id;

    let mut bc = vec![Post::new("bob", "b", Some(a)), Post::new("bob", "c", None)];
    writer.create_posts(&thread, &mut bc).await.unwrap();
    let (b, c) = (bc[0].id, bc[1].id);

    let mut d = vec![Post::new("bob", "d", Some(b))];
    writer.create_posts(&thread, &mut d).await.unwrap();
    let d = d[0].id;

    assert_eq!(list(&store, &thread, SortMode::Flat, PageRequest::first(10)).await, vec![a, b, c, d]);
    assert_eq!(list(&store, &thread, SortMode::Tree, PageRequest::first(10)).await, vec![a, b, d, c]);
    assert_eq!(
        list(&store, &thread, SortMode::Tree, PageRequest::first(10).descending(true)).await,
        vec![c, d, b, a]
    );
    assert_eq!(list(&store, &thread, SortMode::ParentTree, PageRequest::first(1)).await, vec![a, b, d]);
    assert_eq!(
        list(&store, &thread, SortMode::ParentTree, PageRequest::first(1).after(d)).await,
        vec![c]
    );
    assert_eq!(
        list(&store, &thread, SortMode::ParentTree, PageRequest::first(1).descending(true)).await,
        vec![c]
    );
    assert_eq!(list(&store, &thread, SortMode::Tree, PageRequest::first(2).after(b)).await, vec![d, c]);
    assert_eq!(list(&store, &thread, SortMode::Flat, PageRequest::first(2).after(b)).await, vec![c, d]);

    let path = store.get_path(d).await.unwrap().unwrap();
    assert_eq!(path.ids(), &[a, b, d]);

    let descendants: Vec<PostId> = store.get_descendants(a).await.unwrap().into_iter().map(|p| p.id).collect();
    assert_eq!(descendants, vec![b, d]);
}

#[tokio::test]
async fn test_bulk_insert_of_25_posts() {
    let Some(store) = connect().await else { return };
    let thread = new_thread(&store, None).await;
    let writer = BulkPostWriter::new(Arc::clone(&store));

    let mut posts: Vec<Post> = (0..25).map(|i| Post::new("bob", format!("post {}", i), None)).collect();
    writer.create_posts(&thread, &mut posts).await.unwrap();

    let created = posts[0].created;
    for (i, post) in posts.iter().enumerate() {
        assert!(post.id.is_assigned());
        assert_eq!(post.created, created);

        let stored = store.get_post(post.id).await.unwrap().unwrap();
        assert_eq!(stored.message, format!("post {}", i));
        assert_eq!(stored.created, created);
        assert_eq!(stored.forum, "rust");
        assert_eq!(stored.thread, thread.id);
    }

    let listed = list(&store, &thread, SortMode::Flat, PageRequest::first(100)).await;
    assert_eq!(listed.len(), 25);
}

#[tokio::test]
async fn test_missing_parent_is_reported() {
    let Some(store) = connect().await else { return };
    let thread = new_thread(&store, None).await;
    let writer = BulkPostWriter::new(Arc::clone(&store));

    let mut posts: Vec<Post> = (0..25).map(|i| Post::new("bob", format!("post {}", i), None)).collect();
    posts[22].parent = Some(PostId::new(i64::MAX));
    let err = writer.create_posts(&thread, &mut posts).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ParentPostNotExist);

    // First chunk committed, second chunk failed as one statement
    assert!(posts[..20].iter().all(|p| p.id.is_assigned()));
    assert!(posts[20..].iter().all(|p| !p.id.is_assigned()));
    let listed = list(&store, &thread, SortMode::Flat, PageRequest::first(100)).await;
    assert_eq!(listed.len(), 20);
}

#[tokio::test]
async fn test_cross_thread_parent_is_rejected() {
    let Some(store) = connect().await else { return };
    let ours = new_thread(&store, None).await;
    let theirs = new_thread(&store, None).await;
    let writer = BulkPostWriter::new(Arc::clone(&store));

    let mut foreign = vec![Post::new("bob", "elsewhere", None)];
    writer.create_posts(&theirs, &mut foreign).await.unwrap();

    let mut reply = vec![Post::new("carol", "cross", Some(foreign[0].id))];
    let err = writer.create_posts(&ours, &mut reply).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ParentPostNotExist);
}

#[tokio::test]
async fn test_cursor_from_other_thread_is_empty() {
    let Some(store) = connect().await else { return };
    let ours = new_thread(&store, None).await;
    let theirs = new_thread(&store, None).await;
    let writer = BulkPostWriter::new(Arc::clone(&store));

    let mut roots = vec![Post::new("bob", "a", None), Post::new("bob", "b", None)];
    writer.create_posts(&ours, &mut roots).await.unwrap();
    let mut foreign = vec![Post::new("carol", "c", None)];
    writer.create_posts(&theirs, &mut foreign).await.unwrap();
    let cursor = foreign[0].id;

    for desc in [false, true] {
        let page = PageRequest::first(10).after(cursor).descending(desc);
        assert!(list(&store, &ours, SortMode::Tree, page).await.is_empty());
        assert!(list(&store, &ours, SortMode::ParentTree, page).await.is_empty());
    }
}

#[tokio::test]
async fn test_thread_lookup_by_slug_and_id() {
    let Some(store) = connect().await else { return };
    let slug = unique_slug("pg");
    let thread = new_thread(&store, Some(&slug)).await;

    let by_slug = store.resolve(&ThreadRef::Slug(slug.to_uppercase())).await.unwrap();
    let by_id = store.resolve(&ThreadRef::Id(thread.id)).await.unwrap();
    assert_eq!(by_slug.id, thread.id);
    assert_eq!(by_id.id, thread.id);
    assert_eq!(store.get_votes(thread.id).await.unwrap(), 0);

    let duplicate = store
        .create(NewThread::new("Again", "bob", "rust", "Same slug").with_slug(&slug))
        .await
        .unwrap_err();
    assert_eq!(duplicate.kind(), ErrorKind::Conflict);

    let missing = store.resolve(&ThreadRef::Slug(unique_slug("missing"))).await.unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}
