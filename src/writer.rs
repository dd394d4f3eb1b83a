//! Chunked bulk insertion of posts into a thread.
//!
//! ## Algorithm
//!
//! 1. Take one `created` timestamp for the whole batch
//! 2. Stamp every post with the thread's forum and id, clear any id
//! 3. Split the batch into chunks of `chunk_size` rows
//! 4. Insert each chunk as one statement; every row carries its batch
//!    position (`slot`) so generated ids are matched to rows explicitly
//! 5. A statement that returns no rows and no error is retried immediately,
//!    up to `max_attempts` attempts in total
//! 6. The first failing chunk aborts the batch
//!
//! Chunks are independent statements. A failure in chunk K leaves chunks
//! 0..K committed with their ids filled in; later positions keep
//! `PostId::UNASSIGNED`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use crate::store::{InsertedPost, PendingPost, PostStore, Result, StoreError};
use crate::types::{now_micros, Post, PostId, Thread};

/// Rows per insert statement.
pub const DEFAULT_CHUNK_SIZE: usize = 20;

/// Attempts per chunk when the statement returns no rows.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Bulk writer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Maximum rows per insert statement (default: 20).
    pub chunk_size: usize,
    /// Attempts per chunk before giving up on empty results (default: 3).
    pub max_attempts: u32,
}

impl WriterConfig {
    /// Load from `POST_CHUNK_SIZE` and `POST_INSERT_ATTEMPTS`, clamped to at least 1.
    pub fn from_env() -> Self {
        let chunk_size = std::env::var("POST_CHUNK_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CHUNK_SIZE);
        let max_attempts = std::env::var("POST_INSERT_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);
        Self::new(chunk_size, max_attempts)
    }

    /// Explicit settings, clamped to at least 1.
    pub fn new(chunk_size: usize, max_attempts: u32) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Number of insert statements a batch of `posts` rows needs.
    pub fn chunk_count(&self, posts: usize) -> usize {
        posts.div_ceil(self.chunk_size.max(1))
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_MAX_ATTEMPTS)
    }
}

/// Attaches batches of new posts to threads.
pub struct BulkPostWriter<S: PostStore> {
    store: Arc<S>,
    config: WriterConfig,
}

impl<S: PostStore + 'static> BulkPostWriter<S> {
    /// Create a writer with default settings.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, WriterConfig::default())
    }

    /// Create a writer with explicit settings.
    pub fn with_config(store: Arc<S>, config: WriterConfig) -> Self {
        Self {
            store,
            config: WriterConfig::new(config.chunk_size, config.max_attempts),
        }
    }

    /// Active settings.
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Insert `posts` into `thread`, filling `id`, `forum`, `thread` and
    /// `created` of every element in place.
    ///
    /// All posts of one call share the same `created` value. On error the
    /// posts of already committed chunks keep their ids; there is no
    /// rollback across chunks.
    pub async fn create_posts(&self, thread: &Thread, posts: &mut [Post]) -> Result<()> {
        let batch_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "create_posts",
            batch_id = %batch_id,
            thread_id = %thread.id,
            batch_size = posts.len()
        );
        self.write_batch(thread, posts).instrument(span).await
    }

    async fn write_batch(&self, thread: &Thread, posts: &mut [Post]) -> Result<()> {
        if posts.is_empty() {
            return Ok(());
        }

        let created = now_micros();
        for post in posts.iter_mut() {
            post.id = PostId::UNASSIGNED;
            post.forum = thread.forum.clone();
            post.thread = thread.id;
            post.created = created;
        }

        let chunk_size = self.config.chunk_size;
        let chunks = self.config.chunk_count(posts.len());
        for (index, chunk) in posts.chunks_mut(chunk_size).enumerate() {
            let offset = index * chunk_size;
            let rows: Vec<PendingPost> = chunk
                .iter()
                .enumerate()
                .map(|(i, post)| PendingPost::from_post(offset + i, post))
                .collect();

            let inserted = self.insert_with_retry(index, &rows).await?;
            assign_ids(chunk, offset, &inserted)?;
            tracing::debug!(chunk = index, of = chunks, rows = rows.len(), "Chunk committed");
        }

        tracing::info!(chunks = chunks, "Posts created");
        Ok(())
    }

    async fn insert_with_retry(&self, chunk: usize, rows: &[PendingPost]) -> Result<Vec<InsertedPost>> {
        let attempts = self.config.max_attempts;
        for attempt in 1..=attempts {
            let inserted = self.store.insert_chunk(rows).await.map_err(|e| {
                tracing::warn!(chunk = chunk, attempt = attempt, error = %e, "Chunk insert failed");
                e
            })?;

            if !inserted.is_empty() {
                return Ok(inserted);
            }
            tracing::warn!(chunk = chunk, attempt = attempt, "Chunk insert returned no rows");
        }

        Err(StoreError::ChunkNotPersisted { chunk, attempts })
    }
}

/// Write generated ids back by slot; every row of the chunk must get exactly one.
fn assign_ids(chunk: &mut [Post], offset: usize, inserted: &[InsertedPost]) -> Result<()> {
    if inserted.len() != chunk.len() {
        return Err(StoreError::Storage(format!(
            "chunk at {} returned {} ids for {} rows",
            offset,
            inserted.len(),
            chunk.len()
        )));
    }

    for row in inserted {
        let post = row
            .slot
            .checked_sub(offset)
            .and_then(|i| chunk.get_mut(i))
            .ok_or_else(|| StoreError::Storage(format!("insert returned unknown slot {}", row.slot)))?;
        if post.id.is_assigned() {
            return Err(StoreError::Storage(format!("insert returned slot {} twice", row.slot)));
        }
        post.id = row.id;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::store::{ErrorKind, InMemoryForumStore, ThreadStore};
    use crate::types::{NewThread, PageRequest, PostPath, SortMode, ThreadId};

    /// Delegating store that misbehaves on demand.
    #[derive(Default)]
    struct ScriptedStore {
        inner: InMemoryForumStore,
        /// Next N chunk inserts return no rows without writing.
        empty_results: AtomicU32,
        /// Return generated ids in reverse row order.
        reverse: bool,
    }

    #[async_trait]
    impl PostStore for ScriptedStore {
        async fn get_post(&self, id: PostId) -> Result<Option<Post>> {
            self.inner.get_post(id).await
        }

        async fn get_path(&self, id: PostId) -> Result<Option<PostPath>> {
            self.inner.get_path(id).await
        }

        async fn get_descendants(&self, id: PostId) -> Result<Vec<Post>> {
            self.inner.get_descendants(id).await
        }

        async fn list_posts(&self, thread: ThreadId, mode: SortMode, page: &PageRequest) -> Result<Vec<Post>> {
            self.inner.list_posts(thread, mode, page).await
        }

        async fn insert_chunk(&self, rows: &[PendingPost]) -> Result<Vec<InsertedPost>> {
            let pending = self.empty_results.load(Ordering::SeqCst);
            if pending > 0 {
                self.empty_results.store(pending - 1, Ordering::SeqCst);
                return Ok(Vec::new());
            }
            let mut inserted = self.inner.insert_chunk(rows).await?;
            if self.reverse {
                inserted.reverse();
            }
            Ok(inserted)
        }
    }

    async fn setup(store: &InMemoryForumStore) -> Thread {
        store
            .create(NewThread::new("Title", "alice", "rust", "Opening"))
            .await
            .unwrap()
    }

    fn batch(n: usize) -> Vec<Post> {
        (0..n).map(|i| Post::new("bob", format!("message {}", i), None)).collect()
    }

    #[test]
    fn test_chunk_count() {
        let config = WriterConfig::default();
        assert_eq!(config.chunk_count(0), 0);
        assert_eq!(config.chunk_count(1), 1);
        assert_eq!(config.chunk_count(20), 1);
        assert_eq!(config.chunk_count(21), 2);
        assert_eq!(config.chunk_count(45), 3);
    }

    #[test]
    fn test_config_clamps_to_one() {
        let config = WriterConfig::new(0, 0);
        assert_eq!(config.chunk_size, 1);
        assert_eq!(config.max_attempts, 1);
    }

    #[tokio::test]
    async fn test_empty_batch_touches_nothing() {
        let store = Arc::new(InMemoryForumStore::new());
        let thread = setup(&store).await;
        let writer = BulkPostWriter::new(Arc::clone(&store));

        let mut posts: Vec<Post> = Vec::new();
        writer.create_posts(&thread, &mut posts).await.unwrap();
        assert_eq!(store.insert_statements(), 0);
    }

    #[tokio::test]
    async fn test_retries_empty_results() {
        let scripted = ScriptedStore {
            empty_results: AtomicU32::new(2),
            ..Default::default()
        };
        let thread = setup(&scripted.inner).await;
        let store = Arc::new(scripted);
        let writer = BulkPostWriter::new(Arc::clone(&store));

        let mut posts = batch(3);
        writer.create_posts(&thread, &mut posts).await.unwrap();

        assert!(posts.iter().all(|p| p.id.is_assigned()));
        assert_eq!(store.inner.num_posts(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let scripted = ScriptedStore {
            empty_results: AtomicU32::new(3),
            ..Default::default()
        };
        let thread = setup(&scripted.inner).await;
        let writer = BulkPostWriter::new(Arc::new(scripted));

        let mut posts = batch(3);
        let err = writer.create_posts(&thread, &mut posts).await.unwrap_err();

        assert!(matches!(err, StoreError::ChunkNotPersisted { chunk: 0, attempts: 3 }));
        assert_eq!(err.kind(), ErrorKind::StorageFailure);
        assert!(posts.iter().all(|p| !p.id.is_assigned()));
    }

    #[tokio::test]
    async fn test_correlates_by_slot_not_order() {
        let scripted = ScriptedStore {
            reverse: true,
            ..Default::default()
        };
        let thread = setup(&scripted.inner).await;
        let store = Arc::new(scripted);
        let writer = BulkPostWriter::new(Arc::clone(&store));

        let mut posts = batch(25);
        writer.create_posts(&thread, &mut posts).await.unwrap();

        for post in &posts {
            let stored = store.get_post(post.id).await.unwrap().unwrap();
            assert_eq!(stored.message, post.message);
        }
    }

    #[test]
    fn test_assign_ids_rejects_bad_slots() {
        let mut chunk = batch(2);
        let dup = [
            InsertedPost { slot: 20, id: PostId::new(1) },
            InsertedPost { slot: 20, id: PostId::new(2) },
        ];
        assert!(assign_ids(&mut chunk, 20, &dup).is_err());

        let mut chunk = batch(2);
        let outside = [
            InsertedPost { slot: 3, id: PostId::new(1) },
            InsertedPost { slot: 20, id: PostId::new(2) },
        ];
        assert!(assign_ids(&mut chunk, 20, &outside).is_err());

        let mut chunk = batch(2);
        let short = [InsertedPost { slot: 20, id: PostId::new(1) }];
        assert!(assign_ids(&mut chunk, 20, &short).is_err());
    }
}
