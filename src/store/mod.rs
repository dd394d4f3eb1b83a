//! Thread and post storage backends.

pub mod error;
pub mod memory;
pub mod schema;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{NewThread, PageRequest, Post, PostId, PostPath, SortMode, Thread, ThreadId, ThreadRef};

pub use error::{ErrorKind, Result, StoreError};

/// Thread lookups and single-row mutations.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Fetch a thread by slug.
    async fn get_by_slug(&self, slug: &str) -> Result<Thread>;

    /// Fetch a thread by id.
    async fn get_by_id(&self, id: ThreadId) -> Result<Thread>;

    /// Fetch a thread by either selector.
    async fn resolve(&self, thread: &ThreadRef) -> Result<Thread> {
        match thread {
            ThreadRef::Id(id) => self.get_by_id(*id).await,
            ThreadRef::Slug(slug) => self.get_by_slug(slug).await,
        }
    }

    /// Create a thread; the store assigns `id` and `created`.
    async fn create(&self, thread: NewThread) -> Result<Thread>;

    /// Overwrite `title` and `message` of the thread with `thread.id`.
    async fn update(&self, thread: &Thread) -> Result<()>;

    /// Signed vote total of a thread (0 when nobody voted).
    async fn get_votes(&self, id: ThreadId) -> Result<i32>;
}

/// One row of a chunk insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPost {
    /// Position of the row in the caller's batch.
    pub slot: usize,
    /// Parent post, `None` for a root.
    pub parent: Option<PostId>,
    /// Author nickname.
    pub author: String,
    /// Message body.
    pub message: String,
    /// Forum stamped from the thread.
    pub forum: String,
    /// Owning thread.
    pub thread: ThreadId,
    /// Shared batch timestamp.
    pub created: DateTime<Utc>,
}

impl PendingPost {
    /// Project a stamped post into an insert row.
    pub fn from_post(slot: usize, post: &Post) -> Self {
        Self {
            slot,
            parent: post.parent,
            author: post.author.clone(),
            message: post.message.clone(),
            forum: post.forum.clone(),
            thread: post.thread,
            created: post.created,
        }
    }
}

/// Generated id for one row of a chunk insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InsertedPost {
    /// Same `slot` as the `PendingPost` it came from.
    pub slot: usize,
    /// Id the store assigned.
    pub id: PostId,
}

/// Post reads and the chunk insert primitive.
///
/// Every listing returns an empty vector rather than an error when nothing
/// matches. Implementations must produce the exact orders documented on
/// [`SortMode`] so that pages resume without gaps or duplicates.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Fetch a post by id.
    async fn get_post(&self, id: PostId) -> Result<Option<Post>>;

    /// Fetch the materialized path of a post.
    async fn get_path(&self, id: PostId) -> Result<Option<PostPath>>;

    /// All strict descendants of a post, in path order.
    async fn get_descendants(&self, id: PostId) -> Result<Vec<Post>>;

    /// One page of a thread's posts in the given traversal order.
    async fn list_posts(&self, thread: ThreadId, mode: SortMode, page: &PageRequest) -> Result<Vec<Post>>;

    /// Insert one chunk as a single statement.
    ///
    /// Returns one `InsertedPost` per row, in any order. An empty result with
    /// no error means nothing was written and the statement may be retried.
    async fn insert_chunk(&self, rows: &[PendingPost]) -> Result<Vec<InsertedPost>>;

    /// Posts in id order.
    async fn get_posts_flat(&self, thread: ThreadId, limit: u32, since: Option<PostId>, desc: bool) -> Result<Vec<Post>> {
        let page = PageRequest { limit, since, desc };
        self.list_posts(thread, SortMode::Flat, &page).await
    }

    /// Posts in path order.
    async fn get_posts_tree(&self, thread: ThreadId, limit: u32, since: Option<PostId>, desc: bool) -> Result<Vec<Post>> {
        let page = PageRequest { limit, since, desc };
        self.list_posts(thread, SortMode::Tree, &page).await
    }

    /// Whole root groups, `limit` roots per page.
    async fn get_posts_parent_tree(&self, thread: ThreadId, limit: u32, since: Option<PostId>, desc: bool) -> Result<Vec<Post>> {
        let page = PageRequest { limit, since, desc };
        self.list_posts(thread, SortMode::ParentTree, &page).await
    }
}

pub use memory::InMemoryForumStore;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresConfig, PostgresForumStore, PoolStats};
