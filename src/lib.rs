//! # forum-post-store
//!
//! Hierarchical post storage for forum threads.
//!
//! A thread's posts form a forest: every post optionally replies to another
//! post of the same thread. This crate stores that forest so that three
//! listing shapes are each one indexed range scan, and attaches new posts
//! in bounded, retried chunks.
//!
//! ## Architecture
//!
//! ```text
//! ThreadStore ──resolve──▶ Thread ──▶ BulkPostWriter ──insert_chunk──▶ PostStore
//!                                                                        │
//!                 get_posts_flat / get_posts_tree / get_posts_parent_tree ◀┘
//!                             (Postgres or Memory)
//! ```
//!
//! ## Ordering Guarantees
//!
//! - Flat listings are ordered by post id
//! - Tree listings are ordered by materialized path, then id
//! - Parent-tree listings page over root posts and return whole root groups
//! - Descending order is the exact reverse of ascending order
//! - A page resumes strictly after its `since` cursor, never repeating it

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod store;
pub mod writer;

// Re-exports
pub use types::{ThreadId, Thread, NewThread, ThreadRef};
pub use types::{PostId, Post, PostPath, EmptyPath};
pub use types::{SortMode, PageRequest, UnknownSortMode};
pub use store::{ThreadStore, PostStore, StoreError, ErrorKind, InsertedPost, PendingPost};
pub use store::InMemoryForumStore;
#[cfg(feature = "postgres")]
pub use store::{PostgresConfig, PostgresForumStore, PoolStats};
pub use writer::{BulkPostWriter, WriterConfig, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_ATTEMPTS};
