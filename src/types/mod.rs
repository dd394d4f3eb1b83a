//! Core types for the post store.

pub mod thread;
pub mod post;
pub mod path;
pub mod page;

pub use thread::{ThreadId, Thread, NewThread, ThreadRef};
pub use post::{PostId, Post, now_micros};
pub use path::{PostPath, EmptyPath};
pub use page::{SortMode, PageRequest, UnknownSortMode};
