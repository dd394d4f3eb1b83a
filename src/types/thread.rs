//! Thread types for the post store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::post::rfc3339;

/// Unique identifier for a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(i64);

impl ThreadId {
    /// Placeholder id for threads that have not been created.
    pub const UNASSIGNED: ThreadId = ThreadId(0);

    /// Create a ThreadId from its raw value.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ThreadId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A top-level discussion container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    /// Store-assigned identifier.
    pub id: ThreadId,
    /// Title, mutable through update.
    pub title: String,
    /// Author nickname.
    pub author: String,
    /// Slug of the owning forum.
    pub forum: String,
    /// Opening message, mutable through update.
    pub message: String,
    /// Optional unique human-readable identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    /// Denormalized vote total, maintained outside this crate.
    #[serde(default)]
    pub votes: i32,
    /// Server-assigned creation time.
    #[serde(with = "rfc3339")]
    pub created: DateTime<Utc>,
}

/// Caller-supplied fields for creating a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewThread {
    /// Thread title.
    pub title: String,
    /// Author nickname.
    pub author: String,
    /// Owning forum slug.
    pub forum: String,
    /// Opening message.
    pub message: String,
    /// Optional unique slug; empty means none.
    #[serde(default)]
    pub slug: Option<String>,
}

impl NewThread {
    /// Create a thread request without a slug.
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        forum: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            forum: forum.into(),
            message: message.into(),
            slug: None,
        }
    }

    /// Attach a slug. Empty slugs are treated as absent.
    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        let slug = slug.into();
        self.slug = if slug.is_empty() { None } else { Some(slug) };
        self
    }
}

/// Selector for a thread: either its numeric id or its slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ThreadRef {
    /// Numeric id.
    Id(ThreadId),
    /// Human-readable slug.
    Slug(String),
}

impl FromStr for ThreadRef {
    type Err = std::convert::Infallible;

    /// All-digit input names an id; anything else is a slug.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(id) = s.parse::<i64>() {
                return Ok(Self::Id(ThreadId::new(id)));
            }
        }
        Ok(Self::Slug(s.to_string()))
    }
}

impl fmt::Display for ThreadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {}", id),
            Self::Slug(slug) => write!(f, "slug {}", slug),
        }
    }
}

impl From<ThreadId> for ThreadRef {
    fn from(id: ThreadId) -> Self {
        Self::Id(id)
    }
}
