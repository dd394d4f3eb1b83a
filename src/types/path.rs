//! Materialized ancestry paths.
//!
//! Every post carries the ordered chain of ids from its root post down to
//! and including itself. With that chain stored and indexed, the three
//! listing shapes become single range scans:
//!
//! - tree order is plain lexicographic order over paths, so a parent always
//!   precedes its descendants and siblings stay adjacent;
//! - "descendants of P" is every path that starts with `path(P)`;
//! - parent-tree grouping keys on the first element, the root id.
//!
//! A path is fixed when its post is inserted. There is no re-parenting.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::post::PostId;

/// Ordered ancestor chain of a post, ending with the post itself.
///
/// `Ord` is lexicographic with a proper prefix sorting first, which is the
/// same order Postgres applies to `BIGINT[]` values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<PostId>", into = "Vec<PostId>")]
pub struct PostPath(Vec<PostId>);

/// A path must name at least the post itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("post path is empty")]
pub struct EmptyPath;

impl TryFrom<Vec<PostId>> for PostPath {
    type Error = EmptyPath;

    fn try_from(ids: Vec<PostId>) -> Result<Self, Self::Error> {
        Self::from_ids(ids).ok_or(EmptyPath)
    }
}

impl From<PostPath> for Vec<PostId> {
    fn from(path: PostPath) -> Self {
        path.0
    }
}

impl PostPath {
    /// Path of a root post.
    pub fn root(id: PostId) -> Self {
        Self(vec![id])
    }

    /// Path of a reply: the parent's path extended by the reply's id.
    pub fn child_of(parent: &PostPath, id: PostId) -> Self {
        let mut ids = Vec::with_capacity(parent.0.len() + 1);
        ids.extend_from_slice(&parent.0);
        ids.push(id);
        Self(ids)
    }

    /// Rebuild a path read back from storage.
    ///
    /// Returns `None` for an empty chain, which no stored post can have.
    pub fn from_ids(ids: Vec<PostId>) -> Option<Self> {
        if ids.is_empty() {
            None
        } else {
            Some(Self(ids))
        }
    }

    /// Id of the root ancestor (`path[1]` in SQL terms).
    pub fn root_id(&self) -> PostId {
        self.0[0]
    }

    /// Id of the post this path belongs to.
    pub fn last(&self) -> PostId {
        self.0[self.0.len() - 1]
    }

    /// Id of the direct parent, `None` for a root post.
    pub fn parent_id(&self) -> Option<PostId> {
        if self.0.len() > 1 {
            Some(self.0[self.0.len() - 2])
        } else {
            None
        }
    }

    /// Number of ancestors above this post (0 for a root).
    pub fn depth(&self) -> usize {
        self.0.len() - 1
    }

    /// Whether `prefix` is a prefix of this path (a path starts with itself).
    pub fn starts_with(&self, prefix: &PostPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Whether this path names a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &PostPath) -> bool {
        self.0.len() < other.0.len() && other.starts_with(self)
    }

    /// The ids, root first.
    pub fn ids(&self) -> &[PostId] {
        &self.0
    }

    /// Raw values for binding into an array parameter.
    pub fn to_i64s(&self) -> Vec<i64> {
        self.0.iter().map(|id| id.as_i64()).collect()
    }
}

impl fmt::Display for PostPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|id| id.to_string()).collect();
        write!(f, "{{{}}}", parts.join(","))
    }
}
