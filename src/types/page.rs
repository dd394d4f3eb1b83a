//! Listing modes and cursor pagination.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::post::PostId;

/// Traversal order of a post listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Thread order, ignoring tree shape.
    Flat,
    /// Full path order: parents before descendants, siblings adjacent.
    Tree,
    /// Whole root groups in path order; pages advance by root posts.
    ParentTree,
}

impl Default for SortMode {
    fn default() -> Self {
        Self::Flat
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flat => write!(f, "flat"),
            Self::Tree => write!(f, "tree"),
            Self::ParentTree => write!(f, "parent_tree"),
        }
    }
}

/// Unknown sort mode name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown sort mode: {0}")]
pub struct UnknownSortMode(pub String);

impl FromStr for SortMode {
    type Err = UnknownSortMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "flat" | "" => Ok(Self::Flat),
            "tree" => Ok(Self::Tree),
            "parent_tree" => Ok(Self::ParentTree),
            _ => Err(UnknownSortMode(s.to_string())),
        }
    }
}

/// One page of a listing.
///
/// `limit` counts posts for flat and tree listings and root groups for
/// parent-tree listings. `since` is the id of the last post seen on the
/// previous page; results are strictly after it in the requested direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRequest {
    /// Maximum posts, or root groups for parent-tree listings.
    pub limit: u32,
    /// Last id of the previous page; `None` starts at the beginning.
    #[serde(default)]
    pub since: Option<PostId>,
    /// Descending order.
    #[serde(default)]
    pub desc: bool,
}

impl PageRequest {
    /// First page in ascending order.
    pub fn first(limit: u32) -> Self {
        Self {
            limit,
            since: None,
            desc: false,
        }
    }

    /// Build from the raw wire values, where a negative `since` means "no cursor".
    pub fn from_raw(limit: u32, since: i64, desc: bool) -> Self {
        Self {
            limit,
            since: if since < 0 { None } else { Some(PostId::new(since)) },
            desc,
        }
    }

    /// Continue after `since`.
    pub fn after(mut self, since: PostId) -> Self {
        self.since = Some(since);
        self
    }

    /// Set the direction.
    pub fn descending(mut self, desc: bool) -> Self {
        self.desc = desc;
        self
    }

    /// Whether the page can contain anything at all.
    pub fn is_empty(&self) -> bool {
        self.limit == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_mode_names() {
        for mode in [SortMode::Flat, SortMode::Tree, SortMode::ParentTree] {
            assert_eq!(mode.to_string().parse::<SortMode>().unwrap(), mode);
        }
        assert_eq!("".parse::<SortMode>().unwrap(), SortMode::Flat);
        assert!("nested".parse::<SortMode>().is_err());
    }

    #[test]
    fn test_sort_mode_serde() {
        let json = serde_json::to_string(&SortMode::ParentTree).unwrap();
        assert_eq!(json, "\"parent_tree\"");
    }

    #[test]
    fn test_raw_cursor_sentinel() {
        assert_eq!(PageRequest::from_raw(10, -1, false).since, None);
        assert_eq!(PageRequest::from_raw(10, 3, true).since, Some(PostId::new(3)));
        assert!(PageRequest::first(0).is_empty());
    }
}
