//! Post types for the post store.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::thread::ThreadId;

/// Unique identifier for a post.
///
/// Ids are assigned by the store at insertion time and are never supplied
/// by the client. `0` is reserved for "not yet assigned" and, in the
/// `parent` position on the wire, for "no parent".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(i64);

impl PostId {
    /// Placeholder id carried by posts that have not been inserted.
    pub const UNASSIGNED: PostId = PostId(0);

    /// Create a PostId from its raw value.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Whether the store has assigned this id.
    pub fn is_assigned(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PostId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A single message within a thread.
///
/// `forum`, `thread` and `created` are stamped by the bulk writer from the
/// owning thread; `id` is generated by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Store-assigned identifier.
    #[serde(default = "unassigned")]
    pub id: PostId,
    /// Parent post within the same thread, `None` for a root post.
    #[serde(
        default,
        serialize_with = "serialize_parent",
        deserialize_with = "deserialize_parent"
    )]
    pub parent: Option<PostId>,
    /// Author nickname.
    pub author: String,
    /// Message body.
    pub message: String,
    /// Set by the edit collaborator, never by this crate.
    #[serde(default)]
    pub is_edited: bool,
    /// Slug of the forum owning the thread (denormalized).
    #[serde(default)]
    pub forum: String,
    /// Owning thread (denormalized).
    #[serde(default = "unassigned_thread")]
    pub thread: ThreadId,
    /// Creation time, shared by every post of one bulk insert.
    #[serde(with = "rfc3339", default = "epoch")]
    pub created: DateTime<Utc>,
}

impl Post {
    /// Build an unsaved post as received from a caller.
    pub fn new(author: impl Into<String>, message: impl Into<String>, parent: Option<PostId>) -> Self {
        Self {
            id: PostId::UNASSIGNED,
            parent: parent.filter(|p| p.is_assigned()),
            author: author.into(),
            message: message.into(),
            is_edited: false,
            forum: String::new(),
            thread: ThreadId::UNASSIGNED,
            created: epoch(),
        }
    }

    /// Whether this post starts a new reply tree.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

fn unassigned() -> PostId {
    PostId::UNASSIGNED
}

fn unassigned_thread() -> ThreadId {
    ThreadId::UNASSIGNED
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

fn serialize_parent<S: Serializer>(parent: &Option<PostId>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_i64(parent.map(|p| p.as_i64()).unwrap_or(0))
}

fn deserialize_parent<'de, D: Deserializer<'de>>(d: D) -> Result<Option<PostId>, D::Error> {
    let raw = Option::<i64>::deserialize(d)?;
    Ok(raw.filter(|&id| id != 0).map(PostId::new))
}

/// Current time at the precision the database keeps.
///
/// Postgres `timestamptz` stores microseconds, so truncating here makes the
/// value returned by a bulk insert identical to the value read back later.
pub fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Wire format for timestamps: RFC 3339 with an explicit numeric offset.
pub mod rfc3339 {
    use super::*;

    /// Format a timestamp for the wire.
    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Millis, false)
    }

    /// Serialize a timestamp.
    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format(ts))
    }

    /// Deserialize any RFC 3339 timestamp, normalizing to UTC.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_post_is_unsaved_root() {
        let post = Post::new("alice", "hello", None);
        assert!(!post.id.is_assigned());
        assert!(post.is_root());
        assert!(!post.is_edited);
    }

    #[test]
    fn test_zero_parent_means_root() {
        let post = Post::new("alice", "hello", Some(PostId::UNASSIGNED));
        assert!(post.is_root());
    }

    #[test]
    fn test_parent_wire_format() {
        let mut post = Post::new("alice", "hello", None);
        post.created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let json = serde_json::to_value(&post).unwrap();
        assert_eq!(json["parent"], 0);
        assert_eq!(json["isEdited"], false);
        assert_eq!(json["created"], "2024-03-01T12:30:00.000+00:00");

        let reply: Post = serde_json::from_str(
            r#"{"parent": 7, "author": "bob", "message": "re"}"#,
        )
        .unwrap();
        assert_eq!(reply.parent, Some(PostId::new(7)));
        assert_eq!(reply.id, PostId::UNASSIGNED);

        let root: Post = serde_json::from_str(r#"{"parent": 0, "author": "bob", "message": "op"}"#).unwrap();
        assert!(root.is_root());
    }

    #[test]
    fn test_created_accepts_other_offsets() {
        let post: Post = serde_json::from_str(
            r#"{"author": "a", "message": "m", "created": "2024-03-01T15:30:00.000+03:00"}"#,
        )
        .unwrap();
        assert_eq!(post.created, Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap());
    }

    #[test]
    fn test_now_micros_has_no_nanos() {
        let ts = now_micros();
        assert_eq!(ts.timestamp_subsec_nanos() % 1_000, 0);
    }
}
