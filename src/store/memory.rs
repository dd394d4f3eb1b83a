//! In-memory forum store for testing.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::types::{now_micros, NewThread, PageRequest, Post, PostId, PostPath, SortMode, Thread, ThreadId};
use super::{InsertedPost, PendingPost, PostStore, Result, StoreError, ThreadStore};

/// A post together with its materialized path.
#[derive(Debug, Clone)]
struct StoredPost {
    post: Post,
    path: PostPath,
}

#[derive(Debug, Default)]
struct MemoryState {
    threads: BTreeMap<ThreadId, Thread>,
    posts: BTreeMap<PostId, StoredPost>,
    /// (thread, nickname) -> voice
    votes: BTreeMap<(ThreadId, String), i32>,
    last_thread_id: i64,
    last_post_id: i64,
    insert_statements: usize,
}

/// In-memory forum store for testing.
///
/// Uses BTreeMaps for deterministic iteration order and mirrors the
/// Postgres backend's ordering and cursor rules exactly. Each
/// `insert_chunk` call is all-or-nothing, like a single SQL statement.
#[derive(Debug, Default)]
pub struct InMemoryForumStore {
    state: RwLock<MemoryState>,
}

impl InMemoryForumStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) a user's vote on a thread.
    ///
    /// Keeps the thread's denormalized `votes` in step with the vote rows.
    pub fn add_vote(&self, thread: ThreadId, nickname: &str, voice: i32) -> Result<()> {
        let mut state = self.state.write();
        if !state.threads.contains_key(&thread) {
            return Err(StoreError::NotFound(format!("thread id {}", thread)));
        }
        state.votes.insert((thread, nickname.to_string()), voice);
        let total = Self::vote_total(&state, thread);
        if let Some(t) = state.threads.get_mut(&thread) {
            t.votes = total;
        }
        Ok(())
    }

    /// Get number of posts.
    pub fn num_posts(&self) -> usize {
        self.state.read().posts.len()
    }

    /// Get number of threads.
    pub fn num_threads(&self) -> usize {
        self.state.read().threads.len()
    }

    /// Number of chunk insert statements executed so far.
    pub fn insert_statements(&self) -> usize {
        self.state.read().insert_statements
    }

    fn vote_total(state: &MemoryState, thread: ThreadId) -> i32 {
        state
            .votes
            .range((thread, String::new())..)
            .take_while(|((t, _), _)| *t == thread)
            .map(|(_, voice)| *voice)
            .sum()
    }

    /// Path of the cursor post, only if it belongs to `thread`.
    fn cursor_path(state: &MemoryState, thread: ThreadId, since: PostId) -> Option<PostPath> {
        state
            .posts
            .get(&since)
            .filter(|p| p.post.thread == thread)
            .map(|p| p.path.clone())
    }

    fn flat(state: &MemoryState, thread: ThreadId, page: &PageRequest) -> Vec<Post> {
        let mut rows: Vec<&StoredPost> = state
            .posts
            .values()
            .filter(|p| p.post.thread == thread)
            .filter(|p| match page.since {
                None => true,
                Some(since) if page.desc => p.post.id < since,
                Some(since) => p.post.id > since,
            })
            .collect();

        rows.sort_by_key(|p| p.post.id);
        if page.desc {
            rows.reverse();
        }
        rows.into_iter()
            .take(page.limit as usize)
            .map(|p| p.post.clone())
            .collect()
    }

    fn tree(state: &MemoryState, thread: ThreadId, page: &PageRequest) -> Vec<Post> {
        let cursor = match page.since {
            None => None,
            Some(since) => match Self::cursor_path(state, thread, since) {
                Some(path) => Some(path),
                // Unknown cursor: the SQL subquery yields NULL and nothing matches
                None => return Vec::new(),
            },
        };

        let mut rows: Vec<&StoredPost> = state
            .posts
            .values()
            .filter(|p| p.post.thread == thread)
            .filter(|p| match &cursor {
                None => true,
                Some(c) if page.desc => &p.path < c,
                Some(c) => &p.path > c,
            })
            .collect();

        rows.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.post.id.cmp(&b.post.id)));
        if page.desc {
            rows.reverse();
        }
        rows.into_iter()
            .take(page.limit as usize)
            .map(|p| p.post.clone())
            .collect()
    }

    fn parent_tree(state: &MemoryState, thread: ThreadId, page: &PageRequest) -> Vec<Post> {
        let cursor_root = match page.since {
            None => None,
            Some(since) => match Self::cursor_path(state, thread, since) {
                Some(path) => Some(path.root_id()),
                None => return Vec::new(),
            },
        };

        let mut roots: Vec<PostId> = state
            .posts
            .values()
            .filter(|p| p.post.thread == thread && p.post.is_root())
            .map(|p| p.post.id)
            .filter(|id| match cursor_root {
                None => true,
                Some(c) if page.desc => *id < c,
                Some(c) => *id > c,
            })
            .collect();

        roots.sort();
        if page.desc {
            roots.reverse();
        }
        let roots: BTreeSet<PostId> = roots.into_iter().take(page.limit as usize).collect();

        let mut rows: Vec<&StoredPost> = state
            .posts
            .values()
            .filter(|p| roots.contains(&p.path.root_id()))
            .collect();

        rows.sort_by(|a, b| {
            a.path
                .root_id()
                .cmp(&b.path.root_id())
                .then_with(|| a.path.cmp(&b.path))
                .then_with(|| a.post.id.cmp(&b.post.id))
        });
        if page.desc {
            rows.reverse();
        }
        rows.into_iter().map(|p| p.post.clone()).collect()
    }
}

#[async_trait]
impl ThreadStore for InMemoryForumStore {
    async fn get_by_slug(&self, slug: &str) -> Result<Thread> {
        self.state
            .read()
            .threads
            .values()
            .find(|t| t.slug.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(slug)))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("thread slug {}", slug)))
    }

    async fn get_by_id(&self, id: ThreadId) -> Result<Thread> {
        self.state
            .read()
            .threads
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("thread id {}", id)))
    }

    async fn create(&self, thread: NewThread) -> Result<Thread> {
        let mut state = self.state.write();

        let slug = thread.slug.filter(|s| !s.is_empty());
        if let Some(ref slug) = slug {
            let taken = state
                .threads
                .values()
                .any(|t| t.slug.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(slug)));
            if taken {
                return Err(StoreError::Conflict(format!("thread slug {} already exists", slug)));
            }
        }

        state.last_thread_id += 1;
        let created = Thread {
            id: ThreadId::new(state.last_thread_id),
            title: thread.title,
            author: thread.author,
            forum: thread.forum,
            message: thread.message,
            slug,
            votes: 0,
            created: now_micros(),
        };
        state.threads.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, thread: &Thread) -> Result<()> {
        let mut state = self.state.write();
        let stored = state
            .threads
            .get_mut(&thread.id)
            .ok_or_else(|| StoreError::NotFound(format!("thread id {}", thread.id)))?;
        stored.title = thread.title.clone();
        stored.message = thread.message.clone();
        Ok(())
    }

    async fn get_votes(&self, id: ThreadId) -> Result<i32> {
        Ok(Self::vote_total(&self.state.read(), id))
    }
}

#[async_trait]
impl PostStore for InMemoryForumStore {
    async fn get_post(&self, id: PostId) -> Result<Option<Post>> {
        Ok(self.state.read().posts.get(&id).map(|p| p.post.clone()))
    }

    async fn get_path(&self, id: PostId) -> Result<Option<PostPath>> {
        Ok(self.state.read().posts.get(&id).map(|p| p.path.clone()))
    }

    async fn get_descendants(&self, id: PostId) -> Result<Vec<Post>> {
        let state = self.state.read();
        let Some(anchor) = state.posts.get(&id) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<&StoredPost> = state
            .posts
            .values()
            .filter(|p| anchor.path.is_ancestor_of(&p.path))
            .collect();
        rows.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(rows.into_iter().map(|p| p.post.clone()).collect())
    }

    async fn list_posts(&self, thread: ThreadId, mode: SortMode, page: &PageRequest) -> Result<Vec<Post>> {
        if page.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.state.read();
        Ok(match mode {
            SortMode::Flat => Self::flat(&state, thread, page),
            SortMode::Tree => Self::tree(&state, thread, page),
            SortMode::ParentTree => Self::parent_tree(&state, thread, page),
        })
    }

    async fn insert_chunk(&self, rows: &[PendingPost]) -> Result<Vec<InsertedPost>> {
        let mut state = self.state.write();
        state.insert_statements += 1;

        // Validate the whole statement before writing any row
        for row in rows {
            if !state.threads.contains_key(&row.thread) {
                return Err(StoreError::NotFound(format!("thread id {}", row.thread)));
            }
            if let Some(parent) = row.parent {
                match state.posts.get(&parent) {
                    Some(p) if p.post.thread == row.thread => {}
                    _ => {
                        return Err(StoreError::ParentPostNotExist(format!(
                            "post {} in thread {}",
                            parent, row.thread
                        )))
                    }
                }
            }
        }

        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            state.last_post_id += 1;
            let id = PostId::new(state.last_post_id);

            let path = match row.parent {
                Some(parent) => {
                    let parent_path = &state.posts[&parent].path;
                    PostPath::child_of(parent_path, id)
                }
                None => PostPath::root(id),
            };

            let post = Post {
                id,
                parent: row.parent,
                author: row.author.clone(),
                message: row.message.clone(),
                is_edited: false,
                forum: row.forum.clone(),
                thread: row.thread,
                created: row.created,
            };
            state.posts.insert(id, StoredPost { post, path });
            inserted.push(InsertedPost { slot: row.slot, id });
        }

        Ok(inserted)
    }
}
