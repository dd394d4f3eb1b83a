//! PostgreSQL forum store for production use.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)
//! - `DB_MAX_LIFETIME_SECS`: Max connection lifetime (default: 1800)
//!
//! ## Listing queries
//!
//! All three listings share one projection and differ only in their
//! filter and order clauses, see [`listing_sql`]. Every ordering ends in a
//! unique key (`id`, or `path`, which ends in `id`), so pages are totally
//! ordered and resume exactly.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Executor, Postgres, QueryBuilder, Row};

use crate::types::{NewThread, PageRequest, Post, PostId, PostPath, SortMode, Thread, ThreadId};
use super::schema::full_schema;
use super::{InsertedPost, PendingPost, PostStore, Result, StoreError, ThreadStore};

/// SQLSTATE for foreign_key_violation (also raised by the path trigger).
const FOREIGN_KEY_VIOLATION: &str = "23503";
/// SQLSTATE for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

const POST_PROJECTION: &str =
    "SELECT id, parent, author, message, is_edited, forum, thread, created FROM posts";
const THREAD_PROJECTION: &str =
    "SELECT id, title, author, forum, message, votes, slug, created FROM threads";

/// Configuration for PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 10).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 2).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800 = 30 min).
    pub max_lifetime_secs: u64,
}

impl PostgresConfig {
    /// Load configuration from environment variables with production defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/forum".to_string()),
            max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            min_connections: env_or("DB_MIN_CONNECTIONS", 2),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", 10),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: env_or("DB_MAX_LIFETIME_SECS", 1800),
        }
    }

    /// Same defaults, explicit URL.
    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Self::from_env()
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    /// Current pool size.
    pub size: u32,
    /// Number of idle connections.
    pub idle: usize,
    /// Maximum pool size.
    pub max: u32,
}

/// PostgreSQL forum store.
pub struct PostgresForumStore {
    pool: PgPool,
}

impl PostgresForumStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> std::result::Result<Self, sqlx::Error> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            max_lifetime_secs = config.max_lifetime_secs,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a store from environment variables.
    pub async fn from_env() -> std::result::Result<Self, sqlx::Error> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool for health checks.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check if the database is reachable.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }

    /// Get pool statistics for monitoring.
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max: self.pool.options().get_max_connections(),
        }
    }

    /// Create tables, the path trigger and indexes if they are missing.
    pub async fn apply_schema(&self) -> Result<()> {
        let schema = full_schema();
        // No bind parameters: runs over the simple protocol, multi-statement
        self.pool.execute(schema.as_str()).await?;
        tracing::info!("Forum schema applied");
        Ok(())
    }

    fn parse_post_row(row: &PgRow) -> std::result::Result<Post, sqlx::Error> {
        let parent: Option<i64> = row.try_get("parent")?;
        Ok(Post {
            id: PostId::new(row.try_get("id")?),
            parent: parent.map(PostId::new),
            author: row.try_get("author")?,
            message: row.try_get("message")?,
            is_edited: row.try_get("is_edited")?,
            forum: row.try_get("forum")?,
            thread: ThreadId::new(row.try_get("thread")?),
            created: row.try_get("created")?,
        })
    }

    fn parse_thread_row(row: &PgRow) -> std::result::Result<Thread, sqlx::Error> {
        Ok(Thread {
            id: ThreadId::new(row.try_get("id")?),
            title: row.try_get("title")?,
            author: row.try_get("author")?,
            forum: row.try_get("forum")?,
            message: row.try_get("message")?,
            slug: row.try_get("slug")?,
            votes: row.try_get("votes")?,
            created: row.try_get("created")?,
        })
    }

    /// Reserve `count` ids from the post sequence.
    ///
    /// Knowing the ids before the insert makes the id-to-row correlation
    /// explicit instead of relying on `RETURNING` order.
    async fn reserve_post_ids(&self, count: usize) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT nextval(pg_get_serial_sequence('posts', 'id')) FROM generate_series(1, $1)",
        )
        .bind(count as i64)
        .fetch_all(&self.pool)
        .await?;

        if ids.len() != count {
            return Err(StoreError::Storage(format!(
                "reserved {} post ids, expected {}",
                ids.len(),
                count
            )));
        }
        Ok(ids)
    }
}

/// Build the listing statement for a mode, cursor presence and direction.
///
/// Parameters: `$1` thread id, then `$2` cursor post id when `has_cursor`,
/// then the limit.
pub fn listing_sql(mode: SortMode, has_cursor: bool, desc: bool) -> String {
    let (dir, cmp) = if desc { ("DESC", "<") } else { ("ASC", ">") };
    let limit = if has_cursor { "$3" } else { "$2" };

    match mode {
        SortMode::Flat => {
            let cursor = if has_cursor {
                format!(" AND id {} $2", cmp)
            } else {
                String::new()
            };
            format!(
                "{} WHERE thread = $1{} ORDER BY id {} LIMIT {}",
                POST_PROJECTION, cursor, dir, limit
            )
        }
        SortMode::Tree => {
            let cursor = if has_cursor {
                format!(" AND path {} (SELECT path FROM posts WHERE id = $2 AND thread = $1)", cmp)
            } else {
                String::new()
            };
            format!(
                "{} WHERE thread = $1{} ORDER BY path {dir}, id {dir} LIMIT {}",
                POST_PROJECTION,
                cursor,
                limit,
                dir = dir
            )
        }
        SortMode::ParentTree => {
            let cursor = if has_cursor {
                format!(" AND id {} (SELECT path[1] FROM posts WHERE id = $2 AND thread = $1)", cmp)
            } else {
                String::new()
            };
            format!(
                "{} WHERE path[1] IN (SELECT id FROM posts WHERE thread = $1 AND parent IS NULL{} \
                 ORDER BY id {dir} LIMIT {}) ORDER BY path[1] {dir}, path {dir}, id {dir}",
                POST_PROJECTION,
                cursor,
                limit,
                dir = dir
            )
        }
    }
}

/// Map a chunk insert failure onto the store's error kinds.
///
/// Only foreign-key-class failures become `ParentPostNotExist`; a missing
/// thread is `NotFound`; everything else stays a database error.
fn map_insert_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db) = err {
        if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) {
            if db.constraint() == Some("posts_thread_fkey") {
                return StoreError::NotFound(db.message().to_string());
            }
            return StoreError::ParentPostNotExist(db.message().to_string());
        }
    }
    StoreError::Database(err)
}

fn map_unique_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db) = err {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return StoreError::Conflict(db.message().to_string());
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl ThreadStore for PostgresForumStore {
    async fn get_by_slug(&self, slug: &str) -> Result<Thread> {
        let row = sqlx::query(&format!("{} WHERE lower(slug) = lower($1)", THREAD_PROJECTION))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Self::parse_thread_row(r)?),
            None => Err(StoreError::NotFound(format!("thread slug {}", slug))),
        }
    }

    async fn get_by_id(&self, id: ThreadId) -> Result<Thread> {
        let row = sqlx::query(&format!("{} WHERE id = $1", THREAD_PROJECTION))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Self::parse_thread_row(r)?),
            None => Err(StoreError::NotFound(format!("thread id {}", id))),
        }
    }

    async fn create(&self, thread: NewThread) -> Result<Thread> {
        let slug = thread.slug.filter(|s| !s.is_empty());
        let row = sqlx::query(
            r#"
            INSERT INTO threads (title, author, forum, message, slug)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, title, author, forum, message, votes, slug, created
            "#,
        )
        .bind(&thread.title)
        .bind(&thread.author)
        .bind(&thread.forum)
        .bind(&thread.message)
        .bind(&slug)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_error)?;

        let created = Self::parse_thread_row(&row)?;
        tracing::debug!(thread_id = %created.id, forum = %created.forum, "Thread created");
        Ok(created)
    }

    async fn update(&self, thread: &Thread) -> Result<()> {
        let result = sqlx::query("UPDATE threads SET title = $1, message = $2 WHERE id = $3")
            .bind(&thread.title)
            .bind(&thread.message)
            .bind(thread.id.as_i64())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("thread id {}", thread.id)));
        }
        Ok(())
    }

    async fn get_votes(&self, id: ThreadId) -> Result<i32> {
        let votes: i32 =
            sqlx::query_scalar("SELECT COALESCE(SUM(voice), 0)::INT4 FROM votes WHERE thread = $1")
                .bind(id.as_i64())
                .fetch_one(&self.pool)
                .await?;
        Ok(votes)
    }
}

#[async_trait]
impl PostStore for PostgresForumStore {
    async fn get_post(&self, id: PostId) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("{} WHERE id = $1", POST_PROJECTION))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(Self::parse_post_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_path(&self, id: PostId) -> Result<Option<PostPath>> {
        let path: Option<Vec<i64>> = sqlx::query_scalar("SELECT path FROM posts WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        Ok(path.and_then(|ids| PostPath::from_ids(ids.into_iter().map(PostId::new).collect())))
    }

    async fn get_descendants(&self, id: PostId) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            "{} WHERE path @> ARRAY[$1::BIGINT] AND id <> $1 ORDER BY path",
            POST_PROJECTION
        ))
        .bind(id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(Self::parse_post_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    async fn list_posts(&self, thread: ThreadId, mode: SortMode, page: &PageRequest) -> Result<Vec<Post>> {
        if page.is_empty() {
            return Ok(Vec::new());
        }

        let sql = listing_sql(mode, page.since.is_some(), page.desc);
        let mut query = sqlx::query(&sql).bind(thread.as_i64());
        if let Some(since) = page.since {
            query = query.bind(since.as_i64());
        }
        let rows = query.bind(i64::from(page.limit)).fetch_all(&self.pool).await?;

        tracing::debug!(
            thread_id = %thread,
            mode = %mode,
            since = ?page.since,
            desc = page.desc,
            rows = rows.len(),
            "Listed posts"
        );

        rows.iter()
            .map(Self::parse_post_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    async fn insert_chunk(&self, rows: &[PendingPost]) -> Result<Vec<InsertedPost>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let reserved = self.reserve_post_ids(rows.len()).await?;
        let slots: HashMap<i64, usize> = reserved
            .iter()
            .zip(rows)
            .map(|(id, row)| (*id, row.slot))
            .collect();

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO posts (id, parent, author, message, forum, thread, created) ");
        builder.push_values(rows.iter().zip(&reserved), |mut b, (row, id)| {
            b.push_bind(*id)
                .push_bind(row.parent.map(|p| p.as_i64()))
                .push_bind(row.author.clone())
                .push_bind(row.message.clone())
                .push_bind(row.forum.clone())
                .push_bind(row.thread.as_i64())
                .push_bind(row.created);
        });
        builder.push(" RETURNING id");

        let returned: Vec<i64> = builder
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await
            .map_err(map_insert_error)?;

        returned
            .into_iter()
            .map(|id| {
                slots
                    .get(&id)
                    .map(|&slot| InsertedPost { slot, id: PostId::new(id) })
                    .ok_or_else(|| StoreError::Storage(format!("insert returned unreserved post id {}", id)))
            })
            .collect()
    }
}
