//! Relational schema for the Postgres backend.
//!
//! The `path` column is filled by a `BEFORE INSERT` trigger in the same
//! statement that assigns `id`, so a post is never visible without its
//! path. Missing or cross-thread parents raise SQLSTATE `23503`
//! (foreign_key_violation), the code the store maps to
//! `ParentPostNotExist`.
//!
//! Every statement is idempotent; applying the schema twice is a no-op.

/// Threads table.
pub const THREADS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS threads (
    id       BIGSERIAL PRIMARY KEY,
    title    TEXT NOT NULL,
    author   TEXT NOT NULL,
    forum    TEXT NOT NULL,
    message  TEXT NOT NULL,
    slug     TEXT,
    votes    INTEGER NOT NULL DEFAULT 0,
    created  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE UNIQUE INDEX IF NOT EXISTS threads_slug_key ON threads (lower(slug)) WHERE slug IS NOT NULL;
CREATE INDEX IF NOT EXISTS threads_forum_created_idx ON threads (forum, created);
"#;

/// Posts table, path trigger and listing indexes.
pub const POSTS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    id         BIGSERIAL PRIMARY KEY,
    parent     BIGINT REFERENCES posts (id),
    author     TEXT NOT NULL,
    message    TEXT NOT NULL,
    is_edited  BOOLEAN NOT NULL DEFAULT FALSE,
    forum      TEXT NOT NULL,
    thread     BIGINT NOT NULL CONSTRAINT posts_thread_fkey REFERENCES threads (id),
    created    TIMESTAMPTZ NOT NULL,
    path       BIGINT[] NOT NULL DEFAULT '{}'
);

CREATE OR REPLACE FUNCTION posts_assign_path() RETURNS TRIGGER AS $$
DECLARE
    parent_path BIGINT[];
BEGIN
    IF NEW.parent IS NULL THEN
        NEW.path := ARRAY[NEW.id];
    ELSE
        SELECT path INTO parent_path FROM posts WHERE id = NEW.parent AND thread = NEW.thread;
        IF parent_path IS NULL THEN
            RAISE EXCEPTION 'parent post % does not exist in thread %', NEW.parent, NEW.thread
                USING ERRCODE = '23503';
        END IF;
        NEW.path := parent_path || NEW.id;
    END IF;
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS posts_assign_path ON posts;
CREATE TRIGGER posts_assign_path BEFORE INSERT ON posts
    FOR EACH ROW EXECUTE FUNCTION posts_assign_path();

CREATE INDEX IF NOT EXISTS posts_thread_id_idx ON posts (thread, id);
CREATE INDEX IF NOT EXISTS posts_thread_path_idx ON posts (thread, path);
CREATE INDEX IF NOT EXISTS posts_root_path_idx ON posts ((path[1]), path);
CREATE INDEX IF NOT EXISTS posts_thread_roots_idx ON posts (thread, id) WHERE parent IS NULL;
CREATE INDEX IF NOT EXISTS posts_path_gin_idx ON posts USING GIN (path);
"#;

/// Votes table; one voice per user per thread.
pub const VOTES_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS votes (
    thread    BIGINT NOT NULL REFERENCES threads (id),
    nickname  TEXT NOT NULL,
    voice     SMALLINT NOT NULL,
    PRIMARY KEY (thread, nickname)
);
"#;

/// All schema statements in dependency order.
pub fn full_schema() -> String {
    [THREADS_TABLE_SCHEMA, POSTS_TABLE_SCHEMA, VOTES_TABLE_SCHEMA].concat()
}
