//! SQLite storage gateway
//!
//! All four logical relations (conversations + messages, user aggregates,
//! dimension scores, ingestion jobs) live in one SQLite database opened in
//! WAL mode behind a small r2d2 pool. Callers get typed operations, not raw
//! SQL; each operation is atomic per row and no multi-relation transaction
//! is assumed by the pipeline.
//!
//! # Schema versioning
//!
//! The `metadata` table tracks `schema_version`. Migrations are applied on
//! open and must be idempotent: a crash between a DDL statement and the
//! version bump means the next startup retries the migration.

mod conversations;
mod jobs;
mod profiles;

pub use conversations::{ConversationMerge, ConversationRow, SampledMessage};
pub use jobs::{Job, JobStatus};
pub use profiles::{DimensionScoreRow, UserAggregateRow};

use crate::error::{CoreError, CoreResult};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;

/// Pooled handle to the profiling database
pub struct Store {
    pool: Pool<SqliteConnectionManager>,
}

impl Store {
    /// Open (or create) the database at `db_path` and bring the schema up
    /// to date.
    pub fn open(db_path: impl AsRef<Path>) -> CoreResult<Self> {
        let db_path = db_path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::Storage(format!("create {}: {e}", parent.display())))?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                r#"
                PRAGMA journal_mode=WAL;
                PRAGMA synchronous=NORMAL;
                PRAGMA busy_timeout=5000;
                PRAGMA foreign_keys=ON;
                "#,
            )
        });

        let pool = Pool::builder().max_size(4).build(manager)?;

        let conn = pool.get()?;
        init_schema(&conn)?;

        Ok(Self { pool })
    }

    /// Get a connection from the pool
    pub(crate) fn conn(&self) -> CoreResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Row counts per relation, for the health endpoint
    pub fn counts(&self) -> CoreResult<StorageCounts> {
        let conn = self.conn()?;
        let count = |table: &str| -> CoreResult<i64> {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })?)
        };

        Ok(StorageCounts {
            conversations: count("conversations")?,
            messages: count("messages")?,
            users: count("user_aggregates")?,
            jobs: count("ingestion_jobs")?,
        })
    }
}

/// Relation sizes reported by /api/health
#[derive(Debug, Clone, Serialize)]
pub struct StorageCounts {
    pub conversations: i64,
    pub messages: i64,
    pub users: i64,
    pub jobs: i64,
}

/// Current timestamp in the storage format (RFC 3339 text)
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Initialize database schema and run migrations
fn init_schema(conn: &Connection) -> CoreResult<()> {
    // Check current schema version
    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(
                (SELECT CAST(value AS INTEGER) FROM metadata WHERE key = 'schema_version'),
                0
            )",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        apply_schema_v1(conn)?;
    }

    Ok(())
}

/// Initial schema (v1)
fn apply_schema_v1(conn: &Connection) -> CoreResult<()> {
    conn.execute_batch(
        r#"
        -- Metadata table (created first for version tracking)
        CREATE TABLE IF NOT EXISTS metadata (
            key TEXT PRIMARY KEY,
            value TEXT
        );

        -- Conversations, one row per conversation_id
        -- turn_count and message_count only ever grow: chunk merges take
        -- max(turn_count) and sum message_count
        CREATE TABLE IF NOT EXISTS conversations (
            conversation_id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            model TEXT,
            language TEXT,
            turn_count INTEGER NOT NULL DEFAULT 0,
            message_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id);

        -- Messages, append-only; the primary key doubles as the
        -- double-submission guard
        CREATE TABLE IF NOT EXISTS messages (
            conversation_id TEXT NOT NULL,
            message_index INTEGER NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            conversation_turn INTEGER,
            redacted INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            PRIMARY KEY (conversation_id, message_index)
        );

        -- Rolling per-user aggregates; total_turns is the running sum of
        -- current per-conversation turn counts so both averages can be
        -- recomputed from sums after any merge
        CREATE TABLE IF NOT EXISTS user_aggregates (
            user_id TEXT PRIMARY KEY,
            total_conversations INTEGER NOT NULL DEFAULT 0,
            total_messages INTEGER NOT NULL DEFAULT 0,
            total_turns INTEGER NOT NULL DEFAULT 0,
            languages TEXT NOT NULL DEFAULT '[]',
            models_used TEXT NOT NULL DEFAULT '[]',
            avg_turns_per_conversation REAL NOT NULL DEFAULT 0,
            avg_messages_per_conversation REAL NOT NULL DEFAULT 0,
            first_seen TEXT,
            last_seen TEXT,
            profile_generated INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        );

        -- One current score per (user, dimension); regeneration replaces
        -- the row wholesale, no history kept
        CREATE TABLE IF NOT EXISTS dimension_scores (
            user_id TEXT NOT NULL,
            dimension TEXT NOT NULL,
            score REAL NOT NULL,
            confidence REAL NOT NULL,
            evidence_summary TEXT NOT NULL DEFAULT '',
            updated_at TEXT NOT NULL,
            PRIMARY KEY (user_id, dimension)
        );

        -- Ingestion jobs: pending -> processing -> completed | failed
        CREATE TABLE IF NOT EXISTS ingestion_jobs (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            status TEXT NOT NULL,
            total_records INTEGER NOT NULL,
            processed_records INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_jobs_status ON ingestion_jobs(status);

        -- Set initial version
        INSERT INTO metadata (key, value) VALUES ('schema_version', '1');
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Store;
    use tempfile::TempDir;

    /// A store backed by a throwaway on-disk database. The TempDir must be
    /// kept alive for the duration of the test.
    pub fn temp_store() -> (Store, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let store = Store::open(dir.path().join("test.db")).expect("open store");
        (store, dir)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::temp_store;

    #[test]
    fn opens_and_reopens_with_schema() {
        let (store, dir) = temp_store();
        let counts = store.counts().unwrap();
        assert_eq!(counts.conversations, 0);
        assert_eq!(counts.jobs, 0);
        drop(store);

        // Reopening an existing database must not re-run the initial schema
        let store = super::Store::open(dir.path().join("test.db")).unwrap();
        assert_eq!(store.counts().unwrap().messages, 0);
    }
}
