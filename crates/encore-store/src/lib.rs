//! Durable checkpoint storage for the reconciliation features.
//!
//! One SQLite database holds every feature's last-acted-upon state: the
//! generic `(scope, key, value)` checkpoint rows, the per-channel sticky
//! message table, and the autorole milestone counter. Scopes partition the
//! keyspace so features cannot corrupt each other's state. The connection
//! is mutex-serialized; that same serialization is what makes the milestone
//! slot claim a single atomic step relative to concurrent joins.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use encore_core::current_unix_timestamp_ms;

/// Scope for the last-announced Instagram post, keyed by username.
pub const SCOPE_INSTAGRAM_LAST: &str = "instagram_last";
/// Scope for synchronized show identities, keyed by the identity itself.
pub const SCOPE_SHOWS_SEEN: &str = "shows_seen";

#[derive(Debug, Error)]
#[error("checkpoint store failure: {detail}")]
/// Checkpoint read/write failure. Always retryable on the next tick; never
/// silently ignorable.
pub struct StorageError {
    detail: String,
}

impl StorageError {
    fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(error: rusqlite::Error) -> Self {
        Self::new(error.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Persistence row for one channel's sticky message.
pub struct StickyRecord {
    pub channel_id: u64,
    pub message_id: u64,
    pub content: String,
    pub format: String,
    pub color: Option<u32>,
}

/// Handle to the embedded checkpoint database.
pub struct CheckpointStore {
    conn: Mutex<Connection>,
}

impl CheckpointStore {
    /// Opens (creating if needed) the database at `path` and ensures the
    /// schema exists.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|error| {
                    StorageError::new(format!(
                        "failed to create {}: {error}",
                        parent.display()
                    ))
                })?;
            }
        }
        let conn = Connection::open(path).map_err(|error| {
            StorageError::new(format!("failed to open {}: {error}", path.display()))
        })?;
        Self::initialize(conn)
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|error| StorageError::new(format!("failed to open memory store: {error}")))?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self, StorageError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            CREATE TABLE IF NOT EXISTS checkpoints (
                scope TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_unix_ms INTEGER NOT NULL,
                PRIMARY KEY (scope, key)
            );
            CREATE TABLE IF NOT EXISTS sticky_messages (
                channel_id INTEGER PRIMARY KEY,
                message_id INTEGER NOT NULL,
                content TEXT NOT NULL,
                format TEXT NOT NULL,
                color INTEGER NULL
            );
            CREATE TABLE IF NOT EXISTS autorole_counter (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                count INTEGER NOT NULL
            );
            INSERT OR IGNORE INTO autorole_counter (id, count) VALUES (1, 0);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::new("checkpoint connection mutex poisoned"))
    }

    pub fn get(&self, scope: &str, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM checkpoints WHERE scope = ?1 AND key = ?2",
                params![scope, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Atomic replace: at most one row exists per `(scope, key)`.
    pub fn set(&self, scope: &str, key: &str, value: &str) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO checkpoints (scope, key, value, updated_unix_ms)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![scope, key, value, current_unix_timestamp_ms()],
        )?;
        Ok(())
    }

    pub fn delete(&self, scope: &str, key: &str) -> Result<bool, StorageError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM checkpoints WHERE scope = ?1 AND key = ?2",
            params![scope, key],
        )?;
        Ok(changed > 0)
    }

    /// All `(key, value)` pairs in a scope, key-ordered.
    pub fn list(&self, scope: &str) -> Result<Vec<(String, String)>, StorageError> {
        let conn = self.lock()?;
        let mut statement = conn.prepare(
            "SELECT key, value FROM checkpoints WHERE scope = ?1 ORDER BY key ASC",
        )?;
        let mut rows = statement.query(params![scope])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push((row.get::<_, String>(0)?, row.get::<_, String>(1)?));
        }
        Ok(entries)
    }

    pub fn load_stickies(&self) -> Result<Vec<StickyRecord>, StorageError> {
        let conn = self.lock()?;
        let mut statement = conn.prepare(
            r#"
            SELECT channel_id, message_id, content, format, color
            FROM sticky_messages
            ORDER BY channel_id ASC
            "#,
        )?;
        let mut rows = statement.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(StickyRecord {
                channel_id: row.get(0)?,
                message_id: row.get(1)?,
                content: row.get(2)?,
                format: row.get(3)?,
                color: row.get(4)?,
            });
        }
        Ok(records)
    }

    pub fn upsert_sticky(&self, record: &StickyRecord) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO sticky_messages (channel_id, message_id, content, format, color)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                record.channel_id,
                record.message_id,
                record.content,
                record.format,
                record.color
            ],
        )?;
        Ok(())
    }

    pub fn delete_sticky(&self, channel_id: u64) -> Result<bool, StorageError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM sticky_messages WHERE channel_id = ?1",
            params![channel_id],
        )?;
        Ok(changed > 0)
    }

    pub fn milestone_count(&self) -> Result<u64, StorageError> {
        let conn = self.lock()?;
        let count = conn.query_row(
            "SELECT count FROM autorole_counter WHERE id = 1",
            [],
            |row| row.get::<_, u64>(0),
        )?;
        Ok(count)
    }

    /// Claims one milestone slot: increments the counter only while it is
    /// below `threshold`, returning the claimed position (1-based). The
    /// increment and the bound check are one transaction on the serialized
    /// connection, so concurrent joins can never claim past the threshold.
    pub fn claim_milestone_slot(&self, threshold: u64) -> Result<Option<u64>, StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE autorole_counter SET count = count + 1 WHERE id = 1 AND count < ?1",
            params![threshold],
        )?;
        let claimed = if changed == 1 {
            let count: u64 = tx.query_row(
                "SELECT count FROM autorole_counter WHERE id = 1",
                [],
                |row| row.get(0),
            )?;
            Some(count)
        } else {
            None
        };
        tx.commit()?;
        Ok(claimed)
    }
}
