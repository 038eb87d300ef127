//! SQLite-backed key/value backend.
//!
//! Lets several processes on one host share session state through a single
//! database file. CAS versions come from a counter row bumped inside the same
//! immediate transaction as the write, so two writers can never observe or
//! hand out the same version.
//!
//! Statements run on tokio's blocking pool: a writer can wait up to
//! [`BUSY_TIMEOUT`] on another process's lock.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info, trace};

use crate::client::{KvClient, StoreMode, Versioned, validate_key};
use crate::error::{KvError, Result};

/// Current schema version.
const SCHEMA_VERSION: i32 = 1;

/// How long a writer waits on another process's lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// [`KvClient`] stored in a SQLite database.
///
/// Expiry times are wall-clock milliseconds so they stay meaningful across
/// processes. Expired rows are invisible to reads and deleted lazily.
pub struct SqliteKvClient {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteKvClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteKvClient").finish_non_exhaustive()
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn expires_at(ttl: Duration) -> Option<i64> {
    if ttl.is_zero() {
        None
    } else {
        Some(now_millis().saturating_add(ttl.as_millis() as i64))
    }
}

/// Run a write inside an immediate transaction, allocating a CAS version
/// that is committed only if `write` reports success.
fn write_tx<F>(conn: &mut Connection, key: &str, write: F) -> Result<bool>
where
    F: FnOnce(&rusqlite::Transaction<'_>, u64) -> rusqlite::Result<bool>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let now = now_millis();

    // Expired rows must not satisfy a CAS or block an add.
    tx.execute(
        "DELETE FROM kv WHERE key = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2",
        params![key, now],
    )?;

    let cas: i64 = tx.query_row("SELECT next_cas FROM kv_cas WHERE id = 1", [], |row| {
        row.get(0)
    })?;

    let written = write(&tx, cas as u64)?;
    if written {
        tx.execute("UPDATE kv_cas SET next_cas = next_cas + 1 WHERE id = 1", [])?;
    }
    tx.commit()?;

    Ok(written)
}

impl SqliteKvClient {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| KvError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let client = Self::from_connection(conn)?;
        info!("KV store opened at {:?}", path);
        Ok(client)
    }

    /// Create an in-memory store (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::create_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        let current_version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if current_version >= SCHEMA_VERSION {
            debug!("Schema up to date (version {})", current_version);
            return Ok(());
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                cas INTEGER NOT NULL,
                expires_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_kv_expires_at
                ON kv(expires_at);

            -- Single-row CAS counter; versions start at 1.
            CREATE TABLE IF NOT EXISTS kv_cas (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                next_cas INTEGER NOT NULL
            );

            INSERT OR IGNORE INTO kv_cas (id, next_cas) VALUES (1, 1);
            "#,
        )?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(())
    }

    /// Delete every expired row and return how many were dropped.
    ///
    /// Runs on the calling thread; meant for maintenance jobs, not request
    /// paths.
    pub fn purge_expired(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let purged = conn.execute(
            "DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![now_millis()],
        )?;

        if purged > 0 {
            debug!(count = purged, "Purged expired entries");
        }

        Ok(purged)
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&mut conn.lock()))
            .await
            .map_err(|e| KvError::Task(format!("Task join error: {e}")))?
    }
}

#[async_trait]
impl KvClient for SqliteKvClient {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get_with_version(key).await?.map(|v| v.value))
    }

    async fn get_with_version(&self, key: &str) -> Result<Option<Versioned>> {
        validate_key(key)?;
        let key = key.to_string();

        let row: Option<(Vec<u8>, i64)> = self
            .blocking(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT value, cas FROM kv
                         WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                        params![key, now_millis()],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?)
            })
            .await?;

        Ok(row.map(|(value, cas)| Versioned {
            value,
            cas: cas as u64,
        }))
    }

    async fn store(
        &self,
        mode: StoreMode,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool> {
        validate_key(key)?;
        let expires = expires_at(ttl);
        let owned_key = key.to_string();
        let value = value.to_vec();

        let stored = self
            .blocking(move |conn| {
                write_tx(conn, &owned_key, |tx, cas| {
                    let changed = match mode {
                        StoreMode::Set => tx.execute(
                            "INSERT INTO kv (key, value, cas, expires_at) VALUES (?1, ?2, ?3, ?4)
                             ON CONFLICT(key) DO UPDATE SET
                                value = excluded.value,
                                cas = excluded.cas,
                                expires_at = excluded.expires_at",
                            params![owned_key, value, cas as i64, expires],
                        )?,
                        StoreMode::Add => tx.execute(
                            "INSERT OR IGNORE INTO kv (key, value, cas, expires_at) VALUES (?1, ?2, ?3, ?4)",
                            params![owned_key, value, cas as i64, expires],
                        )?,
                    };
                    Ok(changed == 1)
                })
            })
            .await?;

        trace!(key = %key, ?mode, stored = stored, "Store");
        Ok(stored)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
        expected: u64,
    ) -> Result<bool> {
        validate_key(key)?;
        let expires = expires_at(ttl);
        let owned_key = key.to_string();
        let value = value.to_vec();

        let swapped = self
            .blocking(move |conn| {
                write_tx(conn, &owned_key, |tx, cas| {
                    let changed = tx.execute(
                        "UPDATE kv SET value = ?1, cas = ?2, expires_at = ?3
                         WHERE key = ?4 AND cas = ?5",
                        params![value, cas as i64, expires, owned_key, expected as i64],
                    )?;
                    Ok(changed == 1)
                })
            })
            .await?;

        trace!(key = %key, expected = expected, swapped = swapped, "Compare-and-swap");
        Ok(swapped)
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let key = key.to_string();

        self.blocking(move |conn| {
            let removed = conn.execute(
                "DELETE FROM kv WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, now_millis()],
            )?;
            // Drop any expired leftover too.
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            Ok(removed > 0)
        })
        .await
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
