//! Durable storage for normalized records: a SQLite key/record table.

use crate::types::{CacheError, Record};
use chrono::Utc;
use eyre::Result;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;

/// Controls whether and when records are purged without explicit deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Records live until explicit invalidation or store deletion.
    #[default]
    NoEviction,

    /// Keep at most this many records; the least recently written go first.
    /// The denormalizer sees an evicted record as a plain cache miss.
    MaxRecords(usize),
}

/// Storage handle for normalized records.
///
/// All operations are synchronous from the caller's perspective and safe
/// under concurrent access from multiple in-flight operations: the connection
/// is guarded by a mutex, and each response's records are committed in a
/// single transaction so a reader never observes a partially merged entity.
pub struct RecordStore {
    conn: Mutex<Connection>,
    policy: EvictionPolicy,
}

impl RecordStore {
    /// Open (or create) a store backed by the given database file.
    pub fn open(path: &Path, policy: EvictionPolicy) -> Result<Self> {
        let conn = Connection::open(path).map_err(unavailable)?;
        let store = Self {
            conn: Mutex::new(conn),
            policy,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open an in-memory store. State does not survive the process.
    pub fn in_memory(policy: EvictionPolicy) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(unavailable)?;
        let store = Self {
            conn: Mutex::new(conn),
            policy,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize the records table.
    fn init_schema(&self) -> Result<()> {
        self.lock()?
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS records (
                    key TEXT PRIMARY KEY,
                    record TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_records_updated ON records(updated_at);
            "#,
            )
            .map_err(unavailable)?;
        Ok(())
    }

    /// Get a record by key.
    pub fn get(&self, key: &str) -> Result<Option<Record>> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row("SELECT record FROM records WHERE key = ?", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(unavailable)?;

        match raw {
            Some(json) => match serde_json::from_str::<Record>(&json) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    log::warn!("discarding unreadable record '{}': {}", key, e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Write a record, merging field-by-field with any existing one.
    pub fn put(&self, key: &str, record: &Record) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(unavailable)?;
        let now = Utc::now().to_rfc3339();
        merge_into(&tx, key, record, &now)?;
        enforce_policy(&tx, self.policy)?;
        tx.commit().map_err(unavailable)?;
        Ok(())
    }

    /// Commit one response's records in a single transaction.
    ///
    /// Either every record becomes visible or none does; a reader never sees
    /// half of a response merged in.
    pub fn apply_batch(&self, records: &[(String, Record)]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(unavailable)?;
        let now = Utc::now().to_rfc3339();
        for (key, record) in records {
            merge_into(&tx, key, record, &now)?;
        }
        enforce_policy(&tx, self.policy)?;
        tx.commit().map_err(unavailable)?;
        Ok(())
    }

    /// Remove a single record.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.lock()?
            .execute("DELETE FROM records WHERE key = ?", params![key])
            .map_err(unavailable)?;
        Ok(())
    }

    /// Remove every record.
    pub fn clear(&self) -> Result<()> {
        self.lock()?
            .execute("DELETE FROM records", [])
            .map_err(unavailable)?;
        Ok(())
    }

    /// Number of stored records.
    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
            .map_err(unavailable)?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Close the store, releasing the database handle.
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| eyre::eyre!(CacheError::CacheUnavailable("store mutex poisoned".into())))?;
        conn.close()
            .map_err(|(_, e)| eyre::eyre!(CacheError::CacheUnavailable(e.to_string())))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| eyre::eyre!(CacheError::CacheUnavailable("store mutex poisoned".into())))
    }
}

/// Merge a record into the table under the given key.
fn merge_into(conn: &Connection, key: &str, record: &Record, now: &str) -> Result<()> {
    let existing: Option<String> = conn
        .query_row("SELECT record FROM records WHERE key = ?", params![key], |row| {
            row.get(0)
        })
        .optional()
        .map_err(unavailable)?;

    let merged = match existing {
        Some(raw) => match serde_json::from_str::<Record>(&raw) {
            Ok(mut current) => {
                current.merge(record.clone());
                current
            }
            Err(e) => {
                log::warn!("overwriting unreadable record '{}': {}", key, e);
                record.clone()
            }
        },
        None => record.clone(),
    };

    let json = serde_json::to_string(&merged)
        .map_err(|e| eyre::eyre!(CacheError::CacheUnavailable(e.to_string())))?;
    conn.execute(
        "INSERT OR REPLACE INTO records (key, record, updated_at) VALUES (?, ?, ?)",
        params![key, json, now],
    )
    .map_err(unavailable)?;

    Ok(())
}

/// Drop the least recently written records beyond a `MaxRecords` cap.
fn enforce_policy(conn: &Connection, policy: EvictionPolicy) -> Result<()> {
    let EvictionPolicy::MaxRecords(cap) = policy else {
        return Ok(());
    };

    let removed = conn
        .execute(
            r#"
            DELETE FROM records WHERE key IN (
                SELECT key FROM records
                ORDER BY updated_at DESC, key
                LIMIT -1 OFFSET ?
            )
            "#,
            params![cap as i64],
        )
        .map_err(unavailable)?;

    if removed > 0 {
        log::debug!("evicted {} record(s) beyond cap of {}", removed, cap);
    }
    Ok(())
}

fn unavailable(e: rusqlite::Error) -> eyre::Report {
    eyre::eyre!(CacheError::CacheUnavailable(e.to_string()))
}
