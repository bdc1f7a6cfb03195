//! Local conversation cache
//!
//! Keeps the transcript across restarts so a session can be resumed. The
//! cache is only read at startup; in-memory state is authoritative.

mod writer;

pub use writer::CacheWriter;

use crate::transcript::Message;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Key of the transcript record
pub const TRANSCRIPT_KEY: &str = "triage:transcript_v1";

/// SQL schema for initialization
const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Corrupt cache record: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("Cache lock poisoned")]
    Poisoned,
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Durable storage for the transcript
#[async_trait]
pub trait TranscriptCache: Send + Sync {
    /// Cached transcript, if any
    async fn load(&self) -> CacheResult<Option<Vec<Message>>>;

    /// Overwrite the cached transcript
    async fn store(&self, messages: &[Message]) -> CacheResult<()>;

    /// Remove the cached transcript
    async fn clear(&self) -> CacheResult<()>;
}

#[async_trait]
impl<T: TranscriptCache + ?Sized> TranscriptCache for Arc<T> {
    async fn load(&self) -> CacheResult<Option<Vec<Message>>> {
        (**self).load().await
    }

    async fn store(&self, messages: &[Message]) -> CacheResult<()> {
        (**self).store(messages).await
    }

    async fn clear(&self) -> CacheResult<()> {
        (**self).clear().await
    }
}

/// SQLite-backed key-value cache
#[derive(Clone)]
pub struct SqliteCache {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCache {
    /// Open or create the cache at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> CacheResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory cache (for testing)
    pub fn open_in_memory() -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &str) -> CacheResult<()> {
        let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[async_trait]
impl TranscriptCache for SqliteCache {
    async fn load(&self) -> CacheResult<Option<Vec<Message>>> {
        match self.get(TRANSCRIPT_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn store(&self, messages: &[Message]) -> CacheResult<()> {
        let raw = serde_json::to_string(messages)?;
        self.put(TRANSCRIPT_KEY, &raw)
    }

    async fn clear(&self) -> CacheResult<()> {
        self.remove(TRANSCRIPT_KEY)
    }
}
