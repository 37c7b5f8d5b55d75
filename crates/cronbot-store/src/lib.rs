//! SQLite-backed persistence for job definitions and scheduled tasks.
//!
//! Every mutating call writes through to the database before returning, so a
//! crash after a successful call never loses the mutation. The database file
//! being absent on first run yields an empty store, not an error.

pub mod jobs;
pub mod schedule;
pub mod tasks;

use std::path::Path;

use rusqlite::Connection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job '{0}' not found")]
    JobNotFound(String),
    #[error("task {0} not found")]
    TaskNotFound(i64),
    #[error("job '{0}' already exists")]
    AlreadyExists(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("schedule '{0}' cannot produce a future fire time")]
    InvalidSchedule(String),
    #[error("unknown timezone '{0}'")]
    InvalidTimezone(String),
    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Durable store for jobs and tasks.
///
/// The store itself does no locking: the scheduler owns it behind a single
/// exclusive lock, which serializes every operation and the entire per-tick
/// scan against each other.
pub struct CronDb {
    conn: Connection,
}

const SCHEMA: &str = "PRAGMA journal_mode = WAL;

     CREATE TABLE IF NOT EXISTS jobs (
         name TEXT PRIMARY KEY,
         command TEXT NOT NULL,
         env TEXT NOT NULL DEFAULT '{}'
     );

     CREATE TABLE IF NOT EXISTS tasks (
         id INTEGER PRIMARY KEY AUTOINCREMENT,
         job_name TEXT NOT NULL,
         cron TEXT,
         next_fire TEXT NOT NULL,
         paused INTEGER NOT NULL DEFAULT 0,
         output TEXT NOT NULL
     );";

impl CronDb {
    /// Open or create the schedule database.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!("Schedule database opened: {}", db_path.display());
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}
