//! SQLite access shared by the playground and the workflows.
//!
//! One r2d2 pool per database file; every operation borrows a connection for
//! its own duration.

pub mod sessions;

pub use sessions::{SqliteStorage, WorkflowSession, WORKFLOW_MODE};

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::fmt;
use std::path::Path;

pub type DbConn = PooledConnection<SqliteConnectionManager>;

#[derive(Debug)]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    Pool(r2d2::Error),
    Serialization(serde_json::Error),
    InvalidTableName(String),
    Io(std::io::Error),
    /// The session already belongs to another workflow
    WorkflowMismatch {
        session_id: String,
        expected: String,
        found: String,
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Sqlite(e) => write!(f, "sqlite error: {}", e),
            StorageError::Pool(e) => write!(f, "connection pool error: {}", e),
            StorageError::Serialization(e) => write!(f, "failed to (de)serialize runs: {}", e),
            StorageError::InvalidTableName(name) => write!(f, "invalid table name: {:?}", name),
            StorageError::Io(e) => write!(f, "io error: {}", e),
            StorageError::WorkflowMismatch {
                session_id,
                expected,
                found,
            } => write!(
                f,
                "session {} belongs to workflow '{}', not '{}'",
                session_id, found, expected
            ),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Sqlite(e)
    }
}

impl From<r2d2::Error> for StorageError {
    fn from(e: r2d2::Error) -> Self {
        StorageError::Pool(e)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open (or create) the database at `database_url`.
    ///
    /// `":memory:"` gives a private in-memory database; the pool is limited to
    /// a single connection so every caller sees the same data.
    pub fn new(database_url: &str) -> Result<Self, StorageError> {
        let (manager, max_size) = if database_url == ":memory:" {
            (SqliteConnectionManager::memory(), 1)
        } else {
            if let Some(parent) = Path::new(database_url).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            (SqliteConnectionManager::file(database_url), 8)
        };

        let manager = manager.with_init(|conn| {
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
        });
        let pool = Pool::builder().max_size(max_size).build(manager)?;

        log::info!("[STORAGE] Opened database {}", database_url);
        Ok(Database { pool })
    }

    pub fn conn(&self) -> Result<DbConn, StorageError> {
        Ok(self.pool.get()?)
    }
}
