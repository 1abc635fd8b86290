//! Workflow session storage
//!
//! One row per session; the session's runs are kept as a JSON array in the
//! `runs` column and rewritten, under a write transaction, whenever a run is
//! appended.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{Database, StorageError};
use crate::workflow::WorkflowRun;

/// Storage mode tag written with every session row
pub const WORKFLOW_MODE: &str = "workflow_v2";

static TABLE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid table name regex"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSession {
    pub session_id: String,
    pub workflow_id: String,
    pub workflow_name: String,
    pub user_id: Option<String>,
    pub session_name: Option<String>,
    pub mode: String,
    pub runs: Vec<WorkflowRun>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Session table inside a [`Database`]
pub struct SqliteStorage {
    db: Arc<Database>,
    table_name: String,
    mode: String,
}

impl SqliteStorage {
    /// Bind to `table_name`, creating the table if needed. Names outside
    /// `[A-Za-z0-9_-]` are rejected since the name is spliced into SQL.
    pub fn new(db: Arc<Database>, table_name: &str) -> Result<Self, StorageError> {
        if !TABLE_NAME_RE.is_match(table_name) {
            return Err(StorageError::InvalidTableName(table_name.to_string()));
        }
        let storage = SqliteStorage {
            db,
            table_name: table_name.to_string(),
            mode: WORKFLOW_MODE.to_string(),
        };
        storage.init_table()?;
        Ok(storage)
    }

    /// Open `database_url` and bind to `table_name`
    pub fn open(database_url: &str, table_name: &str) -> Result<Self, StorageError> {
        SqliteStorage::new(Arc::new(Database::new(database_url)?), table_name)
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    fn table(&self) -> String {
        format!("\"{}\"", self.table_name)
    }

    fn init_table(&self) -> Result<(), StorageError> {
        let conn = self.db.conn()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                session_id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                workflow_name TEXT NOT NULL,
                user_id TEXT,
                session_name TEXT,
                mode TEXT NOT NULL,
                runs TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS \"idx_{name}_workflow\" ON {table}(workflow_id, updated_at);",
            table = self.table(),
            name = self.table_name,
        ))?;
        Ok(())
    }

    /// Append `run` to its session, creating the session row on first use.
    ///
    /// The read-modify-write runs inside one `BEGIN IMMEDIATE` transaction so
    /// concurrent appends to the same session serialize instead of
    /// overwriting each other. A session owned by another workflow is
    /// rejected with [`StorageError::WorkflowMismatch`].
    pub fn append_run(
        &self,
        workflow_name: &str,
        user_id: Option<&str>,
        run: &WorkflowRun,
    ) -> Result<WorkflowSession, StorageError> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let now = Utc::now();
        let mut session = match self.load_session(&tx, &run.session_id)? {
            Some(existing) => existing,
            None => WorkflowSession {
                session_id: run.session_id.clone(),
                workflow_id: run.workflow_id.clone(),
                workflow_name: workflow_name.to_string(),
                user_id: user_id.map(str::to_string),
                session_name: None,
                mode: self.mode.clone(),
                runs: Vec::new(),
                created_at: now,
                updated_at: now,
            },
        };
        check_owner(&session, &run.workflow_id)?;

        match session.runs.iter_mut().find(|r| r.run_id == run.run_id) {
            Some(existing) => *existing = run.clone(),
            None => session.runs.push(run.clone()),
        }
        if session.user_id.is_none() {
            session.user_id = user_id.map(str::to_string);
        }
        session.updated_at = now;

        self.write_session(&tx, &session)?;
        tx.commit()?;

        log::debug!(
            "[STORAGE] Session {} now holds {} run(s)",
            session.session_id,
            session.runs.len()
        );
        Ok(session)
    }

    /// Fails when `session_id` exists and belongs to a workflow other than
    /// `workflow_id`. Unknown sessions are accepted.
    pub fn ensure_session_owner(&self, session_id: &str, workflow_id: &str) -> Result<(), StorageError> {
        match self.get_session(session_id)? {
            Some(session) => check_owner(&session, workflow_id),
            None => Ok(()),
        }
    }

    pub fn upsert_session(&self, session: &WorkflowSession) -> Result<(), StorageError> {
        let conn = self.db.conn()?;
        self.write_session(&conn, session)
    }

    fn write_session(&self, conn: &Connection, session: &WorkflowSession) -> Result<(), StorageError> {
        let runs = serde_json::to_string(&session.runs)?;
        conn.execute(
            &format!(
                "INSERT INTO {} (session_id, workflow_id, workflow_name, user_id, session_name,
                                 mode, runs, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(session_id) DO UPDATE SET
                    user_id = excluded.user_id,
                    session_name = excluded.session_name,
                    runs = excluded.runs,
                    updated_at = excluded.updated_at",
                self.table()
            ),
            rusqlite::params![
                session.session_id,
                session.workflow_id,
                session.workflow_name,
                session.user_id,
                session.session_name,
                session.mode,
                runs,
                session.created_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<WorkflowSession>, StorageError> {
        let conn = self.db.conn()?;
        self.load_session(&conn, session_id)
    }

    fn load_session(&self, conn: &Connection, session_id: &str) -> Result<Option<WorkflowSession>, StorageError> {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM {} WHERE session_id = ?1", COLUMNS, self.table()),
                [session_id],
                SessionRow::from_row,
            )
            .optional()?;
        row.map(SessionRow::into_session).transpose()
    }

    /// Sessions of one workflow, most recently updated first
    pub fn list_sessions(&self, workflow_id: &str) -> Result<Vec<WorkflowSession>, StorageError> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE workflow_id = ?1 ORDER BY updated_at DESC",
            COLUMNS,
            self.table()
        ))?;
        let rows = stmt
            .query_map([workflow_id], SessionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(SessionRow::into_session).collect()
    }

    /// Returns false when the session does not exist
    pub fn rename_session(&self, session_id: &str, name: &str) -> Result<bool, StorageError> {
        let conn = self.db.conn()?;
        let rows = conn.execute(
            &format!(
                "UPDATE {} SET session_name = ?1, updated_at = ?2 WHERE session_id = ?3",
                self.table()
            ),
            rusqlite::params![name, Utc::now().to_rfc3339(), session_id],
        )?;
        Ok(rows > 0)
    }

    /// Returns false when the session does not exist
    pub fn delete_session(&self, session_id: &str) -> Result<bool, StorageError> {
        let conn = self.db.conn()?;
        let rows = conn.execute(
            &format!("DELETE FROM {} WHERE session_id = ?1", self.table()),
            [session_id],
        )?;
        if rows > 0 {
            log::info!("[STORAGE] Deleted session {}", session_id);
        }
        Ok(rows > 0)
    }
}

fn check_owner(session: &WorkflowSession, workflow_id: &str) -> Result<(), StorageError> {
    if session.workflow_id == workflow_id {
        return Ok(());
    }
    Err(StorageError::WorkflowMismatch {
        session_id: session.session_id.clone(),
        expected: workflow_id.to_string(),
        found: session.workflow_id.clone(),
    })
}

const COLUMNS: &str = "session_id, workflow_id, workflow_name, user_id, session_name, mode, runs, created_at, updated_at";

/// Raw column values, decoded outside the rusqlite row closure
struct SessionRow {
    session_id: String,
    workflow_id: String,
    workflow_name: String,
    user_id: Option<String>,
    session_name: Option<String>,
    mode: String,
    runs: String,
    created_at: String,
    updated_at: String,
}

impl SessionRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(SessionRow {
            session_id: row.get(0)?,
            workflow_id: row.get(1)?,
            workflow_name: row.get(2)?,
            user_id: row.get(3)?,
            session_name: row.get(4)?,
            mode: row.get(5)?,
            runs: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_session(self) -> Result<WorkflowSession, StorageError> {
        Ok(WorkflowSession {
            runs: serde_json::from_str(&self.runs)?,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
            session_id: self.session_id,
            workflow_id: self.workflow_id,
            workflow_name: self.workflow_name,
            user_id: self.user_id,
            session_name: self.session_name,
            mode: self.mode,
        })
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
