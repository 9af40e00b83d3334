//! SQLite-backed command record store.
//!
//! Each ledger transition becomes one row holding the full command snapshot
//! as JSON, next to the columns used for filtering.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection};
use std::sync::Arc;

use citydesk_core::{
    traits::{RecordFilter, RecordStore},
    types::Command,
    Error, Result,
};

/// Durable record store; records survive restarts.
pub struct SqliteRecordStore {
    conn: Arc<tokio::sync::Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Open (or create) the store at `path`.
    pub fn new(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::storage(format!("DB error: {}", e)))?;
        Self::with_connection(conn)
    }

    /// Store backed by a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::storage(format!("DB error: {}", e)))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS command_records (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                command_id TEXT NOT NULL,
                submitter TEXT NOT NULL,
                intent TEXT NOT NULL,
                state TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                created_at TEXT, -- fixed-width UTC, compared as text
                snapshot TEXT NOT NULL -- JSON command
            )",
            [],
        )
        .map_err(|e| Error::storage(format!("Schema error: {}", e)))?;

        // Databases written before the column existed.
        let has_created_at: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM pragma_table_info('command_records') WHERE name = 'created_at'",
                [],
                |row| row.get(0),
            )
            .map_err(|e| Error::storage(format!("Schema error: {}", e)))?;
        if !has_created_at {
            conn.execute("ALTER TABLE command_records ADD COLUMN created_at TEXT", [])
                .map_err(|e| Error::storage(format!("Migration error: {}", e)))?;
            conn.execute(
                "UPDATE command_records SET created_at = json_extract(snapshot, '$.created_at')",
                [],
            )
            .map_err(|e| Error::storage(format!("Migration error: {}", e)))?;
        }

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_command_records_command ON command_records (command_id)",
            [],
        )
        .map_err(|e| Error::storage(format!("Index error: {}", e)))?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_command_records_submitter ON command_records (submitter)",
            [],
        )
        .map_err(|e| Error::storage(format!("Index error: {}", e)))?;

        Ok(Self {
            conn: Arc::new(tokio::sync::Mutex::new(conn)),
        })
    }
}

/// Build the SELECT for `filter`, returning the SQL and its parameters.
fn build_query(filter: &RecordFilter) -> (String, Vec<SqlValue>) {
    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<SqlValue> = Vec::new();

    if filter.latest_only {
        clauses.push("seq IN (SELECT MAX(seq) FROM command_records GROUP BY command_id)");
    }
    if let Some(id) = &filter.command_id {
        clauses.push("command_id = ?");
        args.push(SqlValue::Text(id.clone()));
    }
    if let Some(submitter) = &filter.submitter {
        clauses.push("submitter = ?");
        args.push(SqlValue::Text(submitter.clone()));
    }
    if let Some(intent) = filter.intent {
        clauses.push("intent = ?");
        args.push(SqlValue::Text(intent.as_str().to_string()));
    }
    if let Some(state) = filter.state {
        clauses.push("state = ?");
        args.push(SqlValue::Text(state.as_str().to_string()));
    }
    if let Some(since) = filter.since {
        clauses.push("created_at >= ?");
        args.push(SqlValue::Text(sortable_time(since)));
    }

    let mut sql = String::from("SELECT seq, snapshot FROM command_records");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY seq DESC");
    if let Some(limit) = filter.limit {
        sql.push_str(" LIMIT ?");
        args.push(SqlValue::Integer(limit as i64));
    }

    (format!("SELECT snapshot FROM ({}) ORDER BY seq ASC", sql), args)
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn append_record(&self, record: &Command) -> Result<()> {
        let conn = self.conn.clone();
        let snapshot = serde_json::to_string(record)?;
        let command_id = record.id.clone();
        let submitter = record.submitter.clone();
        let intent = record.intent.as_str();
        let state = record.state.as_str();
        let recorded_at = transition_time(record);
        let created_at = sortable_time(record.created_at);

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO command_records (command_id, submitter, intent, state, recorded_at, created_at, snapshot)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![command_id, submitter, intent, state, recorded_at, created_at, snapshot],
            )
            .map_err(|e| Error::storage(format!("Insert error: {}", e)))?;
            Ok(())
        })
        .await
        .map_err(|e| Error::internal(e.to_string()))?
    }

    async fn query_records(&self, filter: &RecordFilter) -> Result<Vec<Command>> {
        let conn = self.conn.clone();
        let (sql, args) = build_query(filter);

        let rows: Vec<String> = tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| Error::storage(format!("Prepare error: {}", e)))?;
            let rows = stmt
                .query_map(params_from_iter(args), |row| row.get::<_, String>(0))
                .map_err(|e| Error::storage(format!("Query error: {}", e)))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::storage(format!("Result error: {}", e)))?;
            Ok::<_, Error>(rows)
        })
        .await
        .map_err(|e| Error::internal(e.to_string()))??;

        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(Error::from))
            .collect()
    }
}

/// Timestamp of the transition a snapshot records.
fn transition_time(record: &Command) -> String {
    record
        .completed_at
        .or(record.started_at)
        .unwrap_or(record.created_at)
        .to_rfc3339()
}

/// Microsecond UTC timestamp whose text order matches time order.
fn sortable_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
