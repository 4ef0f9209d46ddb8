//! task_queue table queries — backs C11. Dependency resolution itself
//! lives in `bench-queue` (it needs to reason about cascades); this
//! module only exposes the row-level reads/writes the executor drives.

use bench_core::types::ids::{RunId, TaskId};
use bench_core::types::rows::{TaskRow, TaskStatus};
use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::StorageError;
use crate::sqe;

pub fn insert(
    conn: &Connection,
    task_type: &str,
    label: Option<&str>,
    config: &serde_json::Value,
    depends_on: Option<TaskId>,
    position: i64,
) -> Result<TaskId, StorageError> {
    conn.execute(
        "INSERT INTO task_queue (task_type, label, status, position, depends_on, config)
         VALUES (?1, ?2, 'queued', ?3, ?4, ?5)",
        params![task_type, label, position, depends_on.map(|t| t.0), config.to_string()],
    )
    .map_err(sqe)?;
    Ok(TaskId(conn.last_insert_rowid()))
}

pub fn get(conn: &Connection, task_id: TaskId) -> Result<Option<TaskRow>, StorageError> {
    conn.query_row(
        "SELECT task_id, task_type, label, status, position, depends_on, config,
                result_run_id, created_at, started_at, finished_at, error
         FROM task_queue WHERE task_id = ?1",
        params![task_id.0],
        map_row,
    )
    .optional()
    .map_err(sqe)
}

/// Queued tasks, FIFO by `created_at` — authoritative ordering per §6.1.
/// `position` is read but never used to reorder beyond this tie-break.
pub fn list_queued(conn: &Connection) -> Result<Vec<TaskRow>, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT task_id, task_type, label, status, position, depends_on, config,
                    result_run_id, created_at, started_at, finished_at, error
             FROM task_queue WHERE status = 'queued'
             ORDER BY created_at ASC, position ASC",
        )
        .map_err(sqe)?;

    let rows = stmt.query_map([], map_row).map_err(sqe)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(sqe)?);
    }
    Ok(out)
}

pub fn list_dependents(conn: &Connection, task_id: TaskId) -> Result<Vec<TaskRow>, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT task_id, task_type, label, status, position, depends_on, config,
                    result_run_id, created_at, started_at, finished_at, error
             FROM task_queue WHERE depends_on = ?1",
        )
        .map_err(sqe)?;

    let rows = stmt.query_map(params![task_id.0], map_row).map_err(sqe)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(sqe)?);
    }
    Ok(out)
}

pub fn mark_running(conn: &Connection, task_id: TaskId) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE task_queue SET status = 'running', started_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')
         WHERE task_id = ?1",
        params![task_id.0],
    )
    .map_err(sqe)?;
    Ok(())
}

pub fn mark_completed(conn: &Connection, task_id: TaskId, result_run_id: Option<RunId>) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE task_queue
         SET status = 'completed', finished_at = strftime('%Y-%m-%dT%H:%M:%fZ','now'), result_run_id = ?2
         WHERE task_id = ?1",
        params![task_id.0, result_run_id.map(|r| r.0)],
    )
    .map_err(sqe)?;
    Ok(())
}

pub fn mark_failed(conn: &Connection, task_id: TaskId, error: &str) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE task_queue
         SET status = 'failed', finished_at = strftime('%Y-%m-%dT%H:%M:%fZ','now'), error = ?2
         WHERE task_id = ?1",
        params![task_id.0, truncate(error, 2000)],
    )
    .map_err(sqe)?;
    Ok(())
}

pub fn mark_cancelled(conn: &Connection, task_id: TaskId, error: &str) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE task_queue
         SET status = 'cancelled', finished_at = strftime('%Y-%m-%dT%H:%M:%fZ','now'), error = ?2
         WHERE task_id = ?1",
        params![task_id.0, truncate(error, 2000)],
    )
    .map_err(sqe)?;
    Ok(())
}

/// Orphan recovery (P7): any task left `running` by a process that died
/// is reset to `queued` before the executor starts picking.
pub fn reset_orphaned_running(conn: &Connection) -> Result<usize, StorageError> {
    conn.execute(
        "UPDATE task_queue SET status = 'queued', started_at = NULL WHERE status = 'running'",
        [],
    )
    .map_err(sqe)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max).collect::<String>())
    }
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRow> {
    let status_text: String = row.get(3)?;
    let config_text: String = row.get(6)?;
    Ok(TaskRow {
        task_id: TaskId(row.get(0)?),
        task_type: row.get(1)?,
        label: row.get(2)?,
        status: status_text.parse::<TaskStatus>().unwrap_or(TaskStatus::Queued),
        position: row.get(4)?,
        depends_on: row.get::<_, Option<i64>>(5)?.map(TaskId),
        config: serde_json::from_str(&config_text).unwrap_or(serde_json::Value::Null),
        result_run_id: row.get::<_, Option<i64>>(7)?.map(RunId),
        created_at: parse_dt(row.get::<_, String>(8)?),
        started_at: row.get::<_, Option<String>>(9)?.map(parse_dt),
        finished_at: row.get::<_, Option<String>>(10)?.map(parse_dt),
        error: row.get(11)?,
    })
}

fn parse_dt(s: String) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&chrono::Utc)).unwrap_or_else(|_| chrono::Utc::now())
}
