//! fail_log table queries — append-only.

use bench_core::types::ids::RunId;
use bench_core::types::rows::FailLogEntry;
use rusqlite::{params, Connection};

use crate::errors::StorageError;
use crate::sqe;

pub fn insert(conn: &Connection, entry: &FailLogEntry) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO fail_log
            (run_id, persona_uuid, model_id, attempt, error_kind, raw_text_snippet,
             prompt_snippet, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.run_id.0,
            entry.persona_uuid.as_ref(),
            entry.model_id.map(|m| m.0),
            entry.attempt,
            entry.error_kind,
            entry.raw_text_snippet,
            entry.prompt_snippet,
            entry.created_at.to_rfc3339(),
        ],
    )
    .map_err(sqe)?;
    Ok(())
}

pub fn count_for_run(conn: &Connection, run_id: RunId) -> Result<u64, StorageError> {
    conn.query_row("SELECT COUNT(*) FROM fail_log WHERE run_id = ?1", params![run_id.0], |row| {
        row.get::<_, i64>(0)
    })
    .map(|n| n.max(0) as u64)
    .map_err(sqe)
}
