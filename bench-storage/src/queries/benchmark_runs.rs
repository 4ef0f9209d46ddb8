//! benchmark_runs table queries.

use bench_core::types::ids::{DatasetId, ModelId, RunId};
use bench_core::types::rows::BenchmarkRunRow;
use bench_core::types::scale::ScaleMode;
use rusqlite::{params, Connection};

use crate::errors::StorageError;
use crate::sqe;

#[allow(clippy::too_many_arguments)]
pub fn insert(
    conn: &Connection,
    dataset_id: DatasetId,
    model_id: ModelId,
    batch_size: u32,
    max_attempts: u32,
    include_rationale: bool,
    system_prompt: Option<&str>,
    scale_mode: ScaleMode,
    dual_fraction: f64,
) -> Result<RunId, StorageError> {
    conn.execute(
        "INSERT INTO benchmark_runs
            (dataset_id, model_id, batch_size, max_attempts, include_rationale,
             system_prompt, scale_mode, dual_fraction, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'queued')",
        params![
            dataset_id.0,
            model_id.0,
            batch_size,
            max_attempts,
            include_rationale as i64,
            system_prompt,
            scale_mode_str(scale_mode),
            dual_fraction,
        ],
    )
    .map_err(sqe)?;
    Ok(RunId(conn.last_insert_rowid()))
}

pub fn get(conn: &Connection, run_id: RunId) -> Result<Option<BenchmarkRunRow>, StorageError> {
    conn.query_row(
        "SELECT run_id, dataset_id, model_id, batch_size, max_attempts, include_rationale,
                system_prompt, scale_mode, dual_fraction, created_at
         FROM benchmark_runs WHERE run_id = ?1",
        params![run_id.0],
        map_row,
    )
    .map(Some)
    .or_else(|e| if e == rusqlite::Error::QueryReturnedNoRows { Ok(None) } else { Err(sqe(e)) })
}

pub fn set_status(conn: &Connection, run_id: RunId, status: &str) -> Result<(), StorageError> {
    conn.execute("UPDATE benchmark_runs SET status = ?1 WHERE run_id = ?2", params![status, run_id.0])
        .map_err(sqe)?;
    Ok(())
}

pub fn get_status(conn: &Connection, run_id: RunId) -> Result<Option<String>, StorageError> {
    conn.query_row("SELECT status FROM benchmark_runs WHERE run_id = ?1", params![run_id.0], |row| row.get(0))
        .map(Some)
        .or_else(|e| if e == rusqlite::Error::QueryReturnedNoRows { Ok(None) } else { Err(sqe(e)) })
}

pub fn delete(conn: &Connection, run_id: RunId) -> Result<(), StorageError> {
    conn.execute("DELETE FROM fail_log WHERE run_id = ?1", params![run_id.0]).map_err(sqe)?;
    conn.execute("DELETE FROM benchmark_results WHERE run_id = ?1", params![run_id.0]).map_err(sqe)?;
    conn.execute("DELETE FROM benchmark_runs WHERE run_id = ?1", params![run_id.0]).map_err(sqe)?;
    Ok(())
}

fn scale_mode_str(mode: ScaleMode) -> &'static str {
    match mode {
        ScaleMode::In => "in",
        ScaleMode::Rev => "rev",
        ScaleMode::Dual => "dual",
    }
}

fn parse_scale_mode(s: &str) -> ScaleMode {
    match s {
        "rev" => ScaleMode::Rev,
        "dual" => ScaleMode::Dual,
        _ => ScaleMode::In,
    }
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BenchmarkRunRow> {
    let scale_mode_text: String = row.get(7)?;
    let created_at_text: String = row.get(9)?;
    Ok(BenchmarkRunRow {
        run_id: RunId(row.get(0)?),
        dataset_id: DatasetId(row.get(1)?),
        model_id: ModelId(row.get(2)?),
        batch_size: row.get(3)?,
        max_attempts: row.get(4)?,
        include_rationale: row.get::<_, i64>(5)? != 0,
        system_prompt: row.get(6)?,
        scale_mode: parse_scale_mode(&scale_mode_text),
        dual_fraction: row.get(8)?,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at_text)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
    })
}
