//! benchmark_results table queries — the persistence surface for C7.
//!
//! `upsert_many` is the conflict-ignore batch insert keyed by
//! `(run_id, persona_uuid, case_id, scale_order)` (P1): retries and
//! crash-resume replay the same row without duplicating it.

use bench_core::progress::CompletedKey;
use bench_core::types::ids::RunId;
use bench_core::types::rows::BenchmarkResultRow;
use bench_core::types::scale::ScaleOrder;
use rusqlite::{params, Connection};
use std::collections::HashSet;

use crate::errors::StorageError;
use crate::sqe;

/// Inserts rows, ignoring conflicts on the unique key. Returns the
/// number of rows actually inserted (conflicts are not counted, so a
/// caller can distinguish "all duplicates" from "some new work").
pub fn upsert_many(conn: &Connection, rows: &[BenchmarkResultRow]) -> Result<usize, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "INSERT OR IGNORE INTO benchmark_results
                (run_id, persona_uuid, case_id, scale_order, attempt, answer_raw,
                 rating, rating_raw, gen_time_ms, model_name, template_version, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .map_err(sqe)?;

    let mut inserted = 0;
    for row in rows {
        let changed = stmt
            .execute(params![
                row.run_id.0,
                row.persona_uuid.as_ref(),
                row.case_id,
                row.scale_order.as_str(),
                row.attempt,
                row.answer_raw,
                row.rating,
                row.rating_raw,
                row.gen_time_ms,
                row.model_name,
                row.template_version,
                row.created_at.to_rfc3339(),
            ])
            .map_err(sqe)?;
        inserted += changed;
    }
    Ok(inserted)
}

pub fn count_completed(conn: &Connection, run_id: RunId) -> Result<u64, StorageError> {
    conn.query_row(
        "SELECT COUNT(*) FROM (
            SELECT DISTINCT persona_uuid, case_id, scale_order
            FROM benchmark_results WHERE run_id = ?1
         )",
        params![run_id.0],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n.max(0) as u64)
    .map_err(sqe)
}

pub fn row_count(conn: &Connection, run_id: RunId) -> Result<i64, StorageError> {
    conn.query_row("SELECT COUNT(*) FROM benchmark_results WHERE run_id = ?1", params![run_id.0], |row| row.get(0))
        .map_err(sqe)
}

/// The `(persona_uuid, case_id, scale_order)` triples already persisted
/// for a run — used by C9 to skip re-emitting completed work (P3).
pub fn completed_keys(conn: &Connection, run_id: RunId) -> Result<HashSet<CompletedKey>, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT DISTINCT persona_uuid, case_id, scale_order
             FROM benchmark_results WHERE run_id = ?1",
        )
        .map_err(sqe)?;

    let rows = stmt
        .query_map(params![run_id.0], |row| {
            let persona_uuid: String = row.get(0)?;
            let case_id: String = row.get(1)?;
            let scale_order: String = row.get(2)?;
            Ok((persona_uuid, case_id, scale_order))
        })
        .map_err(sqe)?;

    let mut out = HashSet::new();
    for row in rows {
        let (persona_uuid, case_id, scale_order) = row.map_err(sqe)?;
        let order = scale_order.parse::<ScaleOrder>().unwrap_or(ScaleOrder::In);
        out.insert((persona_uuid.into(), case_id, order));
    }
    Ok(out)
}
