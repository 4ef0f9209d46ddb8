//! traits table queries. Only `is_active` traits participate in a run.

use bench_core::types::ids::TraitId;
use bench_core::types::rows::TraitRow;
use rusqlite::{params, Connection};

use crate::errors::StorageError;
use crate::sqe;

pub fn list_active(conn: &Connection) -> Result<Vec<TraitRow>, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT trait_id, adjective, case_template, category, valence, is_active
             FROM traits WHERE is_active = 1 ORDER BY trait_id ASC",
        )
        .map_err(sqe)?;

    let rows = stmt.query_map([], map_row).map_err(sqe)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(sqe)?);
    }
    Ok(out)
}

pub fn get(conn: &Connection, trait_id: TraitId) -> Result<Option<TraitRow>, StorageError> {
    conn.query_row(
        "SELECT trait_id, adjective, case_template, category, valence, is_active
         FROM traits WHERE trait_id = ?1",
        params![trait_id.0],
        map_row,
    )
    .map(Some)
    .or_else(|e| if e == rusqlite::Error::QueryReturnedNoRows { Ok(None) } else { Err(sqe(e)) })
}

pub fn insert(conn: &Connection, t: &TraitRow) -> Result<TraitId, StorageError> {
    conn.execute(
        "INSERT INTO traits (adjective, case_template, category, valence, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![t.adjective, t.case_template, t.category, t.valence, t.is_active as i64],
    )
    .map_err(sqe)?;
    Ok(TraitId(conn.last_insert_rowid()))
}

/// Refused by the caller (not enforced here) once any `BenchmarkResult`
/// references the trait — deletion-eligibility is a pipeline-level
/// concern per §3's lifecycle rules, not a storage-layer constraint.
pub fn delete(conn: &Connection, trait_id: TraitId) -> Result<(), StorageError> {
    conn.execute("DELETE FROM traits WHERE trait_id = ?1", params![trait_id.0]).map_err(sqe)?;
    Ok(())
}

pub fn is_referenced_by_results(conn: &Connection, trait_id: TraitId) -> Result<bool, StorageError> {
    conn.query_row(
        "SELECT 1 FROM benchmark_results WHERE case_id = ?1 LIMIT 1",
        params![trait_id.to_string()],
        |row| row.get::<_, i64>(0),
    )
    .map(|_| true)
    .or_else(|e| if e == rusqlite::Error::QueryReturnedNoRows { Ok(false) } else { Err(sqe(e)) })
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TraitRow> {
    Ok(TraitRow {
        trait_id: TraitId(row.get(0)?),
        adjective: row.get(1)?,
        case_template: row.get(2)?,
        category: row.get(3)?,
        valence: row.get(4)?,
        is_active: row.get::<_, i64>(5)? != 0,
    })
}
