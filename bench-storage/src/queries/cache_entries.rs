//! cache_entries table queries (C3's durable mirror of the in-memory
//! `moka` cache — written behind the batch writer, read directly on a
//! cache miss).

use bench_core::types::ids::RunId;
use rusqlite::{params, Connection};

use crate::batch::commands::CacheEntryRow;
use crate::errors::StorageError;
use crate::sqe;

pub fn upsert_many(conn: &Connection, rows: &[CacheEntryRow]) -> Result<usize, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "INSERT INTO cache_entries (run_id, kind, key, payload_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, strftime('%Y-%m-%dT%H:%M:%fZ','now'))
             ON CONFLICT(run_id, kind, key) DO UPDATE SET
                 payload_json = excluded.payload_json,
                 updated_at = excluded.updated_at",
        )
        .map_err(sqe)?;

    let mut count = 0;
    for row in rows {
        stmt.execute(params![row.run_id.0, row.kind, row.key, row.payload_json]).map_err(sqe)?;
        count += 1;
    }
    Ok(count)
}

pub fn delete_for_run(conn: &Connection, run_id: RunId) -> Result<usize, StorageError> {
    conn.execute("DELETE FROM cache_entries WHERE run_id = ?1", params![run_id.0]).map_err(sqe)
}

pub fn get(conn: &Connection, run_id: RunId, kind: &str, key: &str) -> Result<Option<String>, StorageError> {
    conn.query_row(
        "SELECT payload_json FROM cache_entries WHERE run_id = ?1 AND kind = ?2 AND key = ?3",
        params![run_id.0, kind, key],
        |row| row.get(0),
    )
    .map(Some)
    .or_else(|e| if e == rusqlite::Error::QueryReturnedNoRows { Ok(None) } else { Err(sqe(e)) })
}
