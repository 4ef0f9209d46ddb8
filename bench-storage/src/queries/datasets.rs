//! datasets / dataset_persona table queries.

use bench_core::types::ids::DatasetId;
use rusqlite::{params, Connection};

use crate::errors::StorageError;
use crate::sqe;

#[derive(Debug, Clone)]
pub struct DatasetRecord {
    pub dataset_id: DatasetId,
    pub name: String,
    pub kind: String,
    pub config: serde_json::Value,
}

pub fn insert(conn: &Connection, name: &str, kind: &str, config: &serde_json::Value) -> Result<DatasetId, StorageError> {
    conn.execute(
        "INSERT INTO datasets (name, kind, config) VALUES (?1, ?2, ?3)",
        params![name, kind, config.to_string()],
    )
    .map_err(sqe)?;
    Ok(DatasetId(conn.last_insert_rowid()))
}

pub fn get(conn: &Connection, dataset_id: DatasetId) -> Result<Option<DatasetRecord>, StorageError> {
    conn.query_row(
        "SELECT dataset_id, name, kind, config FROM datasets WHERE dataset_id = ?1",
        params![dataset_id.0],
        |row| {
            let config_text: String = row.get(3)?;
            Ok(DatasetRecord {
                dataset_id: DatasetId(row.get(0)?),
                name: row.get(1)?,
                kind: row.get(2)?,
                config: serde_json::from_str(&config_text).unwrap_or(serde_json::Value::Null),
            })
        },
    )
    .map(Some)
    .or_else(|e| if e == rusqlite::Error::QueryReturnedNoRows { Ok(None) } else { Err(sqe(e)) })
}

pub fn add_persona(conn: &Connection, dataset_id: DatasetId, persona_uuid: &str) -> Result<(), StorageError> {
    conn.execute(
        "INSERT OR IGNORE INTO dataset_persona (dataset_id, persona_uuid) VALUES (?1, ?2)",
        params![dataset_id.0, persona_uuid],
    )
    .map_err(sqe)?;
    Ok(())
}

pub fn persona_count(conn: &Connection, dataset_id: DatasetId) -> Result<u64, StorageError> {
    conn.query_row(
        "SELECT COUNT(*) FROM dataset_persona WHERE dataset_id = ?1",
        params![dataset_id.0],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n.max(0) as u64)
    .map_err(sqe)
}

pub fn delete(conn: &Connection, dataset_id: DatasetId) -> Result<(), StorageError> {
    conn.execute("DELETE FROM dataset_persona WHERE dataset_id = ?1", params![dataset_id.0]).map_err(sqe)?;
    conn.execute("DELETE FROM datasets WHERE dataset_id = ?1", params![dataset_id.0]).map_err(sqe)?;
    Ok(())
}
