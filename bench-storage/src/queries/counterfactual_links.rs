//! counterfactual_links table queries. Pairs personas used by the
//! (external) counterfactual analytics collaborator — the core only
//! needs to store and look them up.

use bench_core::types::ids::DatasetId;
use rusqlite::{params, Connection};

use crate::errors::StorageError;
use crate::sqe;

#[derive(Debug, Clone)]
pub struct CounterfactualLinkRecord {
    pub dataset_id: DatasetId,
    pub source_persona_id: String,
    pub cf_persona_id: String,
    pub changed_attribute: String,
    pub from_value: Option<String>,
    pub to_value: Option<String>,
}

pub fn insert(conn: &Connection, link: &CounterfactualLinkRecord) -> Result<(), StorageError> {
    conn.execute(
        "INSERT OR IGNORE INTO counterfactual_links
            (dataset_id, source_persona_id, cf_persona_id, changed_attribute, from_value, to_value)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            link.dataset_id.0,
            link.source_persona_id,
            link.cf_persona_id,
            link.changed_attribute,
            link.from_value,
            link.to_value,
        ],
    )
    .map_err(sqe)?;
    Ok(())
}

pub fn list_for_dataset(conn: &Connection, dataset_id: DatasetId) -> Result<Vec<CounterfactualLinkRecord>, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT dataset_id, source_persona_id, cf_persona_id, changed_attribute, from_value, to_value
             FROM counterfactual_links WHERE dataset_id = ?1",
        )
        .map_err(sqe)?;

    let rows = stmt
        .query_map(params![dataset_id.0], |row| {
            Ok(CounterfactualLinkRecord {
                dataset_id: DatasetId(row.get(0)?),
                source_persona_id: row.get(1)?,
                cf_persona_id: row.get(2)?,
                changed_attribute: row.get(3)?,
                from_value: row.get(4)?,
                to_value: row.get(5)?,
            })
        })
        .map_err(sqe)?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(sqe)?);
    }
    Ok(out)
}
