//! personas / additional_persona_attributes table queries.
//!
//! `list_page` implements the keyset pagination C9 streams personas
//! through: page size ~1000, cursor carried as `after_uuid`, ordered by
//! `persona_uuid` ascending so memory use stays bounded regardless of
//! dataset size.

use bench_core::types::ids::DatasetId;
use bench_core::types::rows::PersonaContext;
use rusqlite::{params, Connection};

use crate::errors::StorageError;
use crate::sqe;

pub const PAGE_SIZE: i64 = 1000;

#[derive(Debug, Clone)]
pub struct PersonaRow {
    pub persona_uuid: String,
    pub context: PersonaContext,
}

/// One page of personas belonging to `dataset_id`, ordered by
/// `persona_uuid` ascending, starting strictly after `after_uuid`.
pub fn list_page(
    conn: &Connection,
    dataset_id: DatasetId,
    after_uuid: Option<&str>,
    limit: i64,
) -> Result<Vec<PersonaRow>, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT p.persona_uuid, p.age, p.gender, p.education, p.occupation,
                    p.marriage_status, p.origin_name, p.religion, p.sexuality
             FROM personas p
             JOIN dataset_persona dp ON dp.persona_uuid = p.persona_uuid
             WHERE dp.dataset_id = ?1 AND p.persona_uuid > ?2
             ORDER BY p.persona_uuid ASC
             LIMIT ?3",
        )
        .map_err(sqe)?;

    let after = after_uuid.unwrap_or("");
    let rows = stmt
        .query_map(params![dataset_id.0, after, limit], |row| {
            let persona_uuid: String = row.get(0)?;
            Ok(PersonaRow {
                persona_uuid,
                context: PersonaContext {
                    name: None,
                    appearance: None,
                    biography: None,
                    age: row.get(1)?,
                    gender: row.get(2)?,
                    education: row.get(3)?,
                    occupation: row.get(4)?,
                    marriage_status: row.get(5)?,
                    origin_name: row.get(6)?,
                    religion: row.get(7)?,
                    sexuality: row.get(8)?,
                },
            })
        })
        .map_err(sqe)?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(sqe)?);
    }
    Ok(out)
}

/// Enriches a persona's context with `name` / `appearance` / `biography`
/// from `additional_persona_attributes`, scoped to a specific
/// attribute-generation run when the caller has one.
pub fn enrich_context(
    conn: &Connection,
    persona_uuid: &str,
    attr_generation_run_id: Option<i64>,
    context: &mut PersonaContext,
) -> Result<(), StorageError> {
    let Some(run_id) = attr_generation_run_id else { return Ok(()) };

    let mut stmt = conn
        .prepare_cached(
            "SELECT attribute_key, value FROM additional_persona_attributes
             WHERE persona_uuid = ?1 AND attr_generation_run_id = ?2
               AND attribute_key IN ('name', 'appearance', 'biography')",
        )
        .map_err(sqe)?;

    let rows = stmt
        .query_map(params![persona_uuid, run_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })
        .map_err(sqe)?;

    for row in rows {
        let (key, value) = row.map_err(sqe)?;
        match key.as_str() {
            "name" => context.name = value,
            "appearance" => context.appearance = value,
            "biography" => context.biography = value,
            _ => {}
        }
    }
    Ok(())
}

pub fn insert(conn: &Connection, persona_uuid: &str, context: &PersonaContext) -> Result<(), StorageError> {
    conn.execute(
        "INSERT OR IGNORE INTO personas
            (persona_uuid, age, gender, education, occupation, marriage_status,
             migration_status, origin_name, religion, sexuality)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8, ?9)",
        params![
            persona_uuid,
            context.age,
            context.gender,
            context.education,
            context.occupation,
            context.marriage_status,
            context.origin_name,
            context.religion,
            context.sexuality,
        ],
    )
    .map_err(sqe)?;
    Ok(())
}
