use rusqlite::Connection;

use crate::errors::StorageError;
use crate::sqe;

pub fn migrate(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS counterfactual_links (
            dataset_id        INTEGER NOT NULL REFERENCES datasets(dataset_id),
            source_persona_id TEXT NOT NULL REFERENCES personas(persona_uuid),
            cf_persona_id     TEXT NOT NULL REFERENCES personas(persona_uuid),
            changed_attribute TEXT NOT NULL,
            from_value        TEXT,
            to_value          TEXT,
            PRIMARY KEY (dataset_id, source_persona_id, cf_persona_id, changed_attribute)
        );
        ",
    )
    .map_err(sqe)
}
