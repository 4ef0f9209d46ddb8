use rusqlite::Connection;

use crate::errors::StorageError;
use crate::sqe;

pub fn migrate(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS datasets (
            dataset_id  INTEGER PRIMARY KEY,
            name        TEXT NOT NULL,
            kind        TEXT NOT NULL CHECK (kind IN ('pool','balanced','counterfactual','reality')),
            config      TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS personas (
            persona_uuid     TEXT PRIMARY KEY,
            age              INTEGER,
            gender           TEXT,
            education        TEXT,
            occupation       TEXT,
            marriage_status  TEXT,
            migration_status TEXT,
            origin_name      TEXT,
            religion         TEXT,
            sexuality        TEXT
        );

        CREATE TABLE IF NOT EXISTS dataset_persona (
            dataset_id   INTEGER NOT NULL REFERENCES datasets(dataset_id),
            persona_uuid TEXT NOT NULL REFERENCES personas(persona_uuid),
            PRIMARY KEY (dataset_id, persona_uuid)
        );

        CREATE INDEX IF NOT EXISTS idx_dataset_persona_persona
            ON dataset_persona(persona_uuid);

        CREATE TABLE IF NOT EXISTS additional_persona_attributes (
            persona_uuid          TEXT NOT NULL REFERENCES personas(persona_uuid),
            attr_generation_run_id INTEGER NOT NULL,
            attribute_key         TEXT NOT NULL,
            value                 TEXT,
            UNIQUE (persona_uuid, attr_generation_run_id, attribute_key)
        );

        CREATE TABLE IF NOT EXISTS traits (
            trait_id      INTEGER PRIMARY KEY,
            adjective     TEXT NOT NULL,
            case_template TEXT,
            category      TEXT,
            valence       INTEGER CHECK (valence IN (-1,0,1) OR valence IS NULL),
            is_active     INTEGER NOT NULL DEFAULT 1
        );

        CREATE INDEX IF NOT EXISTS idx_traits_active ON traits(is_active);
        ",
    )
    .map_err(sqe)
}
