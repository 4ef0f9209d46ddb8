use rusqlite::Connection;

use crate::errors::StorageError;
use crate::sqe;

pub fn migrate(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS benchmark_runs (
            run_id            INTEGER PRIMARY KEY,
            dataset_id        INTEGER NOT NULL REFERENCES datasets(dataset_id),
            model_id          INTEGER NOT NULL,
            batch_size        INTEGER NOT NULL DEFAULT 8,
            max_attempts      INTEGER NOT NULL DEFAULT 3,
            include_rationale INTEGER NOT NULL DEFAULT 0,
            system_prompt     TEXT,
            scale_mode        TEXT NOT NULL DEFAULT 'in' CHECK (scale_mode IN ('in','rev','dual')),
            dual_fraction     REAL NOT NULL DEFAULT 0.0,
            status            TEXT NOT NULL DEFAULT 'queued',
            created_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        );

        CREATE TABLE IF NOT EXISTS benchmark_results (
            run_id           INTEGER NOT NULL REFERENCES benchmark_runs(run_id),
            persona_uuid     TEXT NOT NULL REFERENCES personas(persona_uuid),
            case_id          TEXT NOT NULL,
            scale_order      TEXT NOT NULL CHECK (scale_order IN ('in','rev')),
            attempt          INTEGER NOT NULL,
            answer_raw       TEXT NOT NULL,
            rating           INTEGER,
            rating_raw       INTEGER,
            gen_time_ms      INTEGER NOT NULL DEFAULT 0,
            model_name       TEXT NOT NULL,
            template_version TEXT NOT NULL DEFAULT 'v1',
            created_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            UNIQUE (run_id, persona_uuid, case_id, scale_order)
        );

        CREATE INDEX IF NOT EXISTS idx_results_run ON benchmark_results(run_id);

        CREATE TABLE IF NOT EXISTS fail_log (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id            INTEGER NOT NULL REFERENCES benchmark_runs(run_id),
            persona_uuid      TEXT NOT NULL,
            model_id          INTEGER,
            attempt           INTEGER NOT NULL,
            error_kind        TEXT NOT NULL,
            raw_text_snippet  TEXT NOT NULL DEFAULT '',
            prompt_snippet    TEXT NOT NULL DEFAULT '',
            created_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        );

        CREATE INDEX IF NOT EXISTS idx_fail_log_run ON fail_log(run_id);
        ",
    )
    .map_err(sqe)
}
