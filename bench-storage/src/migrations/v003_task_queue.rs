use rusqlite::Connection;

use crate::errors::StorageError;
use crate::sqe;

pub fn migrate(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS task_queue (
            task_id         INTEGER PRIMARY KEY AUTOINCREMENT,
            task_type       TEXT NOT NULL,
            label           TEXT,
            status          TEXT NOT NULL DEFAULT 'queued'
                                CHECK (status IN ('queued','running','completed','failed','cancelled')),
            position        INTEGER NOT NULL DEFAULT 0,
            depends_on      INTEGER REFERENCES task_queue(task_id),
            config          TEXT NOT NULL DEFAULT '{}',
            result_run_id   INTEGER,
            created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            started_at      TEXT,
            finished_at     TEXT,
            error           TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_task_queue_status_created
            ON task_queue(status, created_at);
        CREATE INDEX IF NOT EXISTS idx_task_queue_depends_on
            ON task_queue(depends_on);
        ",
    )
    .map_err(sqe)
}
