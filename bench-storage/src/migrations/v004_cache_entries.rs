use rusqlite::Connection;

use crate::errors::StorageError;
use crate::sqe;

pub fn migrate(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS cache_entries (
            run_id       INTEGER NOT NULL,
            kind         TEXT NOT NULL,
            key          TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            updated_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            PRIMARY KEY (run_id, kind, key)
        );
        ",
    )
    .map_err(sqe)
}
