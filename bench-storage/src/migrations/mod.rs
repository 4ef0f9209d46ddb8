//! Migration runner — version tracking, forward-only, transactional per
//! migration. Ported from `cortex-storage`'s migration runner.

mod v001_initial_schema;
mod v002_benchmark_tables;
mod v003_task_queue;
mod v004_cache_entries;
mod v005_counterfactual_links;

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::errors::StorageError;
use crate::sqe;

pub const LATEST_VERSION: u32 = 5;

type MigrationFn = fn(&Connection) -> Result<(), StorageError>;

const MIGRATIONS: [(u32, &str, MigrationFn); 5] = [
    (1, "initial_schema", v001_initial_schema::migrate),
    (2, "benchmark_tables", v002_benchmark_tables::migrate),
    (3, "task_queue", v003_task_queue::migrate),
    (4, "cache_entries", v004_cache_entries::migrate),
    (5, "counterfactual_links", v005_counterfactual_links::migrate),
];

/// Get the current schema version. Returns 0 if `schema_version` doesn't
/// exist yet.
pub fn current_version(conn: &Connection) -> Result<u32, StorageError> {
    let exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version'")
        .and_then(|mut stmt| stmt.exists([]))
        .map_err(sqe)?;

    if !exists {
        return Ok(0);
    }

    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))
        .map_err(sqe)
}

/// Run all pending migrations. Forward-only, each wrapped in its own
/// transaction.
pub fn run_migrations(conn: &Connection) -> Result<u32, StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        );",
    )
    .map_err(sqe)?;

    let current = current_version(conn)?;
    let mut applied = 0;

    if current >= LATEST_VERSION {
        debug!("database schema is up to date (v{current})");
        return Ok(0);
    }

    info!("running migrations: v{} → v{}", current, LATEST_VERSION);

    for &(version, name, migrate_fn) in &MIGRATIONS {
        if version <= current {
            continue;
        }

        debug!("applying migration v{version:03}: {name}");

        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| StorageError::MigrationFailed {
                version,
                message: format!("begin transaction: {e}"),
            })?;

        match migrate_fn(conn) {
            Ok(()) => {
                conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])
                    .map_err(|e| StorageError::MigrationFailed {
                        version,
                        message: format!("record version: {e}"),
                    })?;

                conn.execute_batch("COMMIT").map_err(|e| StorageError::MigrationFailed {
                    version,
                    message: format!("commit: {e}"),
                })?;

                info!("applied migration v{version:03}: {name}");
                applied += 1;
            }
            Err(e) => {
                warn!("migration v{version:03} failed: {e}, rolling back");
                let _ = conn.execute_batch("ROLLBACK");
                return Err(StorageError::MigrationFailed { version, message: e.to_string() });
            }
        }
    }

    info!("applied {applied} migration(s), now at v{LATEST_VERSION}");
    Ok(applied)
}
