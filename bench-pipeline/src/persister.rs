//! The persister (C7). Ported 1:1 from `BenchPersisterPeewee.persist_results`'s
//! retry loop (`persister_bench_sqlite.py`): conflict-ignore batch
//! upsert in one transaction per call, a process-wide lock serializing
//! batches (the original's `self.db.atomic()` plus an upstream
//! application lock — SQLite's single-writer model means any two
//! concurrent batch transactions would otherwise deadlock/serialize
//! against each other), retry up to 3 attempts with exponential backoff
//! starting at ~100ms on deadlock/serialization/timeout-shaped errors.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bench_core::types::ids::RunId;
use bench_core::types::rows::{BenchmarkResultRow, FailLogEntry};
use bench_storage::{queries, StorageEngine, StorageError};
use dashmap::DashMap;

use crate::errors::{PipelineError, PipelineResult};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

pub struct Persister {
    engine: Arc<StorageEngine>,
    /// Serializes batches across the whole process, per §4.7/§5 — two
    /// concurrent `persist_results` calls would otherwise contend on
    /// SQLite's single writer and surface spurious `SQLITE_BUSY`.
    write_lock: Mutex<()>,
    /// Class-level progress counter, independent of the database row
    /// count (§4.7): incremented by the number of *accepted* rows per
    /// batch so a caller can read progress without a `COUNT(*)` query.
    progress: DashMap<RunId, (u64, Instant)>,
}

impl Persister {
    pub fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine, write_lock: Mutex::new(()), progress: DashMap::new() }
    }

    /// Conflict-ignore batch upsert keyed by `(run_id, persona_uuid,
    /// case_id, scale_order)` (P1). All rows in `rows` are inserted in
    /// one transaction. Retries the whole batch up to `MAX_RETRIES`
    /// times with exponential backoff on a retryable storage error.
    pub fn persist_results(&self, run_id: RunId, rows: &[BenchmarkResultRow]) -> PipelineResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let _guard = self.write_lock.lock().map_err(|_| {
            PipelineError::PersistFailed("persister write lock poisoned".to_string())
        })?;

        let mut backoff = INITIAL_BACKOFF;
        let mut last_err: Option<StorageError> = None;

        for attempt in 0..=MAX_RETRIES {
            match self.engine.with_writer(|conn| queries::benchmark_results::upsert_many(conn, rows)) {
                Ok(inserted) => {
                    self.progress.entry(run_id).and_modify(|(count, ts)| {
                        *count += inserted as u64;
                        *ts = Instant::now();
                    }).or_insert((inserted as u64, Instant::now()));
                    return Ok(inserted);
                }
                Err(e) if is_retryable(&e) && attempt < MAX_RETRIES => {
                    tracing::warn!(attempt, backoff_ms = backoff.as_millis() as u64, error = %e, "retrying persist_results batch");
                    thread::sleep(backoff);
                    backoff *= 2;
                    last_err = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(PipelineError::PersistFailed(
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "unknown storage error".to_string()),
        ))
    }

    pub fn persist_failure(&self, entry: &FailLogEntry) -> PipelineResult<()> {
        self.engine.with_writer(|conn| queries::fail_log::insert(conn, entry))?;
        Ok(())
    }

    /// In-memory accepted-row counter for `run_id`, independent of a
    /// `COUNT(*)` round-trip.
    pub fn progress_count(&self, run_id: RunId) -> u64 {
        self.progress.get(&run_id).map(|e| e.0).unwrap_or(0)
    }

    pub fn reset_progress_count(&self, run_id: RunId) {
        self.progress.remove(&run_id);
    }
}

/// Deadlock/serialization/timeout-shaped errors are retried; everything
/// else (schema corruption, constraint violations) is re-raised
/// immediately since retrying would never help.
fn is_retryable(err: &StorageError) -> bool {
    match err {
        StorageError::DbBusy => true,
        StorageError::SqliteError { message } => {
            let m = message.to_lowercase();
            m.contains("busy") || m.contains("locked") || m.contains("deadlock") || m.contains("timeout")
        }
        _ => false,
    }
}
