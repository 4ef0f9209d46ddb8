//! Dedicated writer thread with a bounded `crossbeam_channel`. Batches
//! fire-and-forget writes (cache entries) into single transactions.
//! Ported from `drift-storage::batch::writer`'s pattern,
//! trimmed to the handful of commands this harness's batch path needs
//! — result/failure persistence (C7) bypasses this writer entirely and
//! goes through `StorageEngine::with_writer` directly, since it needs
//! synchronous retry-with-backoff semantics per §4.7.

pub mod commands;

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use rusqlite::Connection;

use crate::errors::StorageError;
use crate::sqe;
use commands::BatchCommand;

const CHANNEL_BOUND: usize = 1024;
const BATCH_SIZE: usize = 500;
const FLUSH_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Default, Clone, Copy)]
pub struct WriteStats {
    pub cache_entry_rows: usize,
    pub deleted_cache_entries: usize,
    pub flushes: usize,
}

/// Accepts `BatchCommand`s via a channel and writes them in batched
/// transactions on a dedicated thread.
pub struct BatchWriter {
    tx: Sender<BatchCommand>,
    handle: Option<JoinHandle<Result<WriteStats, StorageError>>>,
}

impl BatchWriter {
    /// `conn` is moved to the writer thread; it must not be shared.
    pub fn new(conn: Connection) -> Self {
        let (tx, rx) = bounded(CHANNEL_BOUND);
        let handle = thread::Builder::new()
            .name("bench-batch-writer".to_string())
            .spawn(move || writer_loop(conn, rx))
            .expect("failed to spawn batch writer thread");
        Self { tx, handle: Some(handle) }
    }

    pub fn send(&self, cmd: BatchCommand) -> Result<(), StorageError> {
        self.tx.send(cmd).map_err(|_| StorageError::SqliteError {
            message: "batch writer channel disconnected".to_string(),
        })
    }

    /// Fire-and-forget flush; does not wait for completion.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.send(BatchCommand::Flush)
    }

    /// Flush and block until the writer thread confirms the buffered
    /// commands have committed.
    pub fn flush_sync(&self) -> Result<(), StorageError> {
        let (tx, rx) = std::sync::mpsc::sync_channel(0);
        self.send(BatchCommand::FlushSync(tx))?;
        rx.recv().map_err(|_| StorageError::SqliteError {
            message: "batch writer thread did not respond to flush_sync".to_string(),
        })
    }

    pub fn shutdown(mut self) -> Result<WriteStats, StorageError> {
        let _ = self.tx.send(BatchCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| StorageError::SqliteError {
                message: "batch writer thread panicked".to_string(),
            })?
        } else {
            Ok(WriteStats::default())
        }
    }
}

impl Drop for BatchWriter {
    fn drop(&mut self) {
        let _ = self.tx.send(BatchCommand::Shutdown);
    }
}

fn writer_loop(conn: Connection, rx: Receiver<BatchCommand>) -> Result<WriteStats, StorageError> {
    let mut buffer: Vec<BatchCommand> = Vec::with_capacity(BATCH_SIZE);
    let mut stats = WriteStats::default();

    loop {
        match rx.recv_timeout(FLUSH_TIMEOUT) {
            Ok(BatchCommand::Shutdown) => {
                flush_buffer(&conn, &mut buffer, &mut stats)?;
                break;
            }
            Ok(BatchCommand::Flush) => {
                flush_buffer(&conn, &mut buffer, &mut stats)?;
            }
            Ok(BatchCommand::FlushSync(done_tx)) => {
                flush_buffer(&conn, &mut buffer, &mut stats)?;
                let _ = done_tx.send(());
            }
            Ok(cmd) => {
                buffer.push(cmd);
                if buffer.len() >= BATCH_SIZE {
                    flush_buffer(&conn, &mut buffer, &mut stats)?;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !buffer.is_empty() {
                    flush_buffer(&conn, &mut buffer, &mut stats)?;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                flush_buffer(&conn, &mut buffer, &mut stats)?;
                break;
            }
        }
    }

    Ok(stats)
}

fn flush_buffer(
    conn: &Connection,
    buffer: &mut Vec<BatchCommand>,
    stats: &mut WriteStats,
) -> Result<(), StorageError> {
    if buffer.is_empty() {
        return Ok(());
    }

    let tx = conn.unchecked_transaction().map_err(sqe)?;
    let mut batch_stats = WriteStats::default();

    for cmd in buffer.iter() {
        match cmd {
            BatchCommand::UpsertCacheEntries(rows) => {
                crate::queries::cache_entries::upsert_many(&tx, rows)?;
                batch_stats.cache_entry_rows += rows.len();
            }
            BatchCommand::DeleteCacheEntries { run_id } => {
                let n = crate::queries::cache_entries::delete_for_run(&tx, *run_id)?;
                batch_stats.deleted_cache_entries += n;
            }
            BatchCommand::Flush | BatchCommand::FlushSync(_) | BatchCommand::Shutdown => {}
        }
    }

    tx.commit().map_err(sqe)?;

    stats.cache_entry_rows += batch_stats.cache_entry_rows;
    stats.deleted_cache_entries += batch_stats.deleted_cache_entries;
    stats.flushes += 1;
    buffer.clear();
    tracing::debug!(rows = batch_stats.cache_entry_rows, "batch flush committed");
    Ok(())
}
