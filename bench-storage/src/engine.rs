//! `StorageEngine` — the single owner of both the write connection and
//! the read pool. Mirrors `DriftStorageEngine`: wraps a
//! `DatabaseManager`-shaped read/write split plus a `BatchWriter`, and
//! is the only thing in the workspace allowed to touch a raw
//! `&Connection` for database operations — everything else goes through
//! `with_reader` / `with_writer` or a `queries::*` function called from
//! inside one of those closures.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::Connection;

use crate::batch::commands::BatchCommand;
use crate::batch::BatchWriter;
use crate::connection::{open_connection, open_shared_memory_connection, ReadPool};
use crate::errors::StorageError;
use crate::migrations;
use crate::sqe;

pub struct StorageEngine {
    writer: Mutex<Connection>,
    read_pool: ReadPool,
    batch: BatchWriter,
    path: Option<PathBuf>,
    /// Keeps a shared-cache in-memory database alive for the engine's
    /// lifetime — SQLite drops a shared-cache `:memory:` database once
    /// its last connection closes. `None` for file-backed engines.
    _mem_keep_alive: Option<Connection>,
}

impl StorageEngine {
    /// Open a file-backed engine at `path`, running migrations and
    /// applying pragmas on every connection it opens.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let writer_conn = open_connection(path)?;
        migrations::run_migrations(&writer_conn)?;

        let read_pool = ReadPool::open_default(path)?;
        let batch_conn = open_connection(path)?;
        let batch = BatchWriter::new(batch_conn);

        Ok(Self {
            writer: Mutex::new(writer_conn),
            read_pool,
            batch,
            path: Some(path.to_path_buf()),
            _mem_keep_alive: None,
        })
    }

    /// In-memory engine for tests: a named, shared-cache database so the
    /// writer, read pool and batch writer all observe the same data
    /// (unlike plain `:memory:`, which is private per connection).
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let uri = format!("file:bench-mem-{}?mode=memory&cache=shared", uuid::Uuid::new_v4());

        let keep_alive = open_shared_memory_connection(&uri)?;
        let writer_conn = open_shared_memory_connection(&uri)?;
        migrations::run_migrations(&writer_conn)?;

        let read_pool = ReadPool::open_shared_memory(&uri, 4)?;
        let batch_conn = open_shared_memory_connection(&uri)?;
        let batch = BatchWriter::new(batch_conn);

        Ok(Self {
            writer: Mutex::new(writer_conn),
            read_pool,
            batch,
            path: None,
            _mem_keep_alive: Some(keep_alive),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Raw read access. Reads are unsynchronized per the concurrency
    /// model (§5) — many readers may call this concurrently.
    pub fn with_reader<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        self.read_pool.with_read(f)
    }

    /// Raw write access, serialized by a process-wide mutex (§5: "Writes
    /// to results are serialized by a process-wide mutex in C7" —
    /// generalized here to every write path since task status and cache
    /// writes share the same single writer connection).
    pub fn with_writer<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        let guard = self.writer.lock().map_err(|_| StorageError::SqliteError {
            message: "writer mutex poisoned".to_string(),
        })?;
        f(&guard)
    }

    pub fn send_batch(&self, command: BatchCommand) -> Result<(), StorageError> {
        self.batch.send(command)
    }

    pub fn flush_batch(&self) -> Result<(), StorageError> {
        self.batch.flush()
    }

    pub fn flush_batch_sync(&self) -> Result<(), StorageError> {
        self.batch.flush_sync()
    }

    pub fn checkpoint(&self) -> Result<(), StorageError> {
        self.with_writer(|conn| {
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);").map_err(sqe)
        })
    }
}
