//! Connection management: one dedicated writer connection (owned by the
//! batch writer thread) plus a small pool of read-only connections.
//! WAL mode lets readers and the single writer proceed without blocking
//! each other. Ported from the "write-serialized + read-pooled"
//! `DatabaseManager` design (referenced by `drift-storage::engine` but
//! authored here from that usage, since the file itself was not part of
//! the retrieved pack).

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rusqlite::Connection;

use crate::errors::StorageError;
use crate::sqe;

const READ_POOL_SIZE: usize = 4;
const BUSY_TIMEOUT_MS: u32 = 5_000;

pub fn open_connection(path: &Path) -> Result<Connection, StorageError> {
    let conn = Connection::open(path).map_err(sqe)?;
    configure(&conn)?;
    Ok(conn)
}

pub fn open_memory_connection() -> Result<Connection, StorageError> {
    let conn = Connection::open_in_memory().map_err(sqe)?;
    configure(&conn)?;
    Ok(conn)
}

/// Opens a connection to a named, shared-cache in-memory database, so
/// multiple connections (writer, read pool, batch writer) observe the
/// same data — unlike plain `:memory:`, which is private per connection.
pub fn open_shared_memory_connection(uri: &str) -> Result<Connection, StorageError> {
    let conn = Connection::open(uri).map_err(sqe)?;
    configure(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<(), StorageError> {
    conn.pragma_update(None, "journal_mode", "WAL").map_err(sqe)?;
    conn.pragma_update(None, "synchronous", "NORMAL").map_err(sqe)?;
    conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS).map_err(sqe)?;
    conn.pragma_update(None, "foreign_keys", "ON").map_err(sqe)?;
    Ok(())
}

/// Round-robin pool of read-only connections. Reads are unsynchronized
/// per the concurrency model (§5): many readers, no cross-reader lock.
pub struct ReadPool {
    conns: Vec<Mutex<Connection>>,
    next: AtomicUsize,
}

impl ReadPool {
    pub fn open(path: &Path, size: usize) -> Result<Self, StorageError> {
        let size = size.max(1);
        let mut conns = Vec::with_capacity(size);
        for _ in 0..size {
            conns.push(Mutex::new(open_connection(path)?));
        }
        Ok(Self { conns, next: AtomicUsize::new(0) })
    }

    pub fn open_default(path: &Path) -> Result<Self, StorageError> {
        Self::open(path, READ_POOL_SIZE)
    }

    pub fn open_shared_memory(uri: &str, size: usize) -> Result<Self, StorageError> {
        let size = size.max(1);
        let mut conns = Vec::with_capacity(size);
        for _ in 0..size {
            conns.push(Mutex::new(open_shared_memory_connection(uri)?));
        }
        Ok(Self { conns, next: AtomicUsize::new(0) })
    }

    /// Borrow a connection for the duration of `f`. Contention only
    /// occurs if concurrent readers outnumber the pool size.
    pub fn with_read<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.conns.len();
        let guard = self.conns[idx].lock().map_err(|_| StorageError::SqliteError {
            message: "read pool mutex poisoned".to_string(),
        })?;
        f(&guard)
    }
}
