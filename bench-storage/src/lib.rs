//! # bench-storage
//!
//! SQLite persistence layer for the bias-benchmark harness (C1).
//! WAL mode, write-serialized + read-pooled, batch writer, keyset
//! pagination, schema migrations.

pub mod batch;
pub mod connection;
pub mod engine;
pub mod errors;
pub mod migrations;
pub mod queries;

pub use engine::StorageEngine;
pub use errors::StorageError;

/// Helper to wrap a rusqlite error as a `StorageError`.
pub(crate) fn sqe(e: rusqlite::Error) -> StorageError {
    StorageError::SqliteError { message: e.to_string() }
}
