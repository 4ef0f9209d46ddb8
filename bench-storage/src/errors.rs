use bench_core::errors::error_code;
use bench_core::BenchErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sqlite error: {message}")]
    SqliteError { message: String },

    #[error("migration v{version:03} failed: {message}")]
    MigrationFailed { version: u32, message: String },

    #[error("database busy")]
    DbBusy,

    #[error("database corrupt: {details}")]
    DbCorrupt { details: String },

    #[error("connection pool exhausted ({active} active)")]
    ConnectionPoolExhausted { active: usize },

    #[error("not supported: {operation} ({reason})")]
    NotSupported { operation: String, reason: String },
}

impl BenchErrorCode for StorageError {
    fn error_code(&self) -> &'static str {
        match self {
            StorageError::DbBusy => error_code::DB_BUSY,
            StorageError::DbCorrupt { .. } => error_code::DB_CORRUPT,
            StorageError::MigrationFailed { .. } => error_code::MIGRATION_FAILED,
            _ => error_code::STORAGE_ERROR,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
