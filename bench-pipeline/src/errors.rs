use bench_core::errors::error_code;
use bench_core::BenchErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("storage error: {0}")]
    Storage(#[from] bench_storage::StorageError),

    #[error("run cancelled")]
    Cancelled,

    #[error("persister batch failed after retries: {0}")]
    PersistFailed(String),
}

impl BenchErrorCode for PipelineError {
    fn error_code(&self) -> &'static str {
        match self {
            PipelineError::Storage(e) => e.error_code(),
            PipelineError::Cancelled => error_code::CANCELLED,
            PipelineError::PersistFailed(_) => error_code::STORAGE_ERROR,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
