use bench_core::BenchErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("storage error: {0}")]
    Storage(#[from] bench_storage::StorageError),

    #[error("queue error: {0}")]
    Queue(#[from] bench_queue::QueueError),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("run {0} not found")]
    RunNotFound(bench_core::RunId),
}

impl BenchErrorCode for CliError {
    fn error_code(&self) -> &'static str {
        match self {
            CliError::Storage(e) => e.error_code(),
            CliError::Queue(e) => e.error_code(),
            CliError::Config(_) | CliError::Io(_) | CliError::RunNotFound(_) => {
                bench_core::errors::error_code::CLI_ERROR
            }
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;
