use bench_core::errors::error_code;
use bench_core::BenchErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("storage error: {0}")]
    Storage(#[from] bench_storage::StorageError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] bench_pipeline::PipelineError),

    #[error("gateway error: {0}")]
    Gateway(#[from] bench_gateway::GatewayError),

    #[error("task {task_id} not found")]
    TaskNotFound { task_id: bench_core::types::ids::TaskId },

    #[error("dependency {dependency_id} {dependency_status}")]
    DependencyFailed { dependency_id: bench_core::types::ids::TaskId, dependency_status: String },

    #[error("benchmark run {run_id} not found")]
    RunNotFound { run_id: bench_core::types::ids::RunId },

    #[error("dataset {dataset_id} not found")]
    DatasetNotFound { dataset_id: bench_core::types::ids::DatasetId },

    #[error("queue executor poisoned")]
    Poisoned,

    #[error("no executor registered for task_type {0:?}")]
    UnsupportedTaskType(String),

    #[error("malformed task config: {0}")]
    MalformedConfig(String),

    #[error("queue executor already initialized")]
    AlreadyInitialized,

    #[error("queue executor not initialized — call bench_queue::initialize() first")]
    NotInitialized,
}

impl BenchErrorCode for QueueError {
    fn error_code(&self) -> &'static str {
        match self {
            QueueError::Storage(e) => e.error_code(),
            QueueError::Pipeline(e) => e.error_code(),
            QueueError::Gateway(e) => e.error_code(),
            QueueError::DependencyFailed { .. } => error_code::DEPENDENCY_FAILED,
            QueueError::TaskNotFound { .. } | QueueError::RunNotFound { .. } | QueueError::DatasetNotFound { .. } => {
                error_code::QUEUE_ERROR
            }
            QueueError::Poisoned
            | QueueError::UnsupportedTaskType(_)
            | QueueError::MalformedConfig(_)
            | QueueError::AlreadyInitialized
            | QueueError::NotInitialized => error_code::QUEUE_ERROR,
        }
    }
}

pub type QueueResult<T> = Result<T, QueueError>;
