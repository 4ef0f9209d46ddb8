use bench_core::errors::error_code;
use bench_core::BenchErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no reachable vLLM endpoint for model {model}: tried {candidates:?} ({detail})")]
    Unreachable { model: String, candidates: Vec<String>, detail: String },

    #[error("invalid base url: {0}")]
    InvalidUrl(String),

    #[error("gateway worker pool panicked")]
    WorkerPanicked,
}

impl BenchErrorCode for GatewayError {
    fn error_code(&self) -> &'static str {
        match self {
            GatewayError::Unreachable { .. } => error_code::GATEWAY_UNREACHABLE,
            _ => error_code::TRANSPORT_ERROR,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
