//! # bench-pipeline
//!
//! The run orchestration layer: the scale-order dispatcher (C9), the
//! pipeline engine wiring C9 → C5 → C4 → C6 → C7 (C8), and the
//! persister (C7) itself.

pub mod dispatcher;
pub mod engine;
pub mod errors;
pub mod persister;

pub use dispatcher::ScaleOrderDispatcher;
pub use engine::{PipelineEngine, RunParams};
pub use errors::{PipelineError, PipelineResult};
pub use persister::Persister;
