//! # bench-core
//!
//! Foundation crate for the bias-benchmark harness.
//! Defines shared types, config, errors, events, the progress registry and
//! the result cache. Every other crate in the workspace depends on this.

pub mod cache;
pub mod config;
pub mod errors;
pub mod events;
pub mod progress;
pub mod types;

pub use config::BenchConfig;
pub use errors::error_code::BenchErrorCode;
pub use events::dispatcher::EventDispatcher;
pub use events::handler::RunEventHandler;
pub use progress::{ProgressEntry, ProgressRegistry, RunStatus};
pub use types::ids::{DatasetId, ModelId, PersonaUuid, RunId, TaskId, TraitId};
pub use types::scale::ScaleOrder;
pub use types::work_item::{LlmResult, PromptSpec, WorkItem, WorkItemKey};
