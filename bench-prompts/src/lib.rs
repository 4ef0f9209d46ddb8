//! # bench-prompts
//!
//! The prompt factory (C5) and post-processor (C6): renders a
//! deterministic `PromptSpec` from a `WorkItem`, and parses an
//! `LlmResult` back into a rating or a failure classification.
//! Also carries the optional prompt/response side-channel log (§6.4/§6.8).

pub mod labels;
pub mod log;
pub mod postprocess;
pub mod render;

pub use log::PromptResponseLog;
pub use postprocess::{FailureKind, PostProcessOutcome, Postprocessor};
pub use render::{PromptFactory, TEMPLATE_VERSION};
