//! # bench-queue
//!
//! The queue executor (C11) and benchmark executor (C10): the
//! process-wide singleton that drains the `task_queue` table with
//! dependency resolution and orphan recovery, dispatching `benchmark`
//! tasks to a pipeline run and any other registered `task_type` to a
//! sibling executor supplied by the host process.

pub mod benchmark_executor;
pub mod errors;
pub mod queue_executor;

pub use benchmark_executor::BenchmarkExecutor;
pub use errors::{QueueError, QueueResult};
pub use queue_executor::{get, initialize, is_initialized, QueueExecutor, TaskExecutor, TaskNotificationHook};
