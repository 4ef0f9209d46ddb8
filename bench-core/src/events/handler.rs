use super::types::{RunCompleteEvent, RunErrorEvent, RunProgressEvent, RunStartedEvent};

/// Observer of run lifecycle events. Default methods no-op so a handler
/// only needs to implement the callbacks it cares about.
pub trait RunEventHandler: Send + Sync {
    fn on_run_started(&self, _event: &RunStartedEvent) {}
    fn on_run_progress(&self, _event: &RunProgressEvent) {}
    fn on_run_complete(&self, _event: &RunCompleteEvent) {}
    fn on_run_error(&self, _event: &RunErrorEvent) {}
}

/// A handler that logs via `tracing` at the same granularity used
/// elsewhere in this workspace:
/// `info!` for start/complete, `debug!` for progress, `warn!` for errors.
pub struct TracingEventHandler;

impl RunEventHandler for TracingEventHandler {
    fn on_run_started(&self, event: &RunStartedEvent) {
        tracing::info!(run_id = %event.run_id, total = ?event.total, "run started");
    }

    fn on_run_progress(&self, event: &RunProgressEvent) {
        tracing::debug!(run_id = %event.run_id, done = event.done, total = event.total, "run progress");
    }

    fn on_run_complete(&self, event: &RunCompleteEvent) {
        tracing::info!(run_id = %event.run_id, status = event.status, duration_ms = event.duration_ms, "run complete");
    }

    fn on_run_error(&self, event: &RunErrorEvent) {
        tracing::warn!(run_id = %event.run_id, error = %event.message, "run error");
    }
}
