use super::handler::RunEventHandler;
use super::types::{RunCompleteEvent, RunErrorEvent, RunProgressEvent, RunStartedEvent};

/// Fans a single event out to every registered handler. A handler that
/// panics is not caught here — handlers are expected to be infallible
/// observers, matching `drift-core`'s event-handler contract.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Box<dyn RunEventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register(&mut self, handler: Box<dyn RunEventHandler>) {
        self.handlers.push(handler);
    }

    pub fn on_run_started(&self, event: &RunStartedEvent) {
        for h in &self.handlers {
            h.on_run_started(event);
        }
    }

    pub fn on_run_progress(&self, event: &RunProgressEvent) {
        for h in &self.handlers {
            h.on_run_progress(event);
        }
    }

    pub fn on_run_complete(&self, event: &RunCompleteEvent) {
        for h in &self.handlers {
            h.on_run_complete(event);
        }
    }

    pub fn on_run_error(&self, event: &RunErrorEvent) {
        for h in &self.handlers {
            h.on_run_error(event);
        }
    }
}
