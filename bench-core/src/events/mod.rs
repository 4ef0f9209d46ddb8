//! Run lifecycle events. C10/C11 emit these; a host (CLI, HTTP API, test
//! harness) registers handlers with an `EventDispatcher` to observe
//! progress without polling the progress registry directly.

pub mod dispatcher;
pub mod handler;
pub mod types;
