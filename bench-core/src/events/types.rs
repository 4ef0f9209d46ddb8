use crate::types::ids::RunId;

#[derive(Debug, Clone)]
pub struct RunStartedEvent {
    pub run_id: RunId,
    pub total: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct RunProgressEvent {
    pub run_id: RunId,
    pub done: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct RunCompleteEvent {
    pub run_id: RunId,
    pub status: &'static str,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct RunErrorEvent {
    pub run_id: RunId,
    pub message: String,
}
