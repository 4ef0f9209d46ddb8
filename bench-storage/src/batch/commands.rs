//! Commands accepted by the background batch writer. Used for
//! high-throughput, fire-and-forget writes (cache entries, task status
//! touches); result/failure persistence (C7) goes through
//! `StorageEngine::with_writer` directly since it needs synchronous
//! retry-with-backoff semantics per §4.7.

use std::sync::mpsc::SyncSender;

use bench_core::types::ids::RunId;

#[derive(Debug, Clone)]
pub struct CacheEntryRow {
    pub run_id: RunId,
    pub kind: String,
    pub key: String,
    pub payload_json: String,
}

pub enum BatchCommand {
    UpsertCacheEntries(Vec<CacheEntryRow>),
    DeleteCacheEntries { run_id: RunId },
    Flush,
    FlushSync(SyncSender<()>),
    Shutdown,
}
