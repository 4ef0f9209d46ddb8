//! In-process progress registry (C2).
//!
//! Generalizes `drift-core`'s `TelemetryCollector` (a single
//! `Arc<Mutex<Vec<_>>>` buffer) to a per-run concurrent map: every
//! benchmark run gets its own liveness/counter/cancellation entry, and
//! many runs can update concurrently without contending on one lock.
//! Ported from `backend/infrastructure/benchmark/progress_tracker.py`.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::types::ids::{DatasetId, PersonaUuid, RunId, TraitId};
use crate::types::scale::ScaleOrder;

const COUNT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
const TOTAL_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Cancelling,
    Done,
    Partial,
    Failed,
    Cancelled,
}

impl RunStatus {
    fn is_active(self) -> bool {
        matches!(self, RunStatus::Queued | RunStatus::Running | RunStatus::Cancelling)
    }
}

/// A snapshot-able progress entry. `last_count_update` / `last_total_update`
/// are `Instant`s so the 30s/60s throttling in `update_from_store` survives
/// process-local clock semantics without needing wall-clock parsing.
#[derive(Debug, Clone)]
pub struct ProgressEntry {
    pub status: RunStatus,
    pub done: u64,
    pub total: u64,
    pub pct: f64,
    pub cancel_requested: bool,
    last_count_update: Option<Instant>,
    last_total_update: Option<Instant>,
    cached_total: u64,
}

impl Default for ProgressEntry {
    fn default() -> Self {
        Self {
            status: RunStatus::Queued,
            done: 0,
            total: 0,
            pct: 0.0,
            cancel_requested: false,
            last_count_update: None,
            last_total_update: None,
            cached_total: 0,
        }
    }
}

/// Supplies the counts `update_from_store` needs, without coupling
/// `bench-core` to the storage crate (which itself depends on
/// `bench-core` for shared types).
pub trait ProgressCounts {
    /// `COUNT(DISTINCT persona_uuid, case_id, scale_order)` for the run.
    fn count_completed(&self, run_id: RunId) -> Result<u64, String>;
    /// Active trait count × personas in the dataset, plus the estimated
    /// `dual_fraction` extra on the `rev` side.
    fn count_total(&self, dataset_id: DatasetId, dual_fraction: f64) -> Result<u64, String>;
}

#[derive(Default)]
pub struct ProgressRegistry {
    entries: DashMap<RunId, ProgressEntry>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot copy of the current entry, or a fresh default if unseen.
    pub fn get(&self, run_id: RunId) -> ProgressEntry {
        self.entries.get(&run_id).map(|e| e.clone()).unwrap_or_default()
    }

    /// Shallow merge: only the fields the caller sets are touched.
    pub fn set_status(&self, run_id: RunId, status: RunStatus) {
        self.entries.entry(run_id).or_default().status = status;
    }

    pub fn set_cancel_requested(&self, run_id: RunId, requested: bool) {
        let mut entry = self.entries.entry(run_id).or_default();
        entry.cancel_requested = requested;
        if requested && entry.status.is_active() {
            entry.status = RunStatus::Cancelling;
        }
    }

    pub fn cancel_requested(&self, run_id: RunId) -> bool {
        self.entries.get(&run_id).map(|e| e.cancel_requested).unwrap_or(false)
    }

    pub fn clear(&self, run_id: RunId) {
        self.entries.remove(&run_id);
    }

    /// Refresh `done`/`total` from the store, throttled to once per
    /// 30s (`done`) and 60s (`total`) while the run is active — mirrors
    /// `progress_tracker.py::update_progress` exactly.
    pub fn update_from_store(
        &self,
        run_id: RunId,
        dataset_id: DatasetId,
        dual_fraction: f64,
        counts: &dyn ProgressCounts,
    ) {
        let mut entry = self.entries.entry(run_id).or_default();
        let now = Instant::now();

        let needs_count_update = entry
            .last_count_update
            .map(|t| now.duration_since(t) > COUNT_REFRESH_INTERVAL)
            .unwrap_or(true);

        if needs_count_update {
            if let Ok(done) = counts.count_completed(run_id) {
                entry.done = done;
            }
            entry.last_count_update = Some(now);
        }

        let total = if entry.status.is_active() {
            let needs_total_update = entry
                .last_total_update
                .map(|t| now.duration_since(t) > TOTAL_REFRESH_INTERVAL)
                .unwrap_or(true);

            if needs_total_update {
                let total = counts
                    .count_total(dataset_id, dual_fraction)
                    .unwrap_or(entry.cached_total)
                    .max(entry.done);
                entry.cached_total = total;
                entry.last_total_update = Some(now);
                total
            } else {
                entry.cached_total.max(entry.done)
            }
        } else {
            entry.total.max(entry.done)
        };

        entry.total = total;
        entry.pct = if total > 0 { 100.0 * entry.done as f64 / total as f64 } else { 0.0 };
    }

    /// Mark a triple as persisted by bumping the cached `done` counter
    /// without a store round-trip (cheap incremental update between the
    /// throttled `update_from_store` refreshes).
    pub fn record_completed(&self, run_id: RunId, count: u64) {
        let mut entry = self.entries.entry(run_id).or_default();
        entry.done += count;
        if entry.total > 0 {
            entry.pct = 100.0 * entry.done as f64 / entry.total as f64;
        }
    }
}

/// A `(persona_uuid, case_id, scale_order)` triple already persisted —
/// used by C9 to skip re-emitting completed work on resume.
pub type CompletedKey = (PersonaUuid, String, ScaleOrder);

/// Trait id is folded into `case_id` at the dispatcher boundary; kept
/// here only so call sites can build the key without importing
/// `bench-pipeline`.
pub fn case_id_for_trait(trait_id: TraitId) -> String {
    trait_id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeCounts {
        completed: u64,
        total: u64,
    }

    impl ProgressCounts for FakeCounts {
        fn count_completed(&self, _run_id: RunId) -> Result<u64, String> {
            Ok(self.completed)
        }
        fn count_total(&self, _dataset_id: DatasetId, _dual_fraction: f64) -> Result<u64, String> {
            Ok(self.total)
        }
    }

    #[test]
    fn fresh_run_defaults_to_queued() {
        let reg = ProgressRegistry::new();
        let entry = reg.get(RunId(1));
        assert_eq!(entry.status, RunStatus::Queued);
        assert_eq!(entry.done, 0);
    }

    #[test]
    fn update_from_store_computes_percent() {
        let reg = ProgressRegistry::new();
        reg.set_status(RunId(1), RunStatus::Running);
        let counts = FakeCounts { completed: 2, total: 8 };
        reg.update_from_store(RunId(1), DatasetId(1), 0.0, &counts);
        let entry = reg.get(RunId(1));
        assert_eq!(entry.done, 2);
        assert_eq!(entry.total, 8);
        assert!((entry.pct - 25.0).abs() < 1e-9);
    }

    #[test]
    fn cancel_requested_transitions_to_cancelling() {
        let reg = ProgressRegistry::new();
        reg.set_status(RunId(1), RunStatus::Running);
        reg.set_cancel_requested(RunId(1), true);
        assert_eq!(reg.get(RunId(1)).status, RunStatus::Cancelling);
        assert!(reg.cancel_requested(RunId(1)));
    }

    #[test]
    fn record_completed_increments_done_and_pct() {
        let reg = ProgressRegistry::new();
        reg.set_status(RunId(1), RunStatus::Running);
        let counts = FakeCounts { completed: 0, total: 4 };
        reg.update_from_store(RunId(1), DatasetId(1), 0.0, &counts);
        reg.record_completed(RunId(1), 2);
        let entry = reg.get(RunId(1));
        assert_eq!(entry.done, 2);
        assert!((entry.pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn clear_removes_entry() {
        let reg = ProgressRegistry::new();
        reg.set_status(RunId(1), RunStatus::Running);
        reg.clear(RunId(1));
        assert_eq!(reg.get(RunId(1)).status, RunStatus::Queued);
    }
}
