//! The queue executor (C11): the process-wide singleton that serializes
//! task dispatch against the `task_queue` table. Mirrors
//! `bench_storage::batch`'s `BatchWriter` — a dedicated thread fed by a
//! small control channel — but polls the store on a timer rather than
//! draining a work channel, since the unit of work here lives in the
//! database, not in memory.
//!
//! Singleton wiring follows `drift-napi::runtime`'s `DriftRuntime`: a
//! `OnceLock<Arc<_>>` set once by `initialize()` and read lock-free by
//! `get()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use dashmap::DashMap;
use serde::Deserialize;

use bench_core::config::{GatewayConfig, RunConfig};
use bench_core::progress::ProgressRegistry;
use bench_core::types::ids::{ModelId, RunId, TaskId};
use bench_core::types::rows::{TaskRow, TaskStatus};
use bench_core::EventDispatcher;
use bench_prompts::PromptResponseLog;
use bench_storage::{queries, StorageEngine};

use crate::benchmark_executor::BenchmarkExecutor;
use crate::errors::{QueueError, QueueResult};

/// How often the loop checks the queue for a newly-eligible task when
/// nothing was ready on the previous tick. Bounded so pause/stop are
/// responsive, per §5 ("the queue poll interval is bounded so shutdown
/// is responsive").
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A non-benchmark task handler, registered by the host process for
/// task types this core treats as external collaborators (§1): attrgen,
/// dataset-build, and similar. `config` is the task's opaque JSON blob.
pub trait TaskExecutor: Send + Sync {
    fn execute(&self, task_id: TaskId, config: &serde_json::Value) -> QueueResult<Option<RunId>>;
}

/// Observes task-level terminal transitions — the "notification hook"
/// of §4.11. Distinct from `RunEventHandler` (C2/C8 progress events),
/// which fires at finer grain inside a single run.
pub trait TaskNotificationHook: Send + Sync {
    fn on_task_completed(&self, _task_id: TaskId, _result_run_id: Option<RunId>) {}
    fn on_task_failed(&self, _task_id: TaskId, _error: &str) {}
    fn on_task_cancelled(&self, _task_id: TaskId, _reason: &str) {}
}

pub struct TracingNotificationHook;

impl TaskNotificationHook for TracingNotificationHook {
    fn on_task_completed(&self, task_id: TaskId, result_run_id: Option<RunId>) {
        tracing::info!(%task_id, ?result_run_id, "task completed");
    }
    fn on_task_failed(&self, task_id: TaskId, error: &str) {
        tracing::error!(%task_id, error, "task failed");
    }
    fn on_task_cancelled(&self, task_id: TaskId, reason: &str) {
        tracing::info!(%task_id, reason, "task cancelled");
    }
}

enum ControlMsg {
    Pause,
    Resume,
    Stop,
}

enum DependencyState {
    Ready,
    Deferred,
    CascadeCancelled,
}

/// The JSON shape of a `benchmark` task's `config` column: a required
/// `model_id` (there is no `models` table in this core — the model
/// registry is an external collaborator) plus every field §6.5
/// enumerates for a run, flattened in directly.
#[derive(Debug, Deserialize)]
struct BenchmarkTaskConfig {
    model_id: i64,
    #[serde(flatten)]
    run: RunConfig,
}

static EXECUTOR: OnceLock<Arc<QueueExecutor>> = OnceLock::new();

/// Initializes the global singleton. Returns `AlreadyInitialized` if
/// called twice in one process — matching `DriftRuntime::initialize`'s
/// contract.
pub fn initialize(
    storage: Arc<StorageEngine>,
    progress: Arc<ProgressRegistry>,
    events: Arc<EventDispatcher>,
    prompt_log: Arc<PromptResponseLog>,
    gateway: GatewayConfig,
) -> QueueResult<Arc<QueueExecutor>> {
    let executor = Arc::new(QueueExecutor::new(storage, progress, events, prompt_log, gateway));
    EXECUTOR.set(Arc::clone(&executor)).map_err(|_| QueueError::AlreadyInitialized)?;
    Ok(executor)
}

/// Lock-free access to the singleton after `initialize()`.
pub fn get() -> QueueResult<Arc<QueueExecutor>> {
    EXECUTOR.get().cloned().ok_or(QueueError::NotInitialized)
}

pub fn is_initialized() -> bool {
    EXECUTOR.get().is_some()
}

pub struct QueueExecutor {
    storage: Arc<StorageEngine>,
    benchmark_executor: BenchmarkExecutor,
    extra_executors: DashMap<String, Arc<dyn TaskExecutor>>,
    hooks: Mutex<Vec<Arc<dyn TaskNotificationHook>>>,
    control_tx: Mutex<Option<Sender<ControlMsg>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    paused: AtomicBool,
}

impl QueueExecutor {
    pub fn new(
        storage: Arc<StorageEngine>,
        progress: Arc<ProgressRegistry>,
        events: Arc<EventDispatcher>,
        prompt_log: Arc<PromptResponseLog>,
        gateway: GatewayConfig,
    ) -> Self {
        Self {
            storage: storage.clone(),
            benchmark_executor: BenchmarkExecutor::new(storage, progress, events, prompt_log, gateway),
            extra_executors: DashMap::new(),
            hooks: Mutex::new(vec![Arc::new(TracingNotificationHook)]),
            control_tx: Mutex::new(None),
            handle: Mutex::new(None),
            paused: AtomicBool::new(false),
        }
    }

    /// Registers the handler for a non-benchmark `task_type`. Sibling
    /// executors (attrgen, dataset-build, …) are out of this core's
    /// scope (§1) — the host process wires them in here.
    pub fn register_executor(&self, task_type: impl Into<String>, executor: Arc<dyn TaskExecutor>) {
        self.extra_executors.insert(task_type.into(), executor);
    }

    pub fn register_hook(&self, hook: Arc<dyn TaskNotificationHook>) {
        self.hooks.lock().expect("hooks mutex poisoned").push(hook);
    }

    /// Non-blocking: writes the row and returns. The worker loop picks
    /// it up on its next tick (§6.1, §4.11 "Submissions are
    /// non-blocking and only write to the store").
    pub fn submit_task(
        &self,
        task_type: &str,
        label: Option<&str>,
        config: &serde_json::Value,
        depends_on: Option<TaskId>,
        position: i64,
    ) -> QueueResult<TaskId> {
        Ok(self
            .storage
            .with_writer(|conn| queries::task_queue::insert(conn, task_type, label, config, depends_on, position))?)
    }

    /// Orphan recovery, then spawns the worker thread. Idempotent: a
    /// second call while already running is a no-op.
    pub fn start(self: &Arc<Self>) -> QueueResult<()> {
        let mut handle_guard = self.handle.lock().map_err(|_| QueueError::Poisoned)?;
        if handle_guard.is_some() {
            return Ok(());
        }

        let reset = self.storage.with_writer(|conn| queries::task_queue::reset_orphaned_running(conn))?;
        if reset > 0 {
            tracing::warn!(count = reset, "recovered orphaned running tasks at startup");
        }

        let (tx, rx) = bounded(16);
        *self.control_tx.lock().map_err(|_| QueueError::Poisoned)? = Some(tx);
        self.paused.store(false, Ordering::SeqCst);

        let this = Arc::clone(self);
        let join = thread::Builder::new()
            .name("bench-queue-executor".to_string())
            .spawn(move || this.run_loop(rx))
            .expect("failed to spawn queue executor thread");
        *handle_guard = Some(join);
        Ok(())
    }

    /// Stops picking new tasks; any in-flight task is not interrupted
    /// (§4.11 "Pause/resume").
    pub fn pause(&self) -> QueueResult<()> {
        self.send_control(ControlMsg::Pause)
    }

    pub fn resume(&self) -> QueueResult<()> {
        self.send_control(ControlMsg::Resume)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Cooperative shutdown: signals the loop to stop picking new work
    /// and blocks until the in-flight tick (if any) returns. A task
    /// left `running` is recovered by the next `start()`'s orphan sweep.
    /// Any host (CLI, HTTP API, test harness) can call this directly —
    /// it does not depend on a CLI-level signal handler.
    pub fn request_stop(&self) -> QueueResult<()> {
        self.send_control(ControlMsg::Stop)?;
        let handle = self.handle.lock().map_err(|_| QueueError::Poisoned)?.take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        *self.control_tx.lock().map_err(|_| QueueError::Poisoned)? = None;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().map(|h| h.is_some()).unwrap_or(false)
    }

    fn send_control(&self, msg: ControlMsg) -> QueueResult<()> {
        let guard = self.control_tx.lock().map_err(|_| QueueError::Poisoned)?;
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(msg);
        }
        Ok(())
    }

    fn run_loop(&self, rx: Receiver<ControlMsg>) {
        loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(ControlMsg::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(ControlMsg::Pause) => {
                    self.paused.store(true, Ordering::SeqCst);
                    continue;
                }
                Ok(ControlMsg::Resume) => {
                    self.paused.store(false, Ordering::SeqCst);
                    continue;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }

            if self.paused.load(Ordering::SeqCst) {
                continue;
            }

            if let Err(e) = self.pick_and_run() {
                tracing::error!(error = %e, "queue executor tick failed");
            }
        }
    }

    /// Picks the first eligible queued task (FIFO by `created_at`,
    /// cascade-cancelling any whose dependency already terminated
    /// unsuccessfully along the way) and runs it to completion.
    /// Returns whether a task was dispatched this tick.
    fn pick_and_run(&self) -> QueueResult<bool> {
        let queued = self.storage.with_reader(|conn| queries::task_queue::list_queued(conn))?;
        for task in queued {
            match self.resolve_dependency(&task)? {
                DependencyState::Ready => {
                    self.run_task(task)?;
                    return Ok(true);
                }
                DependencyState::Deferred | DependencyState::CascadeCancelled => continue,
            }
        }
        Ok(false)
    }

    fn resolve_dependency(&self, task: &TaskRow) -> QueueResult<DependencyState> {
        let Some(dep_id) = task.depends_on else {
            return Ok(DependencyState::Ready);
        };
        let dep = self
            .storage
            .with_reader(|conn| queries::task_queue::get(conn, dep_id))?
            .ok_or(QueueError::TaskNotFound { task_id: dep_id })?;

        match dep.status {
            TaskStatus::Completed => Ok(DependencyState::Ready),
            TaskStatus::Failed | TaskStatus::Cancelled => {
                self.cascade_cancel(task.task_id, &format!("dependency {}", dep.status.as_str()))?;
                Ok(DependencyState::CascadeCancelled)
            }
            TaskStatus::Queued | TaskStatus::Running => Ok(DependencyState::Deferred),
        }
    }

    /// Cancels `task_id` with `reason`, then recurses into any queued
    /// task that depends on it (§4.11 "its own dependents
    /// cascade-cancelled"). Already-terminal dependents are untouched.
    fn cascade_cancel(&self, task_id: TaskId, reason: &str) -> QueueResult<()> {
        self.storage.with_writer(|conn| queries::task_queue::mark_cancelled(conn, task_id, reason))?;
        for hook in self.hooks.lock().map_err(|_| QueueError::Poisoned)?.iter() {
            hook.on_task_cancelled(task_id, reason);
        }

        let dependents = self.storage.with_reader(|conn| queries::task_queue::list_dependents(conn, task_id))?;
        for dep in dependents {
            if dep.status == TaskStatus::Queued {
                self.cascade_cancel(dep.task_id, "dependency cancelled")?;
            }
        }
        Ok(())
    }

    fn run_task(&self, task: TaskRow) -> QueueResult<()> {
        let task_id = task.task_id;
        self.storage.with_writer(|conn| queries::task_queue::mark_running(conn, task_id))?;
        tracing::info!(%task_id, task_type = %task.task_type, "task dispatched");
        let started = Instant::now();

        match self.dispatch(&task) {
            Ok(result_run_id) => {
                self.storage.with_writer(|conn| queries::task_queue::mark_completed(conn, task_id, result_run_id))?;
                tracing::info!(%task_id, elapsed_ms = started.elapsed().as_millis() as u64, "task completed");
                for hook in self.hooks.lock().map_err(|_| QueueError::Poisoned)?.iter() {
                    hook.on_task_completed(task_id, result_run_id);
                }
            }
            Err(e) => {
                let message = e.to_string();
                self.storage.with_writer(|conn| queries::task_queue::mark_failed(conn, task_id, &message))?;
                tracing::error!(%task_id, error = %message, "task failed");
                for hook in self.hooks.lock().map_err(|_| QueueError::Poisoned)?.iter() {
                    hook.on_task_failed(task_id, &message);
                }
            }
        }
        Ok(())
    }

    fn dispatch(&self, task: &TaskRow) -> QueueResult<Option<RunId>> {
        match task.task_type.as_str() {
            "benchmark" => self.run_benchmark_task(task),
            other => {
                let executor = self
                    .extra_executors
                    .get(other)
                    .map(|e| Arc::clone(e.value()))
                    .ok_or_else(|| QueueError::UnsupportedTaskType(other.to_string()))?;
                executor.execute(task.task_id, &task.config)
            }
        }
    }

    fn run_benchmark_task(&self, task: &TaskRow) -> QueueResult<Option<RunId>> {
        let parsed: BenchmarkTaskConfig =
            serde_json::from_value(task.config.clone()).map_err(|e| QueueError::MalformedConfig(e.to_string()))?;

        let dataset_id = parsed
            .run
            .dataset_id
            .ok_or_else(|| QueueError::MalformedConfig("benchmark task config missing dataset_id".to_string()))?;
        let model_id = ModelId(parsed.model_id);

        let run_id = self.storage.with_writer(|conn| {
            queries::benchmark_runs::insert(
                conn,
                dataset_id,
                model_id,
                parsed.run.effective_batch_size(),
                parsed.run.effective_max_attempts(),
                parsed.run.effective_include_rationale(),
                parsed.run.system_prompt.as_deref(),
                parsed.run.effective_scale_mode(),
                parsed.run.effective_dual_fraction(),
            )
        })?;

        let status = self.benchmark_executor.execute(run_id, &parsed.run)?;
        tracing::info!(task_id = %task.task_id, run_id = %run_id, ?status, "benchmark task finished");
        Ok(Some(run_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bench_core::types::scale::ScaleMode;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    fn new_executor() -> (Arc<QueueExecutor>, Arc<StorageEngine>) {
        let storage = Arc::new(StorageEngine::open_in_memory().unwrap());
        let executor = Arc::new(QueueExecutor::new(
            storage.clone(),
            Arc::new(ProgressRegistry::new()),
            Arc::new(EventDispatcher::new()),
            Arc::new(PromptResponseLog::disabled()),
            GatewayConfig::default(),
        ));
        (executor, storage)
    }

    fn seed_dataset(storage: &StorageEngine) -> bench_core::types::ids::DatasetId {
        storage
            .with_writer(|conn| {
                let dataset_id = queries::datasets::insert(conn, "d", "pool", &serde_json::json!({}))?;
                queries::personas::insert(conn, "p1", &Default::default())?;
                queries::datasets::add_persona(conn, dataset_id, "p1")?;
                queries::traits::insert(
                    conn,
                    &bench_core::types::rows::TraitRow {
                        trait_id: bench_core::types::ids::TraitId(0),
                        adjective: "freundlich".to_string(),
                        case_template: None,
                        category: None,
                        valence: None,
                        is_active: true,
                    },
                )?;
                Ok(dataset_id)
            })
            .unwrap()
    }

    fn benchmark_config(dataset_id: bench_core::types::ids::DatasetId) -> serde_json::Value {
        serde_json::json!({
            "model_id": 1,
            "dataset_id": dataset_id.0,
            "model_name": "test-model",
            "llm_backend": "fake",
            "max_attempts": 1,
            "scale_mode": "in",
        })
    }

    #[test]
    fn orphaned_running_task_is_reset_on_start() {
        let (executor, storage) = new_executor();
        let dataset_id = seed_dataset(&storage);
        let task_id = storage
            .with_writer(|conn| {
                queries::task_queue::insert(conn, "benchmark", None, &benchmark_config(dataset_id), None, 0)
            })
            .unwrap();
        storage.with_writer(|conn| queries::task_queue::mark_running(conn, task_id)).unwrap();

        executor.start().unwrap();
        thread::sleep(StdDuration::from_millis(50));
        executor.request_stop().unwrap();

        let row = storage.with_reader(|conn| queries::task_queue::get(conn, task_id)).unwrap().unwrap();
        // Either reset-then-rerun landed it on `completed`, or the
        // fast-poll window caught it mid-flight as `running` — but it
        // must never still read `running` once the loop has stopped
        // (P7): the orphan sweep always fires before the first tick.
        assert_ne!(row.status, TaskStatus::Running);
    }

    #[test]
    fn dependent_of_failed_task_cascades_to_cancelled() {
        let (executor, storage) = new_executor();
        let dataset_id = seed_dataset(&storage);

        let bad_config = serde_json::json!({ "model_id": 1, "dataset_id": dataset_id.0 + 1000 });
        let parent = storage
            .with_writer(|conn| queries::task_queue::insert(conn, "benchmark", None, &bad_config, None, 0))
            .unwrap();
        let child = storage
            .with_writer(|conn| {
                queries::task_queue::insert(conn, "benchmark", None, &benchmark_config(dataset_id), Some(parent), 1)
            })
            .unwrap();

        executor.start().unwrap();
        thread::sleep(StdDuration::from_millis(300));
        executor.request_stop().unwrap();

        let parent_row = storage.with_reader(|conn| queries::task_queue::get(conn, parent)).unwrap().unwrap();
        assert_eq!(parent_row.status, TaskStatus::Failed);

        let child_row = storage.with_reader(|conn| queries::task_queue::get(conn, child)).unwrap().unwrap();
        assert_eq!(child_row.status, TaskStatus::Cancelled);
        assert_eq!(child_row.error.as_deref(), Some("dependency failed"));
    }

    #[test]
    fn simple_benchmark_task_runs_to_completion() {
        let (executor, storage) = new_executor();
        let dataset_id = seed_dataset(&storage);
        let task_id = storage
            .with_writer(|conn| {
                queries::task_queue::insert(conn, "benchmark", None, &benchmark_config(dataset_id), None, 0)
            })
            .unwrap();

        executor.start().unwrap();
        thread::sleep(StdDuration::from_millis(300));
        executor.request_stop().unwrap();

        let row = storage.with_reader(|conn| queries::task_queue::get(conn, task_id)).unwrap().unwrap();
        assert_eq!(row.status, TaskStatus::Completed);
        assert!(row.result_run_id.is_some());
    }

    #[test]
    fn unregistered_task_type_fails_the_task() {
        let (executor, storage) = new_executor();
        let task_id = storage
            .with_writer(|conn| queries::task_queue::insert(conn, "attrgen", None, &serde_json::json!({}), None, 0))
            .unwrap();

        executor.start().unwrap();
        thread::sleep(StdDuration::from_millis(300));
        executor.request_stop().unwrap();

        let row = storage.with_reader(|conn| queries::task_queue::get(conn, task_id)).unwrap().unwrap();
        assert_eq!(row.status, TaskStatus::Failed);
        assert!(row.error.as_deref().unwrap_or("").contains("attrgen"));
    }

    #[test]
    fn registered_sibling_executor_is_dispatched() {
        let (executor, storage) = new_executor();

        struct CountingExecutor(Arc<AtomicUsize>);
        impl TaskExecutor for CountingExecutor {
            fn execute(&self, _task_id: TaskId, _config: &serde_json::Value) -> QueueResult<Option<RunId>> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        }
        let calls = Arc::new(AtomicUsize::new(0));
        executor.register_executor("attrgen", Arc::new(CountingExecutor(calls.clone())));

        let task_id = storage
            .with_writer(|conn| queries::task_queue::insert(conn, "attrgen", None, &serde_json::json!({}), None, 0))
            .unwrap();

        executor.start().unwrap();
        thread::sleep(StdDuration::from_millis(300));
        executor.request_stop().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let row = storage.with_reader(|conn| queries::task_queue::get(conn, task_id)).unwrap().unwrap();
        assert_eq!(row.status, TaskStatus::Completed);
    }

    #[test]
    fn pause_stops_new_dispatch() {
        let (executor, storage) = new_executor();
        executor.start().unwrap();
        executor.pause().unwrap();
        thread::sleep(StdDuration::from_millis(100));
        assert!(executor.is_paused());

        let task_id = storage
            .with_writer(|conn| queries::task_queue::insert(conn, "attrgen", None, &serde_json::json!({}), None, 0))
            .unwrap();
        thread::sleep(StdDuration::from_millis(200));

        let row = storage.with_reader(|conn| queries::task_queue::get(conn, task_id)).unwrap().unwrap();
        assert_eq!(row.status, TaskStatus::Queued);

        executor.resume().unwrap();
        thread::sleep(StdDuration::from_millis(300));
        executor.request_stop().unwrap();

        let row = storage.with_reader(|conn| queries::task_queue::get(conn, task_id)).unwrap().unwrap();
        assert_eq!(row.status, TaskStatus::Failed);
    }
}
