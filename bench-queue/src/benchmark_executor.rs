//! The benchmark executor (C10): loads a `benchmark_runs` row, resolves
//! its dataset, selects the LLM backend, discovers a base URL when
//! talking to a real vLLM server, and drives the pipeline engine (C8)
//! over the scale-order dispatcher (C9). A progress-poller thread keeps
//! C2's `done`/`total` fresh for any external reader (CLI, API) polling
//! mid-run, independent of the engine's own throttled updates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bench_core::config::{GatewayConfig, RunConfig};
use bench_core::progress::RunStatus;
use bench_core::types::ids::RunId;
use bench_core::types::rows::BenchmarkRunRow;
use bench_core::{EventDispatcher, ProgressRegistry};
use bench_gateway::{discovery, FakeGateway, GatewayRuntime, LlmGateway, VllmGateway};
use bench_pipeline::{PipelineEngine, RunParams};
use bench_prompts::{PromptFactory, PromptResponseLog};
use bench_storage::{queries, StorageEngine};

use crate::errors::{QueueError, QueueResult};

const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct BenchmarkExecutor {
    storage: Arc<StorageEngine>,
    progress: Arc<ProgressRegistry>,
    events: Arc<EventDispatcher>,
    prompt_log: Arc<PromptResponseLog>,
    gateway_defaults: GatewayConfig,
}

impl BenchmarkExecutor {
    pub fn new(
        storage: Arc<StorageEngine>,
        progress: Arc<ProgressRegistry>,
        events: Arc<EventDispatcher>,
        prompt_log: Arc<PromptResponseLog>,
        gateway_defaults: GatewayConfig,
    ) -> Self {
        Self { storage, progress, events, prompt_log, gateway_defaults }
    }

    /// Runs `run_id` to a terminal status and returns it. `run_config`
    /// carries the fields a `benchmark_runs` row doesn't itself store
    /// (`model_name`, `llm_backend`, gateway overrides) — the task
    /// queue's `config` blob for a `benchmark` task.
    pub fn execute(&self, run_id: RunId, run_config: &RunConfig) -> QueueResult<RunStatus> {
        let run: BenchmarkRunRow = self
            .storage
            .with_reader(|conn| queries::benchmark_runs::get(conn, run_id))?
            .ok_or(QueueError::RunNotFound { run_id })?;

        let dataset = self
            .storage
            .with_reader(|conn| queries::datasets::get(conn, run.dataset_id))?
            .ok_or(QueueError::DatasetNotFound { dataset_id: run.dataset_id })?;

        let model_name = run_config.model_name.clone().unwrap_or_else(|| run.model_id.to_string());
        tracing::info!(%run_id, dataset = %dataset.name, model = %model_name, "benchmark run starting");

        self.storage.with_writer(|conn| queries::benchmark_runs::set_status(conn, run_id, "running"))?;
        self.progress.set_status(run_id, RunStatus::Running);

        let gateway = self.build_gateway(run_config, &model_name)?;

        let prompts = PromptFactory::new(
            run.include_rationale,
            run_config.max_new_tokens.unwrap_or(256),
            run.system_prompt.clone(),
        );

        let persister = Arc::new(bench_pipeline::Persister::new(self.storage.clone()));
        let engine = PipelineEngine::new(
            self.storage.clone(),
            gateway,
            prompts,
            persister,
            self.progress.clone(),
            self.prompt_log.clone(),
            self.events.clone(),
        );

        let stop_poller = Arc::new(AtomicBool::new(false));
        let poller = self.spawn_poller(run_id, run.dataset_id, run.dual_fraction, stop_poller.clone());

        let result = engine.run(RunParams {
            run_id,
            dataset_id: run.dataset_id,
            model_id: run.model_id,
            model_name,
            scale_mode: run.scale_mode,
            dual_fraction: run.dual_fraction,
            batch_size: run.batch_size,
            max_attempts: run.max_attempts,
            include_rationale: run.include_rationale,
            attr_generation_run_id: run_config.attrgen_run_id,
            skip_completed: run_config.effective_skip_completed(),
        });

        stop_poller.store(true, Ordering::SeqCst);
        let _ = poller.join();

        let status = self.classify_terminal_status(run_id, &result);
        self.storage.with_writer(|conn| queries::benchmark_runs::set_status(conn, run_id, status_str(status)))?;

        match result {
            Ok(()) | Err(bench_pipeline::PipelineError::Cancelled) => Ok(status),
            Err(e) => Err(QueueError::Pipeline(e)),
        }
    }

    fn build_gateway(&self, run_config: &RunConfig, model_name: &str) -> QueueResult<Arc<dyn LlmGateway>> {
        if run_config.effective_llm_backend() == "fake" {
            tracing::warn!("llm_backend=fake: using the deterministic stand-in gateway, not a real model");
            return Ok(Arc::new(FakeGateway::fixed_rating(8, 3)));
        }

        let preferred_url = run_config.vllm_base_url.as_deref().or(self.gateway_defaults.base_url.as_deref());
        let base_url = discovery::discover_base_url(preferred_url, model_name)?;
        let api_key = run_config.vllm_api_key.clone().or_else(|| self.gateway_defaults.api_key.clone());
        let gateway = VllmGateway::new(
            base_url,
            model_name.to_string(),
            api_key,
            GatewayRuntime {
                concurrency: run_config.batch_size.map(|b| b as usize).unwrap_or_else(|| self.gateway_defaults.effective_concurrency()),
                timeout: Duration::from_secs_f64(self.gateway_defaults.effective_timeout_s()),
                max_new_tokens_cap: self.gateway_defaults.effective_max_new_tokens_cap(),
            },
        );
        Ok(Arc::new(gateway))
    }

    fn spawn_poller(
        &self,
        run_id: RunId,
        dataset_id: bench_core::types::ids::DatasetId,
        dual_fraction: f64,
        stop: Arc<AtomicBool>,
    ) -> thread::JoinHandle<()> {
        let storage = self.storage.clone();
        let progress = self.progress.clone();

        struct StorageCounts {
            storage: Arc<StorageEngine>,
        }
        impl bench_core::progress::ProgressCounts for StorageCounts {
            fn count_completed(&self, run_id: RunId) -> Result<u64, String> {
                self.storage
                    .with_reader(|conn| queries::benchmark_results::count_completed(conn, run_id))
                    .map_err(|e| e.to_string())
            }
            fn count_total(&self, dataset_id: bench_core::types::ids::DatasetId, dual_fraction: f64) -> Result<u64, String> {
                let persona_count = self
                    .storage
                    .with_reader(|conn| queries::datasets::persona_count(conn, dataset_id))
                    .map_err(|e| e.to_string())?;
                let active_traits = self
                    .storage
                    .with_reader(|conn| queries::traits::list_active(conn))
                    .map_err(|e| e.to_string())?;
                let base = persona_count * active_traits.len() as u64;
                let extra = (base as f64 * dual_fraction).round() as u64;
                Ok(base + extra)
            }
        }
        let counts = StorageCounts { storage };

        thread::Builder::new()
            .name("bench-progress-poller".to_string())
            .spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let status = progress.get(run_id).status;
                    if !matches!(status, RunStatus::Queued | RunStatus::Running | RunStatus::Cancelling) {
                        break;
                    }
                    progress.update_from_store(run_id, dataset_id, dual_fraction, &counts);
                    thread::sleep(POLL_INTERVAL);
                }
            })
            .expect("failed to spawn progress poller thread")
    }

    /// `done` when `done ≥ total`, `partial` when `0 < done < total`,
    /// `cancelled` if cancellation was seen, `failed` on exception — the
    /// pipeline engine itself only distinguishes done/cancelled/failed,
    /// so a successful-but-incomplete run (total miscounted, or a chunk
    /// silently dropped) is reclassified here from the final counts.
    fn classify_terminal_status(&self, run_id: RunId, result: &bench_pipeline::PipelineResult<()>) -> RunStatus {
        match result {
            Err(bench_pipeline::PipelineError::Cancelled) => RunStatus::Cancelled,
            Err(_) => RunStatus::Failed,
            Ok(()) => {
                let entry = self.progress.get(run_id);
                let status = if entry.total == 0 || entry.done >= entry.total {
                    RunStatus::Done
                } else {
                    RunStatus::Partial
                };
                self.progress.set_status(run_id, status);
                status
            }
        }
    }
}

fn status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Queued => "queued",
        RunStatus::Running => "running",
        RunStatus::Cancelling => "cancelling",
        RunStatus::Done => "done",
        RunStatus::Partial => "partial",
        RunStatus::Failed => "failed",
        RunStatus::Cancelled => "cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bench_core::types::ids::ModelId;
    use bench_core::types::scale::ScaleMode;

    fn setup() -> (Arc<StorageEngine>, RunId) {
        let storage = Arc::new(StorageEngine::open_in_memory().unwrap());
        let dataset_id = storage.with_writer(|conn| queries::datasets::insert(conn, "d", "pool", &serde_json::json!({}))).unwrap();
        storage
            .with_writer(|conn| {
                for i in 0..2 {
                    let uuid = format!("p{i}");
                    queries::personas::insert(conn, &uuid, &Default::default())?;
                    queries::datasets::add_persona(conn, dataset_id, &uuid)?;
                }
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
                Ok(())
            })
            .unwrap();
        let run_id = storage
            .with_writer(|conn| {
                queries::benchmark_runs::insert(conn, dataset_id, ModelId(1), 2, 3, false, None, ScaleMode::In, 0.0)
            })
            .unwrap();
        (storage, run_id)
    }

    #[test]
    fn simple_fake_run_reaches_done_with_all_rows_persisted() {
        let (storage, run_id) = setup();
        let executor = BenchmarkExecutor::new(
            storage.clone(),
            Arc::new(ProgressRegistry::new()),
            Arc::new(EventDispatcher::new()),
            Arc::new(PromptResponseLog::disabled()),
            GatewayConfig::default(),
        );

        let mut run_config = RunConfig::default();
        run_config.llm_backend = Some("fake".to_string());
        run_config.model_name = Some("test-model".to_string());

        let status = executor.execute(run_id, &run_config).unwrap();
        assert_eq!(status, RunStatus::Done);

        let count = storage.with_reader(|conn| queries::benchmark_results::row_count(conn, run_id)).unwrap();
        assert_eq!(count, 2);

        let persisted_status = storage.with_reader(|conn| queries::benchmark_runs::get_status(conn, run_id)).unwrap();
        assert_eq!(persisted_status.as_deref(), Some("done"));
    }

    #[test]
    fn missing_run_is_reported_as_not_found() {
        let storage = Arc::new(StorageEngine::open_in_memory().unwrap());
        let executor = BenchmarkExecutor::new(
            storage,
            Arc::new(ProgressRegistry::new()),
            Arc::new(EventDispatcher::new()),
            Arc::new(PromptResponseLog::disabled()),
            GatewayConfig::default(),
        );
        let result = executor.execute(RunId(999), &RunConfig::default());
        assert!(matches!(result, Err(QueueError::RunNotFound { .. })));
    }
}
