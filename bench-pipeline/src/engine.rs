//! The pipeline engine (C8): wires C9 (dispatcher) → C5 (prompt factory)
//! → C4 (gateway) → C6 (post-processor) → C7 (persister) into one run.
//!
//! Processes the dispatcher's stream in chunks of `batch_size` so memory
//! stays bounded regardless of dataset size (the same constraint that
//! drives C9's keyset pagination). A failed item is requeued with its
//! attempt counter bumped and rejoins the next chunk, so retries share
//! the same batching and concurrency path as first attempts rather than
//! needing a separate retry scheduler (P2: an item is retried until
//! `max_attempts`, never beyond). Every failed attempt is logged to
//! FailLog as it happens, whether or not it is later retried; exhaustion
//! additionally logs a `max_attempts_exceeded` entry alongside the
//! triggering kind, so the log reads as a full attempt history rather
//! than just the final verdict. Cancellation is checked once per chunk
//! boundary (P9), never mid-chunk — in flight HTTP requests always
//! finish and get persisted before a cancelled run stops pulling more
//! work, mirroring the original `BenchmarkOrchestrator`'s cooperative
//! cancellation flag check between batches.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use bench_core::progress::ProgressCounts;
use bench_core::types::ids::{DatasetId, ModelId, RunId};
use bench_core::types::rows::{BenchmarkResultRow, FailLogEntry, TraitRow};
use bench_core::types::scale::ScaleMode;
use bench_core::types::work_item::WorkItem;
use bench_core::{EventDispatcher, WorkItemKey};
use bench_core::events::types::{RunCompleteEvent, RunErrorEvent, RunProgressEvent, RunStartedEvent};
use bench_core::{ProgressRegistry, RunStatus};
use bench_gateway::LlmGateway;
use bench_prompts::{FailureKind, PostProcessOutcome, Postprocessor, PromptFactory, PromptResponseLog};
use bench_prompts::log::PromptLogEntry;
use bench_storage::{queries, StorageEngine};

use crate::dispatcher::ScaleOrderDispatcher;
use crate::errors::{PipelineError, PipelineResult};
use crate::persister::Persister;

/// Per-run parameters the engine needs beyond the fixed collaborators it
/// was constructed with — everything `benchmark_runs` already records
/// plus the dataset/trait scope, passed explicitly so the engine itself
/// stays storage-agnostic about *which* run it's driving.
pub struct RunParams {
    pub run_id: RunId,
    pub dataset_id: DatasetId,
    pub model_id: ModelId,
    pub model_name: String,
    pub scale_mode: ScaleMode,
    pub dual_fraction: f64,
    pub batch_size: u32,
    pub max_attempts: u32,
    pub include_rationale: bool,
    pub attr_generation_run_id: Option<i64>,
    pub skip_completed: bool,
}

pub struct PipelineEngine {
    storage: Arc<StorageEngine>,
    gateway: Arc<dyn LlmGateway>,
    prompts: PromptFactory,
    postprocessor: Postprocessor,
    persister: Arc<Persister>,
    progress: Arc<ProgressRegistry>,
    prompt_log: Arc<PromptResponseLog>,
    events: Arc<EventDispatcher>,
}

struct StorageCounts {
    storage: Arc<StorageEngine>,
}

impl ProgressCounts for StorageCounts {
    fn count_completed(&self, run_id: RunId) -> Result<u64, String> {
        self.storage
            .with_reader(|conn| queries::benchmark_results::count_completed(conn, run_id))
            .map_err(|e| e.to_string())
    }

    fn count_total(&self, dataset_id: DatasetId, dual_fraction: f64) -> Result<u64, String> {
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

impl PipelineEngine {
    pub fn new(
        storage: Arc<StorageEngine>,
        gateway: Arc<dyn LlmGateway>,
        prompts: PromptFactory,
        persister: Arc<Persister>,
        progress: Arc<ProgressRegistry>,
        prompt_log: Arc<PromptResponseLog>,
        events: Arc<EventDispatcher>,
    ) -> Self {
        Self { storage, gateway, prompts, postprocessor: Postprocessor::new(), persister, progress, prompt_log, events }
    }

    pub fn run(&self, params: RunParams) -> PipelineResult<()> {
        let started = Instant::now();
        let run_id = params.run_id;

        let active_traits = self.storage.with_reader(|conn| queries::traits::list_active(conn))?;
        let completed_keys = if params.skip_completed {
            self.storage.with_reader(|conn| queries::benchmark_results::completed_keys(conn, run_id))?
        } else {
            Default::default()
        };

        let counts = StorageCounts { storage: self.storage.clone() };
        self.progress.set_status(run_id, RunStatus::Running);
        self.progress.update_from_store(run_id, params.dataset_id, params.dual_fraction, &counts);
        self.events.on_run_started(&RunStartedEvent { run_id, total: Some(self.progress.get(run_id).total as usize) });

        let dispatcher = ScaleOrderDispatcher::new(
            self.storage.clone(),
            run_id,
            params.dataset_id,
            params.attr_generation_run_id,
            active_traits,
            params.scale_mode,
            params.dual_fraction,
            completed_keys,
        );

        let result = self.drive(&params, dispatcher, &counts);

        match &result {
            Ok(()) => {
                self.progress.set_status(run_id, RunStatus::Done);
                self.events.on_run_complete(&RunCompleteEvent {
                    run_id,
                    status: "done",
                    duration_ms: started.elapsed().as_millis() as u64,
                });
            }
            Err(PipelineError::Cancelled) => {
                self.progress.set_status(run_id, RunStatus::Cancelled);
                self.events.on_run_complete(&RunCompleteEvent {
                    run_id,
                    status: "cancelled",
                    duration_ms: started.elapsed().as_millis() as u64,
                });
            }
            Err(e) => {
                self.progress.set_status(run_id, RunStatus::Failed);
                self.events.on_run_error(&RunErrorEvent { run_id, message: e.to_string() });
            }
        }

        result
    }

    fn drive(
        &self,
        params: &RunParams,
        mut dispatcher: ScaleOrderDispatcher,
        counts: &StorageCounts,
    ) -> PipelineResult<()> {
        let chunk_size = params.batch_size.max(1) as usize;
        let mut retry_queue: Vec<WorkItem> = Vec::new();
        let mut dispatcher_exhausted = false;

        loop {
            if self.progress.cancel_requested(params.run_id) {
                return Err(PipelineError::Cancelled);
            }

            let mut batch: Vec<WorkItem> = Vec::with_capacity(chunk_size);
            let take_from_retry = chunk_size.min(retry_queue.len());
            batch.extend(retry_queue.drain(..take_from_retry));

            while batch.len() < chunk_size {
                match dispatcher.next() {
                    Some(item) => batch.push(item),
                    None => {
                        dispatcher_exhausted = true;
                        break;
                    }
                }
            }

            if !batch.is_empty() {
                self.process_chunk(params, batch, &mut retry_queue)?;
                self.progress.update_from_store(params.run_id, params.dataset_id, params.dual_fraction, counts);
                let entry = self.progress.get(params.run_id);
                self.events.on_run_progress(&RunProgressEvent { run_id: params.run_id, done: entry.done as usize, total: entry.total as usize });
            }

            if dispatcher_exhausted && retry_queue.is_empty() {
                break;
            }
        }

        Ok(())
    }

    fn process_chunk(&self, params: &RunParams, batch: Vec<WorkItem>, retry_queue: &mut Vec<WorkItem>) -> PipelineResult<()> {
        let mut rendered: HashMap<WorkItemKey, (WorkItem, String)> = HashMap::with_capacity(batch.len());
        let mut specs = Vec::with_capacity(batch.len());

        for item in batch {
            let trait_row = TraitRow {
                trait_id: item.key.trait_id,
                adjective: item.adjective.clone(),
                case_template: item.case_template.clone(),
                category: None,
                valence: None,
                is_active: true,
            };
            let spec = self.prompts.render(item.key.clone(), &item.persona_context, &trait_row, item.attempt);
            rendered.insert(item.key.clone(), (item, spec.prompt_text.clone()));
            specs.push(spec);
        }

        let results = self.gateway.stream(Box::new(specs.into_iter()));

        let mut rows = Vec::new();
        for result in results {
            let Some((item, prompt_text)) = rendered.get(&result.metadata).cloned() else { continue };

            let outcome = self.postprocessor.process(&result.raw_text, result.metadata.scale_order, params.include_rationale);

            self.prompt_log.log(&PromptLogEntry {
                ts: chrono::Utc::now(),
                run_id: params.run_id,
                persona: item.key.persona_uuid.as_ref(),
                case: item.key.trait_id,
                scale: item.key.scale_order,
                attempt: result.attempt,
                model: &params.model_name,
                prompt: &prompt_text,
                response: &result.raw_text,
                rating: match &outcome {
                    PostProcessOutcome::Success(r) => Some(r.rating_normalized),
                    PostProcessOutcome::Failure(_) => None,
                },
                gen_ms: result.gen_time_ms,
                ok: matches!(outcome, PostProcessOutcome::Success(_)),
                error: match &outcome {
                    PostProcessOutcome::Failure(kind) => Some(kind.as_str()),
                    PostProcessOutcome::Success(_) => None,
                },
            });

            match outcome {
                PostProcessOutcome::Success(parsed) => {
                    rows.push(BenchmarkResultRow {
                        run_id: params.run_id,
                        persona_uuid: item.key.persona_uuid.clone(),
                        case_id: bench_core::progress::case_id_for_trait(item.key.trait_id),
                        scale_order: item.key.scale_order,
                        attempt: result.attempt,
                        answer_raw: result.raw_text.clone(),
                        rating: Some(parsed.rating_normalized),
                        rating_raw: Some(parsed.rating_raw),
                        gen_time_ms: result.gen_time_ms,
                        model_name: params.model_name.clone(),
                        template_version: bench_prompts::TEMPLATE_VERSION.to_string(),
                        created_at: chrono::Utc::now(),
                    });
                }
                PostProcessOutcome::Failure(kind) => {
                    self.persister.persist_failure(&FailLogEntry {
                        run_id: params.run_id,
                        persona_uuid: item.key.persona_uuid.clone(),
                        model_id: Some(params.model_id),
                        attempt: result.attempt,
                        error_kind: kind.as_str().to_string(),
                        raw_text_snippet: result.raw_text.chars().take(200).collect(),
                        prompt_snippet: prompt_text.chars().take(200).collect(),
                        created_at: chrono::Utc::now(),
                    })?;

                    if item.attempt < params.max_attempts {
                        let mut retried = item;
                        retried.attempt += 1;
                        retry_queue.push(retried);
                    } else {
                        self.persister.persist_failure(&FailLogEntry {
                            run_id: params.run_id,
                            persona_uuid: item.key.persona_uuid.clone(),
                            model_id: Some(params.model_id),
                            attempt: result.attempt,
                            error_kind: FailureKind::MaxAttemptsExceeded.as_str().to_string(),
                            raw_text_snippet: result.raw_text.chars().take(200).collect(),
                            prompt_snippet: prompt_text.chars().take(200).collect(),
                            created_at: chrono::Utc::now(),
                        })?;
                    }
                }
            }
        }

        if !rows.is_empty() {
            self.persister.persist_results(params.run_id, &rows)?;
        }
        Ok(())
    }
}
