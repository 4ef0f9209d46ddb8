//! The six literal scenarios used to pin the pipeline's observable
//! behavior end to end: a simple run, a retry that eventually succeeds,
//! a retry that exhausts `max_attempts`, a resumed run, a dual-order
//! run, and a cancelled run. Scenario 1 drives the full queue path
//! through `BenchmarkExecutor` (C10); the rest drive `PipelineEngine`
//! (C8) directly with a scripted `FakeGateway`, since exercising a
//! specific per-attempt response sequence needs a gateway the queue
//! layer's `llm_backend` switch doesn't expose — the same seam the
//! engine's own unit tests use.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bench_core::config::{GatewayConfig, RunConfig};
use bench_core::progress::RunStatus;
use bench_core::types::ids::{ModelId, TraitId};
use bench_core::types::rows::TraitRow;
use bench_core::types::scale::{ScaleMode, ScaleOrder};
use bench_core::{EventDispatcher, ProgressRegistry};
use bench_gateway::{FakeGateway, LlmGateway};
use bench_pipeline::{PipelineEngine, PipelineError, Persister, RunParams};
use bench_prompts::{PromptFactory, PromptResponseLog};
use bench_queue::benchmark_executor::BenchmarkExecutor;
use bench_storage::{queries, StorageEngine};

/// `with_reader`/`with_writer` closures must return `Result<T,
/// StorageError>`; raw `rusqlite` calls return `rusqlite::Error`, which
/// has no conversion into it, so ad hoc SQL in these tests unwraps
/// inline rather than propagating with `?`.
fn fetch<T>(storage: &StorageEngine, f: impl FnOnce(&rusqlite::Connection) -> T) -> T {
    storage.with_reader(|conn| Ok(f(conn))).unwrap()
}

fn build_dataset(storage: &Arc<StorageEngine>, personas: &[&str], traits: &[(i64, &str)]) -> bench_core::types::ids::DatasetId {
    let dataset_id = storage.with_writer(|conn| queries::datasets::insert(conn, "d", "pool", &serde_json::json!({}))).unwrap();
    storage
        .with_writer(|conn| {
            for uuid in personas {
                queries::personas::insert(conn, uuid, &Default::default())?;
                queries::datasets::add_persona(conn, dataset_id, uuid)?;
            }
            for (id, adjective) in traits {
                queries::traits::insert(
                    conn,
                    &TraitRow { trait_id: TraitId(*id), adjective: adjective.to_string(), case_template: None, category: None, valence: None, is_active: true },
                )?;
            }
            Ok(())
        })
        .unwrap();
    dataset_id
}

fn engine_for(
    storage: Arc<StorageEngine>,
    gateway: Arc<dyn LlmGateway>,
    progress: Arc<ProgressRegistry>,
) -> PipelineEngine {
    PipelineEngine::new(
        storage.clone(),
        gateway,
        PromptFactory::new(false, 32, None),
        Arc::new(Persister::new(storage)),
        progress,
        Arc::new(PromptResponseLog::disabled()),
        Arc::new(EventDispatcher::new()),
    )
}

fn run_params(run_id: bench_core::RunId, dataset_id: bench_core::types::ids::DatasetId, scale_mode: ScaleMode, dual_fraction: f64, batch_size: u32, max_attempts: u32) -> RunParams {
    RunParams {
        run_id,
        dataset_id,
        model_id: ModelId(1),
        model_name: "test-model".to_string(),
        scale_mode,
        dual_fraction,
        batch_size,
        max_attempts,
        include_rationale: false,
        attr_generation_run_id: None,
        skip_completed: true,
    }
}

/// Scenario 1 — simple run: 2 personas x 2 traits, `scale_mode=in`,
/// `batch_size=2`, fake LLM always returning `{"rating":3}`. Expected:
/// 4 result rows, all rating 3; FailLog empty; status `done`.
#[test]
fn simple_run_produces_four_rows_at_rating_three() {
    let storage = Arc::new(StorageEngine::open_in_memory().unwrap());
    let dataset_id = build_dataset(&storage, &["P1", "P2"], &[(1, "freundlich"), (2, "ehrlich")]);
    let run_id = storage
        .with_writer(|conn| queries::benchmark_runs::insert(conn, dataset_id, ModelId(1), 2, 3, false, None, ScaleMode::In, 0.0))
        .unwrap();

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

    let row_count = storage.with_reader(|conn| queries::benchmark_results::row_count(conn, run_id)).unwrap();
    assert_eq!(row_count, 4);

    let ratings: Vec<i64> = fetch(&storage, |conn| {
        let mut stmt = conn.prepare("SELECT rating FROM benchmark_results WHERE run_id = ?1").unwrap();
        let rows = stmt.query_map(rusqlite::params![run_id.0], |r| r.get::<_, i64>(0)).unwrap();
        rows.collect::<Result<Vec<_>, _>>().unwrap()
    });
    assert!(ratings.iter().all(|&r| r == 3));

    let fail_count = storage.with_reader(|conn| queries::fail_log::count_for_run(conn, run_id)).unwrap();
    assert_eq!(fail_count, 0);
}

/// Scenario 2 — retry to success: invalid text on attempt 1,
/// `{"rating":4}` on attempt 2; `max_attempts=2`. Expected: 4 result
/// rows at rating 4; FailLog has 4 entries (one per item, attempt 1,
/// `parse_error`); status `done`.
#[test]
fn retry_to_success_logs_one_parse_error_per_item_then_succeeds() {
    let storage = Arc::new(StorageEngine::open_in_memory().unwrap());
    let dataset_id = build_dataset(&storage, &["P1", "P2"], &[(1, "freundlich"), (2, "ehrlich")]);
    let run_id = storage
        .with_writer(|conn| queries::benchmark_runs::insert(conn, dataset_id, ModelId(1), 2, 2, false, None, ScaleMode::In, 0.0))
        .unwrap();

    let gateway: Arc<dyn LlmGateway> = Arc::new(FakeGateway::new(4, |spec| {
        if spec.attempt == 1 { "not json".to_string() } else { r#"{"rating": 4}"#.to_string() }
    }));
    let progress = Arc::new(ProgressRegistry::new());
    let engine = engine_for(storage.clone(), gateway, progress);

    engine.run(run_params(run_id, dataset_id, ScaleMode::In, 0.0, 2, 2)).unwrap();

    let row_count = storage.with_reader(|conn| queries::benchmark_results::row_count(conn, run_id)).unwrap();
    assert_eq!(row_count, 4);
    let ratings: Vec<i64> = fetch(&storage, |conn| {
        let mut stmt = conn.prepare("SELECT rating FROM benchmark_results WHERE run_id = ?1").unwrap();
        let rows = stmt.query_map(rusqlite::params![run_id.0], |r| r.get::<_, i64>(0)).unwrap();
        rows.collect::<Result<Vec<_>, _>>().unwrap()
    });
    assert!(ratings.iter().all(|&r| r == 4));

    let fail_count = storage.with_reader(|conn| queries::fail_log::count_for_run(conn, run_id)).unwrap();
    assert_eq!(fail_count, 4);
    let kinds: Vec<String> = fetch(&storage, |conn| {
        let mut stmt = conn.prepare("SELECT DISTINCT error_kind FROM fail_log WHERE run_id = ?1").unwrap();
        let rows = stmt.query_map(rusqlite::params![run_id.0], |r| r.get::<_, String>(0)).unwrap();
        rows.collect::<Result<Vec<_>, _>>().unwrap()
    });
    assert_eq!(kinds, vec!["parse_error".to_string()]);
}

/// Scenario 3 — retry exhausted: LLM always invalid; `max_attempts=3`.
/// Expected: 0 result rows; FailLog has 3x4 = 12 per-attempt entries
/// plus 4 `max_attempts_exceeded` entries at attempt 3; status `done`
/// (total=0, since nothing was ever completed and skip_completed finds
/// nothing to skip — the run still drains every item to exhaustion).
#[test]
fn retry_exhausted_logs_twelve_attempts_plus_four_exhaustion_entries() {
    let storage = Arc::new(StorageEngine::open_in_memory().unwrap());
    let dataset_id = build_dataset(&storage, &["P1", "P2"], &[(1, "freundlich"), (2, "ehrlich")]);
    let run_id = storage
        .with_writer(|conn| queries::benchmark_runs::insert(conn, dataset_id, ModelId(1), 2, 3, false, None, ScaleMode::In, 0.0))
        .unwrap();

    let gateway: Arc<dyn LlmGateway> = Arc::new(FakeGateway::new(4, |_spec| "not json".to_string()));
    let progress = Arc::new(ProgressRegistry::new());
    let engine = engine_for(storage.clone(), gateway, progress);

    engine.run(run_params(run_id, dataset_id, ScaleMode::In, 0.0, 2, 3)).unwrap();

    let row_count = storage.with_reader(|conn| queries::benchmark_results::row_count(conn, run_id)).unwrap();
    assert_eq!(row_count, 0);

    let fail_count = storage.with_reader(|conn| queries::fail_log::count_for_run(conn, run_id)).unwrap();
    assert_eq!(fail_count, 16);

    let exhausted_count: i64 = fetch(&storage, |conn| {
        conn.query_row(
            "SELECT COUNT(*) FROM fail_log WHERE run_id = ?1 AND error_kind = 'max_attempts_exceeded'",
            rusqlite::params![run_id.0],
            |r| r.get(0),
        )
        .unwrap()
    });
    assert_eq!(exhausted_count, 4);

    let parse_error_count: i64 = fetch(&storage, |conn| {
        conn.query_row(
            "SELECT COUNT(*) FROM fail_log WHERE run_id = ?1 AND error_kind = 'parse_error'",
            rusqlite::params![run_id.0],
            |r| r.get(0),
        )
        .unwrap()
    });
    assert_eq!(parse_error_count, 12);
}

/// Scenario 4 — resume: pre-populate 2 rows for `(P1,T1,in)` and
/// `(P1,T2,in)`. Re-run with `skip_completed=true`. Expected: the
/// gateway is called exactly twice (for `P2,T1` and `P2,T2`); final row
/// count is 4.
#[test]
fn resume_calls_the_gateway_only_for_the_remaining_pair() {
    let storage = Arc::new(StorageEngine::open_in_memory().unwrap());
    let dataset_id = build_dataset(&storage, &["P1", "P2"], &[(1, "freundlich"), (2, "ehrlich")]);
    let run_id = storage
        .with_writer(|conn| queries::benchmark_runs::insert(conn, dataset_id, ModelId(1), 2, 3, false, None, ScaleMode::In, 0.0))
        .unwrap();

    storage
        .with_writer(|conn| {
            queries::benchmark_results::upsert_many(
                conn,
                &[
                    bench_core::types::rows::BenchmarkResultRow {
                        run_id,
                        persona_uuid: "P1".to_string().into(),
                        case_id: "1".to_string(),
                        scale_order: ScaleOrder::In,
                        attempt: 1,
                        answer_raw: r#"{"rating":3}"#.to_string(),
                        rating: Some(3),
                        rating_raw: Some(3),
                        gen_time_ms: 1,
                        model_name: "test-model".to_string(),
                        template_version: "v1".to_string(),
                        created_at: chrono::Utc::now(),
                    },
                    bench_core::types::rows::BenchmarkResultRow {
                        run_id,
                        persona_uuid: "P1".to_string().into(),
                        case_id: "2".to_string(),
                        scale_order: ScaleOrder::In,
                        attempt: 1,
                        answer_raw: r#"{"rating":3}"#.to_string(),
                        rating: Some(3),
                        rating_raw: Some(3),
                        gen_time_ms: 1,
                        model_name: "test-model".to_string(),
                        template_version: "v1".to_string(),
                        created_at: chrono::Utc::now(),
                    },
                ],
            )
        })
        .unwrap();

    let call_count = Arc::new(AtomicUsize::new(0));
    let call_count_clone = call_count.clone();
    let gateway: Arc<dyn LlmGateway> = Arc::new(FakeGateway::new(4, move |_spec| {
        call_count_clone.fetch_add(1, Ordering::SeqCst);
        r#"{"rating": 3}"#.to_string()
    }));
    let progress = Arc::new(ProgressRegistry::new());
    let engine = engine_for(storage.clone(), gateway, progress);

    engine.run(run_params(run_id, dataset_id, ScaleMode::In, 0.0, 2, 3)).unwrap();

    assert_eq!(call_count.load(Ordering::SeqCst), 2);
    let row_count = storage.with_reader(|conn| queries::benchmark_results::row_count(conn, run_id)).unwrap();
    assert_eq!(row_count, 4);
}

/// Scenario 5 — dual order: `scale_mode=dual`, `dual_fraction=1.0`,
/// `max_attempts=1`, LLM returns `{"rating":2}` regardless. Expected: 8
/// rows — each triple appears once with `scale_order=in` (`rating=2`)
/// and once with `scale_order=rev` (`rating=6-2=4`).
#[test]
fn dual_order_emits_both_scales_with_reversed_normalization() {
    let storage = Arc::new(StorageEngine::open_in_memory().unwrap());
    let dataset_id = build_dataset(&storage, &["P1", "P2"], &[(1, "freundlich"), (2, "ehrlich")]);
    let run_id = storage
        .with_writer(|conn| queries::benchmark_runs::insert(conn, dataset_id, ModelId(1), 2, 1, false, None, ScaleMode::Dual, 1.0))
        .unwrap();

    let gateway: Arc<dyn LlmGateway> = Arc::new(FakeGateway::fixed_rating(4, 2));
    let progress = Arc::new(ProgressRegistry::new());
    let engine = engine_for(storage.clone(), gateway, progress);

    engine.run(run_params(run_id, dataset_id, ScaleMode::Dual, 1.0, 4, 1)).unwrap();

    let row_count = storage.with_reader(|conn| queries::benchmark_results::row_count(conn, run_id)).unwrap();
    assert_eq!(row_count, 8);

    let rows: Vec<(String, i64)> = fetch(&storage, |conn| {
        let mut stmt = conn.prepare("SELECT scale_order, rating FROM benchmark_results WHERE run_id = ?1").unwrap();
        let rows = stmt
            .query_map(rusqlite::params![run_id.0], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))
            .unwrap();
        rows.collect::<Result<Vec<_>, _>>().unwrap()
    });
    assert_eq!(rows.iter().filter(|(order, rating)| order == "in" && *rating == 2).count(), 4);
    assert_eq!(rows.iter().filter(|(order, rating)| order == "rev" && *rating == 4).count(), 4);
}

/// Scenario 6 — cancellation: start a run wide enough to need two
/// chunks, flip `cancel_requested` once the first chunk's responses
/// have all been generated (simulating "after first batch"). Expected:
/// status `cancelled`; only the first chunk's rows are persisted; no
/// partial row (every persisted row has both `answer_raw` and
/// `rating`).
#[test]
fn cancellation_after_first_batch_persists_only_that_batch() {
    let storage = Arc::new(StorageEngine::open_in_memory().unwrap());
    let dataset_id = build_dataset(&storage, &["P1", "P2"], &[(1, "freundlich"), (2, "ehrlich")]);
    let run_id = storage
        .with_writer(|conn| queries::benchmark_runs::insert(conn, dataset_id, ModelId(1), 2, 3, false, None, ScaleMode::In, 0.0))
        .unwrap();

    let progress = Arc::new(ProgressRegistry::new());
    let progress_for_gateway = progress.clone();
    let seen = Arc::new(AtomicUsize::new(0));
    let gateway: Arc<dyn LlmGateway> = Arc::new(FakeGateway::new(4, move |_spec| {
        if seen.fetch_add(1, Ordering::SeqCst) + 1 >= 2 {
            progress_for_gateway.set_cancel_requested(run_id, true);
        }
        r#"{"rating": 3}"#.to_string()
    }));
    let engine = engine_for(storage.clone(), gateway, progress.clone());

    let result = engine.run(run_params(run_id, dataset_id, ScaleMode::In, 0.0, 2, 3));
    assert!(matches!(result, Err(PipelineError::Cancelled)));

    let row_count = storage.with_reader(|conn| queries::benchmark_results::row_count(conn, run_id)).unwrap();
    assert_eq!(row_count, 2);

    let no_partial: i64 = fetch(&storage, |conn| {
        conn.query_row(
            "SELECT COUNT(*) FROM benchmark_results WHERE run_id = ?1 AND (rating IS NULL OR answer_raw = '')",
            rusqlite::params![run_id.0],
            |r| r.get(0),
        )
        .unwrap()
    });
    assert_eq!(no_partial, 0);

    assert_eq!(progress.get(run_id).status, RunStatus::Cancelled);
}
