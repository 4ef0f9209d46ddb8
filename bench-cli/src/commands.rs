use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bench_core::{BenchConfig, EventDispatcher, ProgressRegistry, RunId};
use bench_storage::{queries, StorageEngine};

use crate::args::SubmitArgs;
use crate::errors::{CliError, CliResult};

/// Starts the queue executor and blocks until Ctrl-C (or a delivered
/// `SIGTERM`) requests shutdown. The only long-running command — every
/// other subcommand opens the store, does one thing, and exits.
pub fn serve(config: &BenchConfig) -> CliResult<()> {
    let storage = Arc::new(StorageEngine::open(std::path::Path::new(&config.effective_database_path()))?);
    let progress = Arc::new(ProgressRegistry::new());

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(Box::new(bench_core::events::handler::TracingEventHandler));
    let events = Arc::new(dispatcher);

    let prompt_log = if config.effective_prompt_log_enabled() {
        Arc::new(bench_prompts::PromptResponseLog::open(config.effective_prompt_log_dir()))
    } else {
        Arc::new(bench_prompts::PromptResponseLog::disabled())
    };

    let executor = bench_queue::initialize(storage, progress, events, prompt_log, config.gateway.clone())?;
    executor.start()?;
    tracing::info!("queue executor running, press Ctrl-C to stop");

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_for_handler = shutdown.clone();
    ctrlc::set_handler(move || shutdown_for_handler.store(true, Ordering::SeqCst))
        .map_err(|e| CliError::Config(format!("failed to install signal handler: {e}")))?;

    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    tracing::info!("shutdown requested, stopping queue executor");
    executor.request_stop()?;
    Ok(())
}

/// Enqueues one `benchmark` task and returns without waiting for it to
/// run — submission is non-blocking (§4.11), the work is picked up by
/// whichever process is running `serve` against the same database file.
pub fn submit(config: &BenchConfig, args: &SubmitArgs) -> CliResult<i64> {
    let storage = StorageEngine::open(std::path::Path::new(&config.effective_database_path()))?;

    let task_config = serde_json::json!({
        "model_id": args.model_id,
        "dataset_id": args.dataset_id,
        "model_name": args.model_name,
        "batch_size": args.batch_size,
        "max_attempts": args.max_attempts,
        "include_rationale": args.include_rationale,
        "scale_mode": args.scale_mode,
        "dual_fraction": args.dual_fraction,
        "system_prompt": args.system_prompt,
        "llm_backend": args.llm_backend,
    });

    let depends_on = args.depends_on.map(bench_core::TaskId);
    let task_id = storage.with_writer(|conn| {
        queries::task_queue::insert(conn, "benchmark", None, &task_config, depends_on, 0)
    })?;
    Ok(task_id.0)
}

/// Prints a run's persisted status plus accepted/failed row counts.
pub fn status(config: &BenchConfig, run_id: i64) -> CliResult<()> {
    let storage = StorageEngine::open(std::path::Path::new(&config.effective_database_path()))?;
    let run_id = RunId(run_id);

    let run = storage
        .with_reader(|conn| queries::benchmark_runs::get(conn, run_id))?
        .ok_or(CliError::RunNotFound(run_id))?;
    let row_count = storage.with_reader(|conn| queries::benchmark_results::row_count(conn, run_id))?;
    let fail_count = storage.with_reader(|conn| queries::fail_log::count_for_run(conn, run_id))?;

    println!("run {run_id}");
    println!("  dataset_id:  {}", run.dataset_id);
    println!("  model_id:    {}", run.model_id);
    println!("  scale_mode:  {:?}", run.scale_mode);
    println!("  rows:        {row_count}");
    println!("  failures:    {fail_count}");
    Ok(())
}
