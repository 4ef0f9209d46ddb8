//! Command-line surface, `clap` derive style (`trickstertwo-toad`'s
//! `Parser`/`Subcommand` layout, adapted for a blocking batch harness
//! rather than a TUI).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "bench-cli", version, about = "Bias-measurement LLM benchmark harness")]
pub struct Cli {
    /// Path to a TOML configuration file. Missing file is not an error —
    /// built-in defaults plus environment overrides apply.
    #[arg(long, global = true, default_value = "bench.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the queue executor until Ctrl-C or `request_stop()`.
    Serve,

    /// Enqueue a `benchmark` task and exit immediately without waiting
    /// for it to run. The daemon (a running `serve`) picks it up.
    Submit(SubmitArgs),

    /// Print a run's persisted status and row counts.
    Status {
        #[arg(long)]
        run_id: i64,
    },
}

#[derive(Debug, clap::Args)]
pub struct SubmitArgs {
    #[arg(long)]
    pub dataset_id: i64,
    #[arg(long)]
    pub model_id: i64,
    #[arg(long)]
    pub model_name: String,
    #[arg(long, default_value_t = 8)]
    pub batch_size: u32,
    #[arg(long, default_value_t = 3)]
    pub max_attempts: u32,
    #[arg(long, default_value_t = false)]
    pub include_rationale: bool,
    #[arg(long, default_value = "in")]
    pub scale_mode: String,
    #[arg(long, default_value_t = 0.0)]
    pub dual_fraction: f64,
    #[arg(long)]
    pub system_prompt: Option<String>,
    /// `vllm` (default) or `fake` for the deterministic stand-in gateway.
    #[arg(long, default_value = "vllm")]
    pub llm_backend: String,
    /// Dependency task id: this task only becomes eligible once it completes.
    #[arg(long)]
    pub depends_on: Option<i64>,
}
