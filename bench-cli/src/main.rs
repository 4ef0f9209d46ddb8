//! `bench-cli` — the binary entrypoint. Parses arguments, loads
//! configuration, initializes tracing, and dispatches to one of three
//! subcommands: `serve` (runs the queue executor as a foreground
//! process until Ctrl-C), `submit` (enqueues one benchmark task against
//! the same database file and exits), `status` (prints a run's
//! persisted progress). No async runtime anywhere in this binary or the
//! crates it wires together — every blocking point (HTTP call, DB
//! write, channel recv) carries its own bounded timeout instead.

mod args;
mod commands;
mod config_loader;
mod errors;
mod logging;

use clap::Parser;

use args::{Cli, Command};

fn main() {
    let cli = Cli::parse();

    let config = match config_loader::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    logging::init(&config.effective_log_level());

    let result = match cli.command {
        Command::Serve => commands::serve(&config),
        Command::Submit(args) => commands::submit(&config, &args).map(|task_id| {
            println!("submitted task {task_id}");
        }),
        Command::Status { run_id } => commands::status(&config, run_id),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "bench-cli command failed");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
