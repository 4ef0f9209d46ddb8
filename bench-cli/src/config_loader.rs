//! Loads `BenchConfig` from an optional TOML file plus environment
//! overrides (§6.7). A missing config file is not an error — the
//! built-in defaults (`bench.db` database path, `vllm` backend, `info`
//! log level) apply, matching `RunConfig`'s own "everything has a
//! default" idiom.

use std::path::Path;

use bench_core::BenchConfig;

use crate::errors::{CliError, CliResult};

pub fn load(path: &Path) -> CliResult<BenchConfig> {
    let config = if path.exists() {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| CliError::Config(format!("{}: {e}", path.display())))?
    } else {
        BenchConfig::default()
    };
    Ok(config.with_env_overrides())
}
