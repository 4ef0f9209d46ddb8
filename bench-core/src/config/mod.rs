//! Configuration structs. Follows `drift-core`'s `ScanConfig` idiom:
//! everything is `Option<T>` with `#[serde(default)]` so a partial TOML
//! document layers cleanly over built-in defaults, and an `effective_*`
//! accessor resolves the default at the call site.

mod gateway_config;
mod run_config;

pub use gateway_config::GatewayConfig;
pub use run_config::RunConfig;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the harness process. Loaded from TOML with
/// environment overrides layered on top (`VLLM_BASE_URL`, `VLLM_API_KEY`,
/// `PROMPT_LOG_ENABLED`, `PROMPT_LOG_DIR`, `LOG_LEVEL`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BenchConfig {
    pub database_path: Option<String>,
    pub gateway: GatewayConfig,
    pub log_level: Option<String>,
    pub prompt_log_enabled: Option<bool>,
    pub prompt_log_dir: Option<String>,
}

impl BenchConfig {
    /// Database file path, defaulting to `bench.db` in the working directory.
    pub fn effective_database_path(&self) -> String {
        self.database_path
            .clone()
            .unwrap_or_else(|| "bench.db".to_string())
    }

    pub fn effective_log_level(&self) -> String {
        self.log_level.clone().unwrap_or_else(|| "info".to_string())
    }

    pub fn effective_prompt_log_enabled(&self) -> bool {
        self.prompt_log_enabled.unwrap_or(false)
    }

    pub fn effective_prompt_log_dir(&self) -> String {
        self.prompt_log_dir
            .clone()
            .unwrap_or_else(|| "./prompt_logs".to_string())
    }

    /// Apply environment variable overrides on top of a loaded config.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("VLLM_BASE_URL") {
            self.gateway.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("VLLM_API_KEY") {
            self.gateway.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("PROMPT_LOG_ENABLED") {
            self.prompt_log_enabled = Some(matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"));
        }
        if let Ok(v) = std::env::var("PROMPT_LOG_DIR") {
            self.prompt_log_dir = Some(v);
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            self.log_level = Some(v);
        }
        self
    }
}
