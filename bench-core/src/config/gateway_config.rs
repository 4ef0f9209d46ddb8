use serde::{Deserialize, Serialize};

/// LLM gateway (C4) configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Preferred base URL. Overridden by `VLLM_BASE_URL`.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// In-flight request cap; also the per-run default `batch_size`.
    pub concurrency: Option<usize>,
    /// Per-request wall-clock timeout, seconds. Default 120.
    pub timeout_s: Option<f64>,
    /// Hard cap on `max_new_tokens` regardless of the per-run request.
    pub max_new_tokens_cap: Option<u32>,
}

impl GatewayConfig {
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.unwrap_or(8)
    }

    pub fn effective_timeout_s(&self) -> f64 {
        self.timeout_s.unwrap_or(120.0)
    }

    pub fn effective_max_new_tokens_cap(&self) -> u32 {
        self.max_new_tokens_cap.unwrap_or(256)
    }
}
