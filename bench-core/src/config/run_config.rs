use serde::{Deserialize, Serialize};

use crate::types::ids::DatasetId;
use crate::types::scale::ScaleMode;

/// Per-run options enumerated in §6.5 of the specification.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RunConfig {
    pub dataset_id: Option<DatasetId>,
    pub model_name: Option<String>,
    pub batch_size: Option<u32>,
    pub max_attempts: Option<u32>,
    pub include_rationale: Option<bool>,
    pub system_prompt: Option<String>,
    pub scale_mode: Option<ScaleMode>,
    pub dual_fraction: Option<f64>,
    pub max_new_tokens: Option<u32>,
    pub llm_backend: Option<String>,
    pub vllm_base_url: Option<String>,
    pub vllm_api_key: Option<String>,
    pub skip_completed: Option<bool>,
    pub attrgen_run_id: Option<i64>,
}

impl RunConfig {
    pub fn effective_batch_size(&self) -> u32 {
        self.batch_size.unwrap_or(8).clamp(1, 64)
    }

    pub fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.unwrap_or(3).clamp(1, 5)
    }

    pub fn effective_include_rationale(&self) -> bool {
        self.include_rationale.unwrap_or(false)
    }

    pub fn effective_scale_mode(&self) -> ScaleMode {
        self.scale_mode.unwrap_or_default()
    }

    pub fn effective_dual_fraction(&self) -> f64 {
        self.dual_fraction.unwrap_or(0.0).clamp(0.0, 1.0)
    }

    pub fn effective_skip_completed(&self) -> bool {
        self.skip_completed.unwrap_or(true)
    }

    pub fn effective_llm_backend(&self) -> String {
        self.llm_backend.clone().unwrap_or_else(|| "vllm".to_string())
    }
}
