//! Row shapes shared across the storage, pipeline and queue crates.
//!
//! These mirror the wire schema in §6.3 of the harness specification.
//! Keeping them here (rather than duplicating per-crate) avoids the
//! DTO drift the original Python layer suffered from between
//! `models.py` and its Peewee-derived dataclasses.

use serde::{Deserialize, Serialize};

use super::ids::{DatasetId, ModelId, PersonaUuid, RunId, TaskId, TraitId};
use super::scale::{ScaleMode, ScaleOrder};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResultRow {
    pub run_id: RunId,
    pub persona_uuid: PersonaUuid,
    pub case_id: String,
    pub scale_order: ScaleOrder,
    pub attempt: u32,
    pub answer_raw: String,
    pub rating: Option<u8>,
    pub rating_raw: Option<u8>,
    pub gen_time_ms: u64,
    pub model_name: String,
    pub template_version: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailLogEntry {
    pub run_id: RunId,
    pub persona_uuid: PersonaUuid,
    pub model_id: Option<ModelId>,
    pub attempt: u32,
    pub error_kind: String,
    pub raw_text_snippet: String,
    pub prompt_snippet: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TaskStatus::Queued),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRow {
    pub task_id: TaskId,
    pub task_type: String,
    pub label: Option<String>,
    pub status: TaskStatus,
    pub position: i64,
    pub depends_on: Option<TaskId>,
    pub config: serde_json::Value,
    pub result_run_id: Option<RunId>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkRunRow {
    pub run_id: RunId,
    pub dataset_id: DatasetId,
    pub model_id: ModelId,
    pub batch_size: u32,
    pub max_attempts: u32,
    pub include_rationale: bool,
    pub system_prompt: Option<String>,
    pub scale_mode: ScaleMode,
    pub dual_fraction: f64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Minimal persona context consumed by the prompt factory. Kept separate
/// from the fuller `AdditionalPersonaAttribute` enrichment so the
/// streaming dispatcher (C9) can construct it from a single joined row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaContext {
    pub name: Option<String>,
    pub appearance: Option<String>,
    pub biography: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub origin_name: Option<String>,
    pub education: Option<String>,
    pub occupation: Option<String>,
    pub marriage_status: Option<String>,
    pub religion: Option<String>,
    pub sexuality: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraitRow {
    pub trait_id: TraitId,
    pub adjective: String,
    pub case_template: Option<String>,
    pub category: Option<String>,
    pub valence: Option<i8>,
    pub is_active: bool,
}
