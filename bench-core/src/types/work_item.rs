//! Types that travel with a unit of work through C5 → C4 → C6 → C7.
//! Because C4's completion order is independent of submission order
//! (§5), every piece of context a downstream stage needs must be
//! carried on the spec/result itself rather than inferred from position
//! in a stream.

use serde::{Deserialize, Serialize};

use super::ids::{PersonaUuid, RunId, TraitId};
use super::rows::PersonaContext;
use super::scale::ScaleOrder;

/// Identifies a single (persona, trait, scale-order) work item across
/// its whole retry lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItemKey {
    pub run_id: RunId,
    pub persona_uuid: PersonaUuid,
    pub trait_id: TraitId,
    pub scale_order: ScaleOrder,
}

/// Everything C9 knows about a work item before it becomes a prompt.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub key: WorkItemKey,
    pub persona_context: PersonaContext,
    pub adjective: String,
    pub case_template: Option<String>,
    pub attempt: u32,
}

/// A fully rendered request, ready for the gateway. Carries `metadata`
/// so the pipeline can reconstruct context regardless of completion
/// order (C4's ordering guarantee is none).
#[derive(Debug, Clone)]
pub struct PromptSpec {
    pub prompt_text: String,
    pub max_new_tokens: u32,
    pub attempt: u32,
    pub metadata: WorkItemKey,
}

/// What the gateway hands back for one `PromptSpec`.
#[derive(Debug, Clone)]
pub struct LlmResult {
    pub raw_text: String,
    pub gen_time_ms: u64,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub attempt: u32,
    pub metadata: WorkItemKey,
}
