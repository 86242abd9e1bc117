//! The model catalog entity (§3 `Model`).

use super::id::ModelId;
use serde::{Deserialize, Serialize};

/// Reasoning effort tier a model may be configured with.
///
/// Changing a model's effort bumps `metrics_epoch` (§3), invalidating
/// historical LLM usage samples gathered under the old effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Xhigh,
    High,
    Medium,
    Low,
    Minimal,
    None,
}

/// A catalog model descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub id: ModelId,
    /// Unique in the catalog.
    pub name: String,
    pub color: String,
    pub logo_id: String,
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Bumped whenever `id` or `reasoning_effort` changes.
    pub metrics_epoch: u64,
    pub enabled: bool,
    pub archived_at: Option<super::time::Time>,
    /// Capability flags, defaulting to `true` when absent from input.
    #[serde(default = "default_true")]
    pub can_prompt: bool,
    #[serde(default = "default_true")]
    pub can_answer: bool,
    #[serde(default = "default_true")]
    pub can_vote: bool,
}

const fn default_true() -> bool {
    true
}

impl Model {
    /// A model is eligible for round participation iff enabled and not archived.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && self.archived_at.is_none()
    }
}
