//! Read-model payloads consumed by the admin surface and (outside the
//! core's scope) the renderer/UI; see §6.

use super::id::ModelId;
use super::model::Model;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Why the engine currently cannot run rounds, surfaced to the admin UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunBlockedReason {
    Paused,
    Done,
    InsufficientActiveModels,
    InsufficientRoleCoverage,
    None,
}

/// The admin `/admin/status` (and pause/resume/reset echo) payload (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSnapshot {
    pub is_paused: bool,
    pub is_running_round: bool,
    pub done: bool,
    pub completed_in_memory: u64,
    pub persisted_rounds: u64,
    pub viewer_count: u64,
    pub active_model_count: u64,
    pub can_run_rounds: bool,
    pub run_blocked_reason: RunBlockedReason,
    pub enabled_model_ids: Vec<ModelId>,
}

/// The `live` read payload (§6); emitted by a thin layer on top of the core,
/// but the shape is specified here since the core is what produces every
/// field on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivePayload {
    pub data: LivePayloadData,
    pub total_rounds: Option<u64>,
    pub viewer_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivePayloadData {
    pub active: Option<crate::types::round::Round>,
    pub last_completed: Option<crate::types::round::Round>,
    pub scores: BTreeMap<String, i64>,
    pub human_scores: BTreeMap<String, i64>,
    pub human_vote_totals: BTreeMap<String, i64>,
    pub models: Vec<Model>,
    pub enabled_model_ids: Vec<ModelId>,
    pub done: bool,
    pub is_paused: bool,
    pub generation: u64,
    pub completed_rounds: u64,
}
