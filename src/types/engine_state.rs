//! The singleton engine-state row (§3 `EngineState`).

use super::id::{LeaseId, ModelId, RoundId};
use super::time::Time;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether the tournament runs forever or stops after a fixed round count
/// (§9 open question: the source defaults to infinite; this port preserves
/// that default and makes the choice an explicit, documented config value
/// rather than an implicit absence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunsMode {
    Infinite,
    Finite,
}

/// The single durable row holding tournament-wide state (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    pub generation: u64,
    pub is_paused: bool,
    pub done: bool,
    pub next_round_num: u64,
    pub active_round_id: Option<RoundId>,
    pub last_completed_round_id: Option<RoundId>,
    pub completed_rounds: u64,
    pub scores: BTreeMap<String, i64>,
    pub human_scores: BTreeMap<String, i64>,
    pub human_vote_totals: BTreeMap<String, i64>,
    pub enabled_model_ids: Vec<ModelId>,
    pub runner_lease_id: Option<LeaseId>,
    pub runner_lease_until: Option<Time>,
    pub runs_mode: RunsMode,
    pub total_rounds: Option<u64>,
    /// Scheduler bookkeeping: next time the presence reaper should run.
    pub reaper_next_run_at: Option<Time>,
    /// Scheduler bookkeeping: next time the platform-presence poller should run.
    pub platform_poll_next_run_at: Option<Time>,
    /// Scheduler bookkeeping: the currently in-flight bootstrap run, if any.
    pub bootstrap_run: Option<BootstrapRun>,
}

/// Bookkeeping for an in-flight projection-bootstrap run (§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapRun {
    pub run_id: u64,
    pub generation: u64,
    pub started_at: Time,
}

impl EngineState {
    /// A freshly created singleton, as produced by `getOrCreate` (§4.1).
    #[must_use]
    pub fn new_default() -> Self {
        Self {
            generation: 0,
            is_paused: false,
            done: false,
            next_round_num: 1,
            active_round_id: None,
            last_completed_round_id: None,
            completed_rounds: 0,
            scores: BTreeMap::new(),
            human_scores: BTreeMap::new(),
            human_vote_totals: BTreeMap::new(),
            enabled_model_ids: Vec::new(),
            runner_lease_id: None,
            runner_lease_until: None,
            runs_mode: RunsMode::Infinite,
            total_rounds: None,
            reaper_next_run_at: None,
            platform_poll_next_run_at: None,
            bootstrap_run: None,
        }
    }

    /// `true` iff `lease_id` currently holds a non-expired lease (§4.2).
    #[must_use]
    pub fn lease_is_held_by(&self, lease_id: LeaseId, now: Time) -> bool {
        self.runner_lease_id == Some(lease_id)
            && self.runner_lease_until.is_some_and(|until| until > now)
    }

    /// `true` iff no valid (non-expired) lease is currently held (§4.2).
    #[must_use]
    pub fn lease_is_vacant(&self, now: Time) -> bool {
        match (self.runner_lease_id, self.runner_lease_until) {
            (Some(_), Some(until)) => until <= now,
            (None, _) => true,
            (Some(_), None) => true,
        }
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new_default()
    }
}
