//! The engine's durable state, modeled as a single lock-guarded document
//! store (§3, §5).
//!
//! Every module in this crate that needs to read or mutate persisted state
//! goes through [`EngineStore`]. Each public method is one "transaction" in
//! the sense §4-§5 use the word: it takes the lock, checks the invariants
//! and `(expectedGeneration, leaseId)` guard named in the relevant §4.x
//! subsection, applies the change, and releases the lock. The lock is the
//! serialization point §5 calls out ("the ESS row is the serialization
//! point"); because every writer in this single-process port already goes
//! through it, a guard failure (stale generation, wrong lease, round no
//! longer in the expected phase) is reported as
//! [`crate::error::ErrorKind::OptimisticConcurrencyControlFailure`] even
//! though, unlike the sharded document database this was ported from,
//! there is no separate compare-and-swap race to lose; the mutex already
//! serializes all writers. Callers still treat it exactly as §4.1
//! prescribes: retry or reconfirm the lease.

mod engine_state_ops;
mod reasoning_ops;
mod round_ops;
mod usage_ops;
mod viewer_ops;

pub use viewer_ops::HeartbeatResult;

use crate::config::constants;
use crate::types::{
    EngineState, LeaseId, LiveReasoningProgress, LlmUsageEvent, Model, ModelId, ReasoningKey,
    Round, RoundId, Side, ViewerId, ViewerPresence,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

/// All generation-scoped, in-memory state the engine owns.
///
/// Field layout follows §2's component list (ESS, RRS, VA, usage,
/// reasoning) plus the model catalog, which §6 treats as admin-managed but
/// which the driver reads every tick (§4.3 step 5).
pub(crate) struct StoreInner {
    pub(crate) engine_state: EngineState,
    pub(crate) models: BTreeMap<ModelId, Model>,

    pub(crate) rounds: HashMap<RoundId, Round>,
    /// Index by `(generation, round#)`, per §3's indexing note.
    pub(crate) rounds_by_gen_num: BTreeMap<(u64, u64), RoundId>,

    pub(crate) presence: HashMap<ViewerId, ViewerPresence>,
    pub(crate) shard_counts: Vec<u64>,
    /// `(round, viewer)` -> side, for idempotent vote-casting (§4.8).
    pub(crate) viewer_votes: HashMap<(RoundId, ViewerId), Side>,
    /// `(round, side, shard)` -> count; sums to the per-(round,side) total (§3).
    pub(crate) vote_tallies: HashMap<(RoundId, Side, usize), u64>,

    pub(crate) usage_events: Vec<LlmUsageEvent>,
    pub(crate) reasoning: HashMap<ReasoningKey, LiveReasoningProgress>,

    /// Viewer-target admin records (§6 `/admin/viewer-targets`), opaque to
    /// the core beyond storing and listing them back.
    pub(crate) viewer_targets: Vec<serde_json::Value>,
}

impl StoreInner {
    fn new() -> Self {
        Self {
            engine_state: EngineState::new_default(),
            models: BTreeMap::new(),
            rounds: HashMap::new(),
            rounds_by_gen_num: BTreeMap::new(),
            presence: HashMap::new(),
            shard_counts: vec![0; constants::SHARD_COUNT],
            viewer_votes: HashMap::new(),
            vote_tallies: HashMap::new(),
            usage_events: Vec::new(),
            reasoning: HashMap::new(),
            viewer_targets: Vec::new(),
        }
    }

    pub(crate) fn total_viewer_count(&self) -> u64 {
        self.shard_counts.iter().sum()
    }
}

/// The engine's single durable-state handle.
///
/// Cheap to clone (an `Arc` internally would be the multi-owner shape; this
/// crate instead hands out `&EngineStore` / `Arc<EngineStore>` from
/// [`crate::app::Engine`] since nothing here needs to be cloned by value).
pub struct EngineStore {
    pub(crate) inner: Mutex<StoreInner>,
}

impl EngineStore {
    /// Creates an empty store with a freshly defaulted `EngineState`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner::new()),
        }
    }

    /// `getState` (§4.1): a read-only snapshot of the engine state.
    #[must_use]
    pub fn get_state(&self) -> EngineState {
        self.inner.lock().engine_state.clone()
    }

    /// `getOrCreate` (§4.1): idempotent; the store is always already
    /// created in this in-process port, so this simply returns the current
    /// state. Kept as a named operation to mirror the source's API surface
    /// and give callers a single place to depend on "the row exists".
    #[must_use]
    pub fn get_or_create_state(&self) -> EngineState {
        self.get_state()
    }

    /// Lists all active (enabled, not archived) models in catalog order.
    #[must_use]
    pub fn active_models(&self) -> Vec<Model> {
        self.inner
            .lock()
            .models
            .values()
            .filter(|m| m.is_active())
            .cloned()
            .collect()
    }

    /// Lists every model in the catalog.
    #[must_use]
    pub fn all_models(&self) -> Vec<Model> {
        self.inner.lock().models.values().cloned().collect()
    }

    /// Looks up a single catalog entry by id.
    #[must_use]
    pub fn get_model(&self, id: &ModelId) -> Option<Model> {
        self.inner.lock().models.get(id).cloned()
    }

    /// Admin `models` upsert (§6 `/admin/models`). Bumps `metrics_epoch`
    /// when `reasoning_effort` changes relative to the stored record (§3:
    /// "bumped on `id` or effort change"), so historical usage samples
    /// gathered under the old effort stop counting toward the bootstrap's
    /// minimum-sample requirement (§4.9).
    pub fn upsert_model(&self, mut model: Model) {
        let mut g = self.inner.lock();
        let id = model.id.clone();
        if let Some(existing) = g.models.get(&id) {
            if existing.reasoning_effort != model.reasoning_effort {
                model.metrics_epoch = existing.metrics_epoch + 1;
            } else {
                model.metrics_epoch = existing.metrics_epoch;
            }
        }
        if !g.engine_state.enabled_model_ids.contains(&id) && model.enabled {
            g.engine_state.enabled_model_ids.push(id.clone());
        }
        if !model.enabled {
            g.engine_state.enabled_model_ids.retain(|existing| existing != &id);
        }
        g.models.insert(id, model);
    }

    /// Fetches a round by id.
    #[must_use]
    pub fn get_round(&self, id: RoundId) -> Option<Round> {
        self.inner.lock().rounds.get(&id).cloned()
    }

    /// `getRoundForRunner` (§5): reads the freshest round state between
    /// phases, same as [`EngineStore::get_round`] but named to match the
    /// source's call site.
    #[must_use]
    pub fn get_round_for_runner(&self, id: RoundId) -> Option<Round> {
        self.get_round(id)
    }

    /// Current live-viewer count, summed across shards.
    #[must_use]
    pub fn viewer_count(&self) -> u64 {
        self.inner.lock().total_viewer_count()
    }

    /// Admin `/admin/viewer-targets` list.
    #[must_use]
    pub fn viewer_targets(&self) -> Vec<serde_json::Value> {
        self.inner.lock().viewer_targets.clone()
    }

    /// Admin `/admin/viewer-targets` create.
    pub fn add_viewer_target(&self, target: serde_json::Value) {
        self.inner.lock().viewer_targets.push(target);
    }

    /// `/admin/export` (§6): a full JSON dump of the current generation's
    /// engine state and round rows.
    #[must_use]
    pub fn export_generation(&self) -> serde_json::Value {
        let g = self.inner.lock();
        let generation = g.engine_state.generation;
        let rounds: Vec<&Round> = g
            .rounds
            .values()
            .filter(|r| r.generation == generation)
            .collect();
        serde_json::json!({
            "engineState": g.engine_state,
            "rounds": rounds,
            "models": g.models.values().collect::<Vec<_>>(),
        })
    }
}

impl Default for EngineStore {
    fn default() -> Self {
        Self::new()
    }
}

