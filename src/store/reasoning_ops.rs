//! Reasoning Estimator Sink storage: live reasoning-progress upserts (§4.5).

use super::EngineStore;
use crate::types::{LiveReasoningProgress, ModelId, ReasoningKey};

impl EngineStore {
    /// `upsertLiveReasoningProgress` (§4.5): replaces the estimate for a
    /// key in place; coalescing the call rate is the estimator's job, not
    /// the store's.
    pub fn upsert_live_reasoning_progress(
        &self,
        key: ReasoningKey,
        model_id: ModelId,
        estimated_reasoning_tokens: u64,
    ) {
        let mut g = self.inner.lock();
        g.reasoning.insert(
            key.clone(),
            LiveReasoningProgress {
                key,
                model_id,
                estimated_reasoning_tokens,
                finalized: false,
            },
        );
    }

    /// `finalizeLiveReasoningProgress` (§4.5): marks the row done so late
    /// live-payload reads stop showing it as still streaming. Leaves the
    /// row in place (rather than deleting) so the final count remains
    /// visible until the next generation purge.
    pub fn finalize_live_reasoning_progress(&self, key: &ReasoningKey, final_tokens: u64) {
        let mut g = self.inner.lock();
        if let Some(row) = g.reasoning.get_mut(key) {
            row.estimated_reasoning_tokens = final_tokens;
            row.finalized = true;
        }
    }

    /// Reads all live reasoning rows for a round, for the live payload (§6).
    #[must_use]
    pub fn live_reasoning_for_round(
        &self,
        round_id: crate::types::RoundId,
    ) -> Vec<LiveReasoningProgress> {
        self.inner
            .lock()
            .reasoning
            .iter()
            .filter(|(k, _)| k.round_id == round_id)
            .map(|(_, v)| v.clone())
            .collect()
    }
}
