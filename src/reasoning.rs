//! Reasoning Estimator Sink (§4.5): wires the character-class estimator to
//! the store, coalescing live updates at the configured interval.

use crate::config::constants;
use crate::llm_adapter::ProgressSink;
use crate::store::EngineStore;
use crate::types::{ModelId, ReasoningKey, RequestType, Time};
use std::sync::Arc;

/// A [`ProgressSink`] that coalesces writes to the store at
/// `REASONING_PROGRESS_COALESCE_MS` intervals, always writing through
/// immediately when `finalized=true` (§4.5: "coalescing updates at ≥1 s
/// intervals except when `finalized=true`").
pub struct ReasoningSink {
    store: Arc<EngineStore>,
    key: ReasoningKey,
    model_id: ModelId,
    last_write_at: Option<Time>,
}

impl ReasoningSink {
    #[must_use]
    pub fn new(store: Arc<EngineStore>, round_id: crate::types::RoundId, request_type: RequestType, answer_index: Option<u8>, model_id: ModelId) -> Self {
        let key = ReasoningKey {
            round_id,
            request_type,
            answer_index,
        };
        // Seed a zero-token row immediately, per §4.3.3's "emit a zero-token
        // LiveReasoningProgress" step.
        store.upsert_live_reasoning_progress(key.clone(), model_id.clone(), 0);
        Self {
            store,
            key,
            model_id,
            last_write_at: None,
        }
    }

    fn should_write(&self, now: Time, finalized: bool) -> bool {
        if finalized {
            return true;
        }
        match self.last_write_at {
            Some(last) => last.elapsed_since(now) >= constants::REASONING_PROGRESS_COALESCE_MS,
            None => true,
        }
    }

    /// Finalizes the row at the end of a phase, per P10: `finalized=true`
    /// and the estimate at least matching the provider-reported count when
    /// known. `final_tokens` should already reflect the larger of the two
    /// when the caller has a provider-reported figure.
    pub fn finalize(&mut self, final_tokens: u64) {
        self.store.finalize_live_reasoning_progress(&self.key, final_tokens);
    }
}

impl ProgressSink for ReasoningSink {
    fn on_progress(&mut self, estimated_reasoning_tokens: u64, finalized: bool) {
        let now = Time::now();
        if !self.should_write(now, finalized) {
            return;
        }
        if finalized {
            self.store
                .finalize_live_reasoning_progress(&self.key, estimated_reasoning_tokens);
        } else {
            self.store.upsert_live_reasoning_progress(
                self.key.clone(),
                self.model_id.clone(),
                estimated_reasoning_tokens,
            );
        }
        self.last_write_at = Some(now);
    }
}
