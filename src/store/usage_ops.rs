//! Usage & Bootstrap Recorder mutations: append-only usage accounting and
//! projection-bootstrap run bookkeeping (§4.9).

use super::EngineStore;
use crate::config::constants;
use crate::types::{BootstrapRun, LlmUsageEvent, ModelId, RequestType, Time};

impl EngineStore {
    /// `recordUsage` (§4.9): appends a usage event. Always succeeds; usage
    /// accounting is best-effort and never blocks the round driver.
    pub fn record_usage(&self, event: LlmUsageEvent) {
        self.inner.lock().usage_events.push(event);
    }

    /// Counts non-error samples recorded for `(model, request_type)` in the
    /// current generation and `metrics_epoch`, used by the bootstrap to
    /// decide whether [`constants::BOOTSTRAP_MIN_SAMPLES`] has been met
    /// (§4.9).
    #[must_use]
    pub fn usage_sample_count(
        &self,
        model_id: &ModelId,
        request_type: RequestType,
        metrics_epoch: u64,
    ) -> usize {
        let g = self.inner.lock();
        let generation = g.engine_state.generation;
        g.usage_events
            .iter()
            .filter(|e| {
                e.generation == generation
                    && &e.model_id == model_id
                    && e.request_type == request_type
                    && e.metrics_epoch == metrics_epoch
            })
            .count()
    }

    /// Starts a bootstrap run, unless one is already in flight and not
    /// stale (§4.9). Returns the assigned run id on success.
    pub fn start_bootstrap_run(&self, now: Time) -> Option<u64> {
        let mut g = self.inner.lock();
        if let Some(existing) = &g.engine_state.bootstrap_run {
            let stale = existing.started_at.elapsed_since(now) > constants::BOOTSTRAP_STALE_MS;
            if !stale {
                return None;
            }
        }
        let run_id = crate::types::RoundId::new().0;
        g.engine_state.bootstrap_run = Some(BootstrapRun {
            run_id,
            generation: g.engine_state.generation,
            started_at: now,
        });
        Some(run_id)
    }

    /// Clears the in-flight bootstrap run, if it is still the one named by
    /// `run_id` (guards against a stale completion racing a `reset`).
    pub fn finish_bootstrap_run(&self, run_id: u64) {
        let mut g = self.inner.lock();
        if g.engine_state.bootstrap_run.as_ref().is_some_and(|r| r.run_id == run_id) {
            g.engine_state.bootstrap_run = None;
        }
    }
}
