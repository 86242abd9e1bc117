//! Round Driver (§4.3): the main loop. One [`RoundDriver::tick`] call drives
//! at most one round forward (or recovers a stale one) and returns how long
//! the caller should wait before calling it again.

mod answering;
mod prompting;
mod select;
mod voting;

use self::answering::run_answering_phase;
use self::prompting::run_prompting_phase;
use self::select::select_participants;
use self::voting::run_voting_phase;
use crate::config::constants;
use crate::estimator::ReasoningEstimator;
use crate::lease::LeaseManager;
use crate::llm_adapter::LlmAdapter;
use crate::recovery::recover_stale_active_round;
use crate::store::EngineStore;
use crate::types::Time;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Owns the pieces a single `runLoop` iteration needs: the store, the held
/// lease, the LLM collaborator, and the reasoning-token estimator shared
/// with the reasoning sink.
pub struct RoundDriver {
    store: Arc<EngineStore>,
    lease: Arc<LeaseManager>,
    adapter: Arc<dyn LlmAdapter>,
    estimator: Arc<ReasoningEstimator>,
}

impl RoundDriver {
    #[must_use]
    pub fn new(
        store: Arc<EngineStore>,
        lease: Arc<LeaseManager>,
        adapter: Arc<dyn LlmAdapter>,
        estimator: Arc<ReasoningEstimator>,
    ) -> Self {
        Self {
            store,
            lease,
            adapter,
            estimator,
        }
    }

    /// Runs `tick` in a loop until `shutdown` is set, sleeping the
    /// reschedule delay in short increments so shutdown is observed
    /// promptly even during a long idle wait.
    pub fn run(&self, shutdown: &AtomicBool) {
        while !shutdown.load(Ordering::Relaxed) {
            let delay = self.tick();
            let mut remaining = delay;
            let step = Duration::from_millis(200);
            while remaining > Duration::ZERO {
                if shutdown.load(Ordering::Relaxed) {
                    return;
                }
                let sleep_for = remaining.min(step);
                std::thread::sleep(sleep_for);
                remaining = remaining.saturating_sub(sleep_for);
            }
        }
    }

    /// `runLoop(leaseId)` (§4.3): executes at most one round's worth of
    /// progress, returning the delay the caller should wait before the next
    /// call.
    pub fn tick(&self) -> Duration {
        let now = Time::now();
        self.lease.ensure_started(now);
        let Some(_lease_id) = self.lease.current() else {
            return Duration::from_millis(constants::IDLE_RESCHEDULE_MS);
        };

        let state = self.store.get_state();
        if state.done {
            return Duration::from_millis(constants::IDLE_RESCHEDULE_MS);
        }
        let expected_generation = state.generation;

        if !self.lease.renew(now) && !self.lease.still_valid(expected_generation, now) {
            return Duration::from_millis(constants::IDLE_RESCHEDULE_MS);
        }

        if state.is_paused {
            return Duration::from_millis(constants::IDLE_RESCHEDULE_MS);
        }

        if state.active_round_id.is_some() {
            let (recovered, reason) = recover_stale_active_round(&self.store, expected_generation, now);
            if recovered {
                info!(reason = %reason, "stale-phase recovery acted on the active round");
                return Duration::ZERO;
            }
            return Duration::from_millis(constants::SPR_RETRY_MS);
        }

        let active_models = self.store.active_models();
        if active_models.len() < constants::MIN_ACTIVE_MODELS {
            return Duration::from_millis(constants::IDLE_RESCHEDULE_MS);
        }

        let participants = match select_participants(&active_models) {
            Ok(p) => p,
            Err(_) => return Duration::from_millis(constants::IDLE_RESCHEDULE_MS),
        };

        let (round_id, num) = match self.store.create_round(
            expected_generation,
            participants.prompter.clone(),
            participants.contestants.clone(),
            now,
        ) {
            Ok(v) => v,
            Err(_) => return Duration::from_millis(constants::CREATE_ROUND_RETRY_MS),
        };
        info!(round.num = num, round.generation = expected_generation, "round created");

        if run_prompting_phase(
            &self.store,
            self.lease.as_ref(),
            self.adapter.as_ref(),
            &self.estimator,
            expected_generation,
            round_id,
            expected_generation,
            &participants.prompter,
        )
        .is_err()
        {
            return Duration::from_millis(constants::SKIPPED_ROUND_DELAY_MS);
        }

        let prompt = self
            .store
            .get_round_for_runner(round_id)
            .and_then(|r| r.prompt)
            .unwrap_or_default();

        match run_answering_phase(
            &self.store,
            self.lease.as_ref(),
            self.adapter.as_ref(),
            &self.estimator,
            expected_generation,
            round_id,
            expected_generation,
            &participants.contestants,
            &prompt,
        ) {
            Ok(true) => {}
            Ok(false) => {
                let _ = self.store.mark_round_answer_error(
                    expected_generation,
                    round_id,
                    "one or both contestants failed to answer".to_string(),
                    Time::now(),
                );
                return Duration::from_millis(constants::SKIPPED_ROUND_DELAY_MS);
            }
            Err(e) => {
                warn!(round = %round_id, error = %e, "answering phase aborted before completion");
                return Duration::from_millis(constants::SKIPPED_ROUND_DELAY_MS);
            }
        }

        let (answer_a, answer_b) = self
            .store
            .get_round_for_runner(round_id)
            .map(|r| {
                (
                    r.answer_tasks[0].result.clone().unwrap_or_default(),
                    r.answer_tasks[1].result.clone().unwrap_or_default(),
                )
            })
            .unwrap_or_default();

        run_voting_phase(
            &self.store,
            &self.lease,
            self.adapter.as_ref(),
            expected_generation,
            round_id,
            &participants.voters,
            &prompt,
            &answer_a,
            &answer_b,
        );

        match self.store.finalize_round(expected_generation, round_id, Time::now()) {
            Ok(()) => info!(round = %round_id, "round finalized"),
            Err(e) => warn!(round = %round_id, error = %e, "finalize skipped, likely already closed by recovery"),
        }

        Duration::from_millis(constants::POST_ROUND_DELAY_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_adapter::ScriptedAdapter;
    use crate::types::{Model, ModelId};

    fn model(id: &str) -> Model {
        Model {
            id: ModelId(id.to_string()),
            name: id.to_string(),
            color: "#000".into(),
            logo_id: "logo".into(),
            reasoning_effort: None,
            metrics_epoch: 0,
            enabled: true,
            archived_at: None,
            can_prompt: true,
            can_answer: true,
            can_vote: true,
        }
    }

    fn driver_with_models(n: usize) -> RoundDriver {
        let store = Arc::new(EngineStore::new());
        for i in 0..n {
            store.upsert_model(model(&format!("m{i}")));
        }
        let lease = Arc::new(LeaseManager::new(Arc::clone(&store), 60_000));
        let adapter: Arc<dyn LlmAdapter> = Arc::new(ScriptedAdapter::new());
        let estimator = Arc::new(ReasoningEstimator::new());
        RoundDriver::new(store, lease, adapter, estimator)
    }

    #[test]
    fn idles_with_too_few_active_models() {
        let driver = driver_with_models(2);
        let delay = driver.tick();
        assert_eq!(delay, Duration::from_millis(constants::IDLE_RESCHEDULE_MS));
        assert!(driver.store.get_state().active_round_id.is_none());
    }

    #[test]
    fn runs_a_full_round_to_completion() {
        let driver = driver_with_models(3);
        let delay = driver.tick();
        assert_eq!(delay, Duration::from_millis(constants::POST_ROUND_DELAY_MS));
        let state = driver.store.get_state();
        assert!(state.active_round_id.is_none());
        assert_eq!(state.completed_rounds, 1);
        assert!(state.last_completed_round_id.is_some());
    }

    #[test]
    fn paused_engine_idles_without_creating_a_round() {
        let driver = driver_with_models(3);
        driver.store.pause();
        let delay = driver.tick();
        assert_eq!(delay, Duration::from_millis(constants::IDLE_RESCHEDULE_MS));
        assert!(driver.store.get_state().active_round_id.is_none());
    }
}
