//! `Engine`: the process-level assembly of every component named in §2,
//! wiring the round driver, presence reaper, and projection bootstrap into
//! background threads and exposing the handful of operations the HTTP
//! surface (§6) and chat bridge need (§4.4 admin mutations, §4.8 viewer
//! aggregates).

use crate::bootstrap::BootstrapScheduler;
use crate::config::{constants, EngineConfig};
use crate::driver::RoundDriver;
use crate::estimator::ReasoningEstimator;
use crate::lease::LeaseManager;
use crate::llm_adapter::LlmAdapter;
use crate::observability::Metrics;
use crate::store::{EngineStore, HeartbeatResult};
use crate::types::{
    AdminSnapshot, LivePayload, LivePayloadData, RunBlockedReason, Side, Time, ViewerId,
    VoteCastStatus,
};
use crate::voting_window::maybe_shorten_voting_window;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::info;

/// Sleeps `total_ms`, checking `shutdown` every 200 ms so threads stop
/// promptly instead of only at the end of a long idle wait.
fn sleep_interruptible(total_ms: u64, shutdown: &AtomicBool) {
    let mut remaining = Duration::from_millis(total_ms);
    let step = Duration::from_millis(200);
    while remaining > Duration::ZERO {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        let this_step = remaining.min(step);
        std::thread::sleep(this_step);
        remaining = remaining.saturating_sub(this_step);
    }
}

/// Owns every long-lived piece of engine state and the background threads
/// that drive it. Cloning is not supported; share via `Arc<Engine>`.
pub struct Engine {
    pub store: Arc<EngineStore>,
    pub lease: Arc<LeaseManager>,
    pub config: EngineConfig,
    pub metrics: Arc<Metrics>,
    adapter: Arc<dyn LlmAdapter>,
    estimator: Arc<ReasoningEstimator>,
    shutdown: Arc<AtomicBool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    #[must_use]
    pub fn new(config: EngineConfig, adapter: Arc<dyn LlmAdapter>) -> Self {
        let store = Arc::new(EngineStore::new());
        let lease = Arc::new(LeaseManager::new(Arc::clone(&store), constants::RUNNER_LEASE_MS));
        Self {
            store,
            lease,
            config,
            metrics: Arc::new(Metrics::new()),
            adapter,
            estimator: Arc::new(ReasoningEstimator::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the round driver, presence reaper, and projection bootstrap
    /// as background threads (§9: "a per-process goroutine/task that calls
    /// `runLoop`... the reaper and the platform poller become periodic
    /// tasks with their own context").
    pub fn start(self: &Arc<Self>) {
        let mut threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());

        threads.push(self.spawn_driver_thread());
        threads.push(self.spawn_reaper_thread());
        threads.push(self.spawn_bootstrap_thread());
    }

    fn spawn_driver_thread(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let driver = RoundDriver::new(
            Arc::clone(&engine.store),
            Arc::clone(&engine.lease),
            Arc::clone(&engine.adapter),
            Arc::clone(&engine.estimator),
        );
        std::thread::spawn(move || {
            while !engine.shutdown.load(Ordering::Relaxed) {
                let before = engine.store.get_state();
                let delay = driver.tick();
                let after = engine.store.get_state();
                engine.record_round_metrics(&before, &after);
                sleep_interruptible(delay.as_millis() as u64, &engine.shutdown);
            }
        })
    }

    fn record_round_metrics(&self, before: &crate::types::EngineState, after: &crate::types::EngineState) {
        if after.completed_rounds > before.completed_rounds {
            if let Some(id) = after.last_completed_round_id {
                if let Some(round) = self.store.get_round(id) {
                    if round.skipped {
                        match round.skip_type {
                            Some(crate::types::SkipType::PromptError) => {
                                self.metrics.rounds_skipped_prompt_error.inc();
                            }
                            Some(crate::types::SkipType::AnswerError) => {
                                self.metrics.rounds_skipped_answer_error.inc();
                            }
                            None => {}
                        }
                    } else {
                        self.metrics.rounds_completed.inc();
                    }
                }
            }
        }
        if after.active_round_id.is_some() && before.active_round_id != after.active_round_id {
            self.metrics.rounds_created.inc();
        }
    }

    fn spawn_reaper_thread(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        std::thread::spawn(move || {
            while !engine.shutdown.load(Ordering::Relaxed) {
                let now = Time::now();
                let mut total = 0usize;
                loop {
                    let reaped = engine.store.reap_expired(now, constants::REAP_BATCH_LIMIT);
                    total += reaped;
                    if reaped < constants::REAP_BATCH_LIMIT || total >= constants::REAP_BATCH_MAX {
                        break;
                    }
                }
                if total > 0 {
                    engine.metrics.reaper_rows_expired.add(total as u64);
                }
                let next_delay = if total >= constants::REAP_BATCH_MAX { 0 } else { constants::REAP_SCHEDULE_MS };
                sleep_interruptible(next_delay, &engine.shutdown);
            }
        })
    }

    fn spawn_bootstrap_thread(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let concurrency = engine.config.bootstrap_model_concurrency;
        let scheduler = BootstrapScheduler::new(Arc::clone(&engine.store), Arc::clone(&engine.adapter), concurrency);
        std::thread::spawn(move || {
            while !engine.shutdown.load(Ordering::Relaxed) {
                scheduler.run_once(Time::now());
                sleep_interruptible(constants::BOOTSTRAP_STALE_MS.min(60_000), &engine.shutdown);
            }
        })
    }

    /// Signals every background thread to stop at its next suspension
    /// point and waits for them to exit.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let handles: Vec<JoinHandle<()>> = {
            let mut threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *threads)
        };
        for handle in handles {
            let _ = handle.join();
        }
        info!("engine shut down");
    }

    /// `heartbeat(viewerId, page)` (§4.8) plus its Voting Window Controller
    /// side effect (§4.7): a heartbeat that moves the total from 0 to >=1
    /// asks the VWC to shorten the active round's deadline if present.
    pub fn heartbeat(&self, viewer_id: ViewerId, page: &str, now: Time) -> Option<HeartbeatResult> {
        let result = self.store.heartbeat(viewer_id, page, now)?;
        if result.crossed_zero {
            if let Some(round_id) = self.store.get_state().active_round_id {
                maybe_shorten_voting_window(&self.store, round_id, self.store.viewer_count(), now);
            }
        }
        Some(result)
    }

    /// `castVote(viewerId, side)` (§4.8): routes to the active round, or
    /// reports `Inactive` if there is none.
    #[must_use]
    pub fn cast_vote(&self, viewer_id: ViewerId, side: Side) -> VoteCastStatus {
        let now = Time::now();
        let Some(round_id) = self.store.get_state().active_round_id else {
            return VoteCastStatus::Inactive;
        };
        let status = self.store.cast_viewer_vote(round_id, viewer_id, side, now);
        if matches!(status, VoteCastStatus::Accepted | VoteCastStatus::Updated) {
            self.metrics.viewer_votes_cast.inc();
            maybe_shorten_voting_window(&self.store, round_id, self.store.viewer_count(), now);
        }
        status
    }

    /// Admin `pause` (§4.4).
    pub fn pause(&self) {
        self.store.pause();
    }

    /// Admin `resume` (§4.4): clears pause/done and ensures a lease is
    /// held so the driver thread's next tick can proceed.
    pub fn resume(&self, now: Time) {
        self.store.resume();
        self.lease.ensure_started(now);
        if self.lease.current().is_some() {
            self.metrics.lease_acquisitions.inc();
        }
    }

    /// Admin `reset` (§4.4): bumps generation and kicks off the cascaded
    /// purge of the old generation's rows in a detached background
    /// thread, paginated exactly as `purge_generation_batch` prescribes.
    pub fn reset(self: &Arc<Self>) -> u64 {
        let old_generation = self.store.reset();
        let engine = Arc::clone(self);
        std::thread::spawn(move || {
            while engine.store.generation_has_remaining_rows(old_generation) {
                if engine.shutdown.load(Ordering::Relaxed) {
                    return;
                }
                let removed = engine.store.purge_generation_batch(old_generation, constants::PURGE_BATCH_SIZE);
                engine.metrics.purge_rows_deleted.add(removed as u64);
                if removed == 0 {
                    break;
                }
            }
        });
        old_generation
    }

    /// Builds the `/admin/status` (and pause/resume/reset echo) payload (§6).
    #[must_use]
    pub fn admin_snapshot(&self) -> AdminSnapshot {
        let state = self.store.get_state();
        let active_models = self.store.active_models();
        let run_blocked_reason = if state.done {
            RunBlockedReason::Done
        } else if state.is_paused {
            RunBlockedReason::Paused
        } else if active_models.len() < constants::MIN_ACTIVE_MODELS {
            RunBlockedReason::InsufficientActiveModels
        } else {
            RunBlockedReason::None
        };

        AdminSnapshot {
            is_paused: state.is_paused,
            is_running_round: state.active_round_id.is_some(),
            done: state.done,
            completed_in_memory: state.completed_rounds,
            persisted_rounds: state.completed_rounds,
            viewer_count: self.store.viewer_count(),
            active_model_count: active_models.len() as u64,
            can_run_rounds: run_blocked_reason == RunBlockedReason::None,
            run_blocked_reason,
            enabled_model_ids: state.enabled_model_ids,
        }
    }

    /// Builds the `live` read payload (§6): scores, active/last-completed
    /// rounds, and catalog, for the thin read layer the core feeds.
    #[must_use]
    pub fn live_payload(&self) -> LivePayload {
        let state = self.store.get_state();
        let active = state.active_round_id.and_then(|id| self.store.get_round(id));
        let last_completed = state
            .last_completed_round_id
            .and_then(|id| self.store.get_round(id));

        LivePayload {
            data: LivePayloadData {
                active,
                last_completed,
                scores: state.scores,
                human_scores: state.human_scores,
                human_vote_totals: state.human_vote_totals,
                models: self.store.all_models(),
                enabled_model_ids: state.enabled_model_ids,
                done: state.done,
                is_paused: state.is_paused,
                generation: state.generation,
                completed_rounds: state.completed_rounds,
            },
            total_rounds: state.total_rounds,
            viewer_count: self.store.viewer_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_adapter::ScriptedAdapter;
    use crate::types::ModelId;

    fn test_engine() -> Arc<Engine> {
        let mut config = EngineConfig::from_env();
        config.admin_passcode = "secret".to_string();
        Arc::new(Engine::new(config, Arc::new(ScriptedAdapter::new())))
    }

    #[test]
    fn heartbeat_shortens_active_round_window() {
        let engine = test_engine();
        for i in 0..3 {
            engine.store.upsert_model(crate::types::Model {
                id: ModelId(format!("m{i}")),
                name: format!("m{i}"),
                color: "#000".into(),
                logo_id: "logo".into(),
                reasoning_effort: None,
                metrics_epoch: 0,
                enabled: true,
                archived_at: None,
                can_prompt: true,
                can_answer: true,
                can_vote: true,
            });
        }
        let now = Time::from_millis(0);
        let (round_id, _) = engine
            .store
            .create_round(0, ModelId("m0".into()), [ModelId("m1".into()), ModelId("m2".into())], now)
            .unwrap();
        engine.store.start_answering(0, round_id, now).unwrap();
        engine
            .store
            .start_voting(
                0,
                round_id,
                vec![ModelId("m0".into())],
                now.plus_millis(constants::VIEWER_VOTE_WINDOW_IDLE_MS),
                constants::VIEWER_VOTE_WINDOW_IDLE_MS,
                crate::types::ViewerVotingMode::Idle,
                now,
            )
            .unwrap();

        engine.heartbeat(ViewerId("v1".into()), "live", now);

        let round = engine.store.get_round(round_id).unwrap();
        assert_eq!(
            round.viewer_voting_ends_at.unwrap(),
            now.plus_millis(constants::VIEWER_VOTE_WINDOW_ACTIVE_MS)
        );
    }

    #[test]
    fn reset_schedules_purge_and_returns_old_generation() {
        let engine = test_engine();
        let old = engine.reset();
        assert_eq!(old, 0);
        assert_eq!(engine.store.get_state().generation, 1);
    }

    #[test]
    fn snapshot_reports_insufficient_models_when_below_threshold() {
        let engine = test_engine();
        let snapshot = engine.admin_snapshot();
        assert_eq!(snapshot.run_blocked_reason, RunBlockedReason::InsufficientActiveModels);
        assert!(!snapshot.can_run_rounds);
    }
}
