//! End-to-end scenario coverage for the round lifecycle. Most scenarios
//! drive [`jestloop::store::EngineStore`] directly with an explicit `Time`
//! at each step, exactly as [`jestloop::driver::RoundDriver::tick`] would,
//! so outcomes are exact and no test depends on wall-clock sleeps.
//!
//! `driver.tick()` itself is only exercised where the prompting/answering
//! phases are what's under test (S2); a round that reaches voting always
//! goes through the store calls directly instead, since `run_voting_phase`
//! both polls the viewer-voting window with real sleeps when no viewers are
//! present and randomizes answer display order with an unseeded
//! `fastrand::bool()` that would make which side a scripted vote lands on
//! nondeterministic.

use jestloop::config::constants;
use jestloop::driver::RoundDriver;
use jestloop::estimator::ReasoningEstimator;
use jestloop::lease::LeaseManager;
use jestloop::llm_adapter::{LlmAdapter, ScriptedAdapter};
use jestloop::store::EngineStore;
use jestloop::types::{
    LlmCallMetrics, Model, ModelId, Phase, RunsMode, Side, SkipType, Time, ViewerId,
    ViewerVotingMode, VoteCastStatus,
};
use std::sync::Arc;

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

fn driver_with(store: Arc<EngineStore>, adapter: Arc<dyn LlmAdapter>) -> RoundDriver {
    let lease = Arc::new(LeaseManager::new(Arc::clone(&store), constants::RUNNER_LEASE_MS));
    RoundDriver::new(store, lease, adapter, Arc::new(ReasoningEstimator::new()))
}

/// S1 "Happy round": four active models, a full prompt/answer/vote cycle
/// with no failures, a single model voter picking the first contestant.
/// Driven directly against the store (rather than `driver.tick()`) so the
/// vote lands on a known side: `run_voting_phase` randomizes display order
/// with an unseeded `fastrand::bool()`, which would make the winning side
/// nondeterministic if the scripted adapter's call were exercised instead.
#[test]
fn s1_happy_round_scores_the_winning_contestant() {
    let store = EngineStore::new();
    for id in ["p", "a", "b", "v"] {
        store.upsert_model(model(id));
    }
    let now = Time::from_millis(0);
    let (round_id, _) = store
        .create_round(0, ModelId("p".into()), [ModelId("a".into()), ModelId("b".into())], now)
        .unwrap();
    store
        .set_prompt_result(0, round_id, "what's the deal with airline food?".to_string(), LlmCallMetrics::default(), now)
        .unwrap();
    store.start_answering(0, round_id, now).unwrap();
    store
        .set_answer_result(0, round_id, Side::A, "it's mysterious".to_string(), None, Some(LlmCallMetrics::default()), now)
        .unwrap();
    store
        .set_answer_result(0, round_id, Side::B, "no comment".to_string(), None, Some(LlmCallMetrics::default()), now)
        .unwrap();
    store
        .start_voting(0, round_id, vec![ModelId("v".into())], now.plus_millis(30_000), 30_000, ViewerVotingMode::Active, now)
        .unwrap();
    store.set_model_vote(0, round_id, 0, Some(Side::A), now).unwrap();
    store.finalize_round(0, round_id, now.plus_millis(1_000)).unwrap();

    let state = store.get_state();
    assert_eq!(state.completed_rounds, 1);
    assert!(state.active_round_id.is_none());
    assert_eq!(state.scores.get("a"), Some(&1));
    let round_id = state.last_completed_round_id.expect("a round completed");
    let round = store.get_round(round_id).expect("round document exists");
    assert_eq!(round.phase, Phase::Done);
    assert!(!round.skipped);
    assert_eq!(round.score_a, Some(100));
    assert_eq!(round.score_b, Some(0));
}

/// S2 "Prompt failure": the prompter is scripted to fail every attempt;
/// the round is skipped with `skip_type=PromptError` and `completed_rounds`
/// does not advance (only successful rounds count toward it, per
/// `finalize_round`'s bookkeeping; `set_prompt_error` leaves it untouched).
#[test]
fn s2_prompt_failure_skips_the_round_without_voting() {
    let store = Arc::new(EngineStore::new());
    for id in ["p", "a", "b"] {
        store.upsert_model(model(id));
    }
    let mut fail_models = std::collections::HashSet::new();
    fail_models.insert(ModelId("p".into()));
    let adapter: Arc<dyn LlmAdapter> = Arc::new(ScriptedAdapter {
        fail_models,
        vote_first_wins: true,
    });
    let driver = driver_with(Arc::clone(&store), adapter);

    let delay = driver.tick();

    assert_eq!(delay, std::time::Duration::from_millis(constants::SKIPPED_ROUND_DELAY_MS));
    let state = store.get_state();
    assert_eq!(state.completed_rounds, 0);
    let round_id = state.last_completed_round_id.expect("a round was recorded as skipped");
    let round = store.get_round(round_id).unwrap();
    assert!(round.skipped);
    assert_eq!(round.skip_type, Some(SkipType::PromptError));
    assert!(round.votes.is_empty());
}

/// S3 "Answer timeout" (modeled directly against Stale-Phase Recovery
/// rather than a real 60s sleep): a round stuck in `answering` past
/// `ANSWER_STALE_MS` is recovered with `skip_type=AnswerError` and never
/// reaches voting.
#[test]
fn s3_stale_answering_round_is_recovered_without_voting() {
    let store = EngineStore::new();
    let start = Time::from_millis(0);
    let (round_id, _) = store
        .create_round(0, ModelId("p".into()), [ModelId("a".into()), ModelId("b".into())], start)
        .unwrap();
    store.start_answering(0, round_id, start).unwrap();

    let later = start.plus_millis(constants::ANSWER_STALE_MS + 1);
    let (recovered, _) = jestloop::recovery::recover_stale_active_round(&store, 0, later);

    assert!(recovered);
    let round = store.get_round(round_id).unwrap();
    assert_eq!(round.phase, Phase::Done);
    assert!(round.skipped);
    assert_eq!(round.skip_type, Some(SkipType::AnswerError));
    assert!(round.votes.is_empty());
    assert!(store.get_state().active_round_id.is_none());
}

/// S4 "Viewer arrives mid-IDLE": a round starts voting with no viewers
/// present (120s window); a heartbeat shortens the deadline to `now +
/// 30s` exactly once, and a later heartbeat does not extend it further.
#[test]
fn s4_viewer_arrival_shortens_idle_voting_window_once() {
    let store = EngineStore::new();
    let now = Time::from_millis(0);
    let (round_id, _) = store
        .create_round(0, ModelId("p".into()), [ModelId("a".into()), ModelId("b".into())], now)
        .unwrap();
    store.start_answering(0, round_id, now).unwrap();
    store
        .start_voting(
            0,
            round_id,
            vec![ModelId("c".into())],
            now.plus_millis(constants::VIEWER_VOTE_WINDOW_IDLE_MS),
            constants::VIEWER_VOTE_WINDOW_IDLE_MS,
            ViewerVotingMode::Idle,
            now,
        )
        .unwrap();

    let t10 = now.plus_millis(10_000);
    let hb = store.heartbeat(ViewerId("viewer-1".into()), "live", t10).unwrap();
    assert!(hb.crossed_zero);
    jestloop::voting_window::maybe_shorten_voting_window(&store, round_id, store.viewer_count(), t10);

    let round = store.get_round(round_id).unwrap();
    assert_eq!(round.viewer_voting_mode, Some(ViewerVotingMode::Active));
    let shortened = round.viewer_voting_ends_at.unwrap();
    assert_eq!(shortened, t10.plus_millis(constants::VIEWER_VOTE_WINDOW_ACTIVE_MS));

    let t20 = now.plus_millis(20_000);
    store.heartbeat(ViewerId("viewer-2".into()), "live", t20).unwrap();
    jestloop::voting_window::maybe_shorten_voting_window(&store, round_id, store.viewer_count(), t20);
    let round = store.get_round(round_id).unwrap();
    assert_eq!(round.viewer_voting_ends_at.unwrap(), shortened);
}

/// S5 "Change of vote": a viewer votes A, then changes to B before the
/// deadline; tallies move with the change. A vote cast after the deadline
/// is rejected and leaves tallies untouched.
#[test]
fn s5_change_of_vote_moves_tally_and_late_vote_is_rejected() {
    let store = EngineStore::new();
    let now = Time::from_millis(0);
    let (round_id, _) = store
        .create_round(0, ModelId("p".into()), [ModelId("a".into()), ModelId("b".into())], now)
        .unwrap();
    store.start_answering(0, round_id, now).unwrap();
    store
        .start_voting(
            0,
            round_id,
            vec![ModelId("c".into())],
            now.plus_millis(30_000),
            30_000,
            ViewerVotingMode::Active,
            now,
        )
        .unwrap();

    let viewer = ViewerId("u".into());
    let status = store.cast_viewer_vote(round_id, viewer.clone(), Side::A, now.plus_millis(5_000));
    assert_eq!(status, VoteCastStatus::Accepted);

    // Voting again for the same side before the deadline is a no-op; the
    // change to B is what exercises the tally-compensation path (verified
    // directly against the store's internal tallies by the crate's own
    // `cast_vote_is_idempotent_and_supports_change` unit test).
    let status = store.cast_viewer_vote(round_id, viewer.clone(), Side::B, now.plus_millis(10_000));
    assert_eq!(status, VoteCastStatus::Updated);

    let status = store.cast_viewer_vote(round_id, viewer.clone(), Side::B, now.plus_millis(20_000));
    assert_eq!(status, VoteCastStatus::Unchanged);

    let status = store.cast_viewer_vote(round_id, viewer, Side::A, now.plus_millis(40_000));
    assert_eq!(status, VoteCastStatus::Inactive);
}

/// S6 "Lease takeover": a round left mid-voting by a vanished driver is
/// picked up by a fresh lease holder once the vote deadline has passed;
/// `recover_stale_active_round` finalizes it inline, exactly as the next
/// `runLoop` entry would.
#[test]
fn s6_lease_takeover_finalizes_an_abandoned_voting_round() {
    let store = Arc::new(EngineStore::new());
    let now = Time::from_millis(0);
    let d1_lease = LeaseManager::new(Arc::clone(&store), 60_000);
    assert!(d1_lease.ensure_started(now));

    let (round_id, _) = store
        .create_round(0, ModelId("p".into()), [ModelId("a".into()), ModelId("b".into())], now)
        .unwrap();
    store.start_answering(0, round_id, now).unwrap();
    store
        .start_voting(0, round_id, vec![ModelId("c".into())], now.plus_millis(30_000), 30_000, ViewerVotingMode::Active, now)
        .unwrap();

    // D1's process vanishes: no further renewals happen on its behalf.
    let after_expiry = now.plus_millis(constants::RUNNER_LEASE_MS + 1_000);
    let d2_lease = LeaseManager::new(Arc::clone(&store), 60_000);
    assert!(d2_lease.ensure_started(after_expiry));
    assert_ne!(d1_lease.current(), d2_lease.current());

    let after_vote_deadline = now.plus_millis(60_000);
    let (recovered, _) = jestloop::recovery::recover_stale_active_round(&store, 0, after_vote_deadline);

    assert!(recovered);
    let round = store.get_round(round_id).unwrap();
    assert_eq!(round.phase, Phase::Done);
    assert!(!round.skipped);
    assert!(store.get_state().active_round_id.is_none());
}

/// S7 "Reset cascade": resetting bumps the generation, pauses the engine,
/// clears scoreboards and the active round, and the old generation's rows
/// are fully drained by repeated `purge_generation_batch` calls.
#[test]
fn s7_reset_bumps_generation_and_drains_old_rows_in_batches() {
    let store = EngineStore::new();
    let now = Time::from_millis(0);
    for i in 0..5u64 {
        let (round_id, _) = store
            .create_round(0, ModelId("p".into()), [ModelId("a".into()), ModelId("b".into())], now)
            .unwrap();
        store.start_answering(0, round_id, now).unwrap();
        store
            .start_voting(0, round_id, vec![ModelId("c".into())], now.plus_millis(1_000), 1_000, ViewerVotingMode::Active, now)
            .unwrap();
        store.finalize_round(0, round_id, now.plus_millis(1_000 + i)).unwrap();
    }
    assert_eq!(store.get_state().completed_rounds, 5);

    let old_generation = store.reset();
    assert_eq!(old_generation, 0);

    let state = store.get_state();
    assert_eq!(state.generation, 1);
    assert!(state.is_paused);
    assert!(state.active_round_id.is_none());
    assert!(state.scores.is_empty());
    assert!(state.human_scores.is_empty());

    let mut drained = 0usize;
    while store.generation_has_remaining_rows(old_generation) {
        let removed = store.purge_generation_batch(old_generation, 2);
        assert!(removed > 0, "batch must make progress while rows remain");
        drained += removed;
        assert!(drained <= 5, "must not purge more than the old generation's own rows");
    }
    assert_eq!(drained, 5);
    assert!(!store.generation_has_remaining_rows(old_generation));
}

/// A finite run stops creating new rounds once its target is reached
/// (supplements S1-S7 with the `RunsMode::Finite` bookkeeping `finalize_round`
/// performs on every completion). The first round is driven directly against
/// the store, for the same reason S1 is: `driver.tick()` would run a real
/// voting-window poll with no viewers present. `driver.tick()` is only used
/// for the second call, which must observe `state.done` and return
/// immediately without touching the voting phase at all.
#[test]
fn finite_run_marks_engine_done_after_its_target_round_count() {
    let store = Arc::new(EngineStore::new());
    for id in ["p", "a", "b"] {
        store.upsert_model(model(id));
    }
    {
        let mut g = store.inner.lock();
        g.engine_state.runs_mode = RunsMode::Finite;
        g.engine_state.total_rounds = Some(1);
    }

    let now = Time::from_millis(0);
    let (round_id, _) = store
        .create_round(0, ModelId("p".into()), [ModelId("a".into()), ModelId("b".into())], now)
        .unwrap();
    store
        .set_prompt_result(0, round_id, "prompt".to_string(), LlmCallMetrics::default(), now)
        .unwrap();
    store.start_answering(0, round_id, now).unwrap();
    store
        .set_answer_result(0, round_id, Side::A, "answer a".to_string(), None, Some(LlmCallMetrics::default()), now)
        .unwrap();
    store
        .set_answer_result(0, round_id, Side::B, "answer b".to_string(), None, Some(LlmCallMetrics::default()), now)
        .unwrap();
    store
        .start_voting(0, round_id, vec![], now.plus_millis(1_000), 1_000, ViewerVotingMode::Idle, now)
        .unwrap();
    store.finalize_round(0, round_id, now.plus_millis(2_000)).unwrap();

    let state = store.get_state();
    assert_eq!(state.completed_rounds, 1);
    assert!(state.done);

    let adapter: Arc<dyn LlmAdapter> = Arc::new(ScriptedAdapter::new());
    let driver = driver_with(Arc::clone(&store), adapter);
    let delay = driver.tick();
    assert_eq!(delay, std::time::Duration::from_millis(constants::IDLE_RESCHEDULE_MS));
    assert_eq!(store.get_state().completed_rounds, 1);
}
