//! Voting phase (§4.3.5): assigns voters, fans the voter LLM calls out over
//! `std::thread::scope`, then lets the viewer-voting window run out (or the
//! round otherwise leave `voting`) before finalizing.
//!
//! The source runs the voter calls and the viewer-window poll loop fully
//! concurrently and abandons a still-running vote fan-out past a 300 ms
//! grace window. A blocking-thread port can't abandon a `thread::scope`
//! worker without detaching it onto a `'static` thread; since the adapter
//! already bounds every call to `MODEL_ATTEMPTS * MODEL_CALL_TIMEOUT_MS`
//! plus backoff, the fan-out is always joined here before the window poll
//! begins. Votes simply land before the window closes in the common case;
//! a straggler that still exceeds the bound is left with no side recorded,
//! matching SPR's vote timeout policy on the next tick.
use crate::lease::LeaseManager;
use crate::llm_adapter::LlmAdapter;
use crate::store::EngineStore;
use crate::types::{LlmUsageEvent, ModelId, Phase, RequestType, RoundId, Side, Time, UsageOrigin, ViewerVotingMode};
use crate::voting_window::initial_voting_window;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

struct ModelVoteOutcome {
    index: usize,
    side: Option<Side>,
}

fn run_one_vote(
    store: &Arc<EngineStore>,
    adapter: &dyn LlmAdapter,
    generation: u64,
    voter: &ModelId,
    prompt: &str,
    answer_a: &str,
    answer_b: &str,
    index: usize,
) -> ModelVoteOutcome {
    // Randomize which side is shown first to eliminate position bias, then
    // map the adapter's "first/second" reply back to the canonical side.
    let a_shown_first = fastrand::bool();
    let (first, second) = if a_shown_first { (answer_a, answer_b) } else { (answer_b, answer_a) };
    let mut sink = |_: u64, _: bool| {};
    let start = Time::now();

    match adapter.cast_model_vote(voter, prompt, first, second, &mut sink) {
        Ok((picked_first, metrics)) => {
            let finished = Time::now();
            let side = if picked_first == a_shown_first { Side::A } else { Side::B };
            let metrics_epoch = store.get_model(voter).map_or(0, |m| m.metrics_epoch);
            let (duration_ms, duration_source) = metrics.preferred_duration_ms(start.elapsed_since(finished));
            store.record_usage(LlmUsageEvent {
                generation,
                model_id: voter.clone(),
                metrics_epoch,
                request_type: RequestType::Vote,
                origin: UsageOrigin::Runtime,
                metrics,
                duration_ms,
                duration_source,
                started_at: start,
                finished_at: finished,
            });
            ModelVoteOutcome { index, side: Some(side) }
        }
        Err(e) => {
            warn!(voter = %voter, error = %e, "model vote failed");
            ModelVoteOutcome { index, side: None }
        }
    }
}

/// Runs the voting phase: `startVoting`, the voter call fan-out, commits
/// each result via `setModelVote`, then polls until the viewer-voting
/// window closes or the round otherwise leaves `voting`.
pub fn run_voting_phase(
    store: &Arc<EngineStore>,
    lease: &LeaseManager,
    adapter: &dyn LlmAdapter,
    expected_generation: u64,
    round_id: RoundId,
    voters: &[ModelId],
    prompt: &str,
    answer_a: &str,
    answer_b: &str,
) {
    let now = Time::now();
    let total_viewers = store.viewer_count();
    let (deadline, window_ms, mode) = initial_voting_window(total_viewers, now);
    if store
        .start_voting(expected_generation, round_id, voters.to_vec(), deadline, window_ms, mode, now)
        .is_err()
    {
        return;
    }

    let vote_results: Vec<ModelVoteOutcome> = std::thread::scope(|scope| {
        let handles: Vec<_> = voters
            .iter()
            .enumerate()
            .map(|(index, voter)| scope.spawn(move || run_one_vote(store, adapter, expected_generation, voter, prompt, answer_a, answer_b, index)))
            .collect();
        handles.into_iter().map(|h| h.join().expect("vote thread panicked")).collect()
    });
    for outcome in vote_results {
        let _ = store.set_model_vote(expected_generation, round_id, outcome.index, outcome.side, Time::now());
    }

    loop {
        let now = Time::now();
        lease.renew(now);
        let Some(round) = store.get_round(round_id) else { break };
        if round.phase != Phase::Voting {
            break;
        }
        let Some(ends_at) = round.viewer_voting_ends_at else { break };
        if ends_at.has_passed(now) {
            break;
        }
        let remaining = ends_at.remaining_from(now);
        let poll_delay = remaining.clamp(100, 1_000);
        std::thread::sleep(Duration::from_millis(poll_delay));
    }
}
