//! Answering phase (§4.3.4): the two contestant calls run concurrently via
//! `std::thread::scope` fan-out, joined before the phase is considered
//! complete.

use crate::error::Result;
use crate::estimator::ReasoningEstimator;
use crate::lease::LeaseManager;
use crate::llm_adapter::LlmAdapter;
use crate::reasoning::ReasoningSink;
use crate::store::EngineStore;
use crate::types::{LlmCallMetrics, LlmUsageEvent, ModelId, RequestType, RoundId, Side, Time, UsageOrigin};
use std::sync::Arc;
use tracing::{info, warn};

struct AnswerOutcome {
    side: Side,
    result: String,
    error: Option<String>,
    metrics: Option<LlmCallMetrics>,
}

fn run_one_answer(
    store: &Arc<EngineStore>,
    lease: &LeaseManager,
    adapter: &dyn LlmAdapter,
    estimator: &Arc<ReasoningEstimator>,
    round_id: RoundId,
    generation: u64,
    side: Side,
    contestant: &ModelId,
    prompt: &str,
) -> AnswerOutcome {
    let start = Time::now();
    let answer_index = match side {
        Side::A => 0,
        Side::B => 1,
    };
    let metrics_epoch = store.get_model(contestant).map_or(0, |m| m.metrics_epoch);
    let reasoning_effort = store.get_model(contestant).and_then(|m| m.reasoning_effort);
    let mut sink = ReasoningSink::new(Arc::clone(store), round_id, RequestType::Answer, Some(answer_index), contestant.clone());

    // Same up-to-183s bound as prompting; renewed by the same 20s heartbeat
    // ticker while this answer call is in flight (§4.2).
    let result = lease.heartbeat_scope(|| adapter.generate_answer(contestant, prompt, &mut sink));

    match result {
        Ok(outcome) => {
            let finished = Time::now();
            let estimated_raw = crate::estimator::raw_token_estimate(&outcome.text);
            estimator.record_ground_truth(contestant, reasoning_effort, RequestType::Answer, outcome.metrics.reasoning_tokens, estimated_raw);
            sink.finalize(outcome.metrics.reasoning_tokens);
            let (duration_ms, duration_source) = outcome.metrics.preferred_duration_ms(start.elapsed_since(finished));
            store.record_usage(LlmUsageEvent {
                generation,
                model_id: contestant.clone(),
                metrics_epoch,
                request_type: RequestType::Answer,
                origin: UsageOrigin::Runtime,
                metrics: outcome.metrics.clone(),
                duration_ms,
                duration_source,
                started_at: start,
                finished_at: finished,
            });
            AnswerOutcome {
                side,
                result: outcome.text,
                error: None,
                metrics: Some(outcome.metrics),
            }
        }
        Err(e) => {
            sink.finalize(0);
            warn!(round = %round_id, model = %contestant, error = %e, "answer call failed");
            AnswerOutcome {
                side,
                result: "[no answer]".to_string(),
                error: Some(e.to_string()),
                metrics: None,
            }
        }
    }
}

/// Runs both contestants' answer calls in parallel, commits each via
/// `setAnswerResult`, and returns `Ok(())` iff both succeeded. On any
/// failure the caller must skip the round with `skipType=answer_error`.
pub fn run_answering_phase(
    store: &Arc<EngineStore>,
    lease: &LeaseManager,
    adapter: &dyn LlmAdapter,
    estimator: &Arc<ReasoningEstimator>,
    expected_generation: u64,
    round_id: RoundId,
    generation: u64,
    contestants: &[ModelId; 2],
    prompt: &str,
) -> Result<bool> {
    store.start_answering(expected_generation, round_id, Time::now())?;

    let (first, second) = std::thread::scope(|scope| {
        let a = scope.spawn(|| run_one_answer(store, lease, adapter, estimator, round_id, generation, Side::A, &contestants[0], prompt));
        let b = scope.spawn(|| run_one_answer(store, lease, adapter, estimator, round_id, generation, Side::B, &contestants[1], prompt));
        (a.join().expect("answer thread panicked"), b.join().expect("answer thread panicked"))
    });

    let mut any_error = false;
    for outcome in [first, second] {
        any_error |= outcome.error.is_some();
        store.set_answer_result(expected_generation, round_id, outcome.side, outcome.result, outcome.error, outcome.metrics, Time::now())?;
    }

    if !any_error {
        info!(round = %round_id, "answering phase complete");
    }
    Ok(!any_error)
}
