//! Prompting phase (§4.3.3).

use crate::error::Result;
use crate::estimator::ReasoningEstimator;
use crate::lease::LeaseManager;
use crate::llm_adapter::LlmAdapter;
use crate::reasoning::ReasoningSink;
use crate::store::EngineStore;
use crate::types::{LlmUsageEvent, ModelId, RequestType, RoundId, Time, UsageOrigin};
use std::sync::Arc;
use tracing::{info, warn};

/// Runs the prompting phase to completion: on success, commits
/// `setPromptResult` and a usage event; on failure, commits
/// `setPromptError` (terminal skip) and returns `Err`, signalling the
/// caller to apply `SKIPPED_ROUND_DELAY_MS` before rescheduling.
pub fn run_prompting_phase(
    store: &Arc<EngineStore>,
    lease: &LeaseManager,
    adapter: &dyn LlmAdapter,
    estimator: &Arc<ReasoningEstimator>,
    expected_generation: u64,
    round_id: RoundId,
    generation: u64,
    prompter: &ModelId,
) -> Result<()> {
    let start = Time::now();
    let metrics_epoch = store.get_model(prompter).map_or(0, |m| m.metrics_epoch);
    let reasoning_effort = store.get_model(prompter).and_then(|m| m.reasoning_effort);
    let mut sink = ReasoningSink::new(Arc::clone(store), round_id, RequestType::Prompt, None, prompter.clone());

    // Bounded by up to MODEL_ATTEMPTS * MODEL_CALL_TIMEOUT_MS plus backoff,
    // well past the lease TTL; a background ticker renews every 20s while
    // the call is in flight (§4.2).
    let result = lease.heartbeat_scope(|| adapter.generate_prompt(prompter, &mut sink));

    match result {
        Ok(outcome) => {
            let finished = Time::now();
            let estimated_raw = crate::estimator::raw_token_estimate(&outcome.text);
            estimator.record_ground_truth(prompter, reasoning_effort, RequestType::Prompt, outcome.metrics.reasoning_tokens, estimated_raw);
            sink.finalize(outcome.metrics.reasoning_tokens);
            store.set_prompt_result(expected_generation, round_id, outcome.text, outcome.metrics.clone(), finished)?;
            let (duration_ms, duration_source) = outcome.metrics.preferred_duration_ms(start.elapsed_since(finished));
            store.record_usage(LlmUsageEvent {
                generation,
                model_id: prompter.clone(),
                metrics_epoch,
                request_type: RequestType::Prompt,
                origin: UsageOrigin::Runtime,
                metrics: outcome.metrics,
                duration_ms,
                duration_source,
                started_at: start,
                finished_at: finished,
            });
            info!(round = %round_id, model = %prompter, "prompting phase complete");
            Ok(())
        }
        Err(e) => {
            let finished = Time::now();
            sink.finalize(0);
            warn!(round = %round_id, model = %prompter, error = %e, "prompting phase failed");
            store.set_prompt_error(expected_generation, round_id, e.to_string(), finished)?;
            Err(e)
        }
    }
}
