//! The external LLM collaborator seam (§4.3.3, out of scope per §1: "the
//! real LLM provider client").
//!
//! The core only depends on this trait. A concrete provider-backed adapter
//! (OpenRouter, etc.) lives outside this crate's scope and is wired in by
//! the binary; [`ScriptedAdapter`] is the deterministic test double used by
//! the driver's own test suite and by `tests/scenarios.rs`.

use crate::config::constants;
use crate::error::{Error, ErrorKind, Result};
use crate::types::{LlmCallMetrics, ModelId};
use std::time::{Duration, Instant};
use tracing::warn;

/// A successful LLM call's result: generated text plus usage metrics.
#[derive(Debug, Clone)]
pub struct LlmCallOutcome {
    pub text: String,
    pub metrics: LlmCallMetrics,
}

/// Streaming progress callback invoked during a call: `(estimated reasoning
/// tokens so far, finalized)`. The estimator sink is the typical subscriber
/// (§4.5); callers never need to inspect `finalized` themselves beyond
/// passing it through.
pub trait ProgressSink: Send {
    fn on_progress(&mut self, estimated_reasoning_tokens: u64, finalized: bool);
}

impl<F: FnMut(u64, bool) + Send> ProgressSink for F {
    fn on_progress(&mut self, estimated_reasoning_tokens: u64, finalized: bool) {
        self(estimated_reasoning_tokens, finalized)
    }
}

/// The single contract the round driver uses against any LLM backend:
/// "attempt a call within a deadline, report success with `{text,
/// metrics}` or raise; emit streaming reasoning-delta callbacks" (§9).
///
/// Retries, per-attempt timeouts, and backoff (§4.3.3:
/// `MODEL_ATTEMPTS`/`MODEL_CALL_TIMEOUT_MS`/`MODEL_RETRY_BACKOFF_MS`) are
/// the adapter's responsibility, not the driver's; [`call_with_retry`]
/// supplies a shared implementation adapters can delegate to.
pub trait LlmAdapter: Send + Sync {
    /// Generates a prompt from `prompter`, streaming reasoning progress to `sink`.
    fn generate_prompt(
        &self,
        prompter: &ModelId,
        sink: &mut dyn ProgressSink,
    ) -> Result<LlmCallOutcome>;

    /// Generates an answer to `prompt` from `contestant`.
    fn generate_answer(
        &self,
        contestant: &ModelId,
        prompt: &str,
        sink: &mut dyn ProgressSink,
    ) -> Result<LlmCallOutcome>;

    /// Asks `voter` to pick a side given both answers (already randomized
    /// by the caller to eliminate position bias); returns `true` for the
    /// first answer shown, `false` for the second, plus the call's usage
    /// metrics (§4.9: votes are recorded exactly like prompts and answers).
    fn cast_model_vote(
        &self,
        voter: &ModelId,
        prompt: &str,
        shown_first: &str,
        shown_second: &str,
        sink: &mut dyn ProgressSink,
    ) -> Result<(bool, LlmCallMetrics)>;
}

/// Runs `attempt` up to `constants::MODEL_ATTEMPTS` times, each bounded by
/// `constants::MODEL_CALL_TIMEOUT_MS`, sleeping `MODEL_RETRY_BACKOFF_MS`
/// between attempts. Adapters call this instead of re-implementing the
/// retry contract themselves.
pub fn call_with_retry<T>(
    model_id: &ModelId,
    mut attempt: impl FnMut(Duration) -> Result<T>,
) -> Result<T> {
    let timeout = Duration::from_millis(constants::MODEL_CALL_TIMEOUT_MS);
    let mut last_err = None;
    for (i, backoff_ms) in std::iter::once(0)
        .chain(constants::MODEL_RETRY_BACKOFF_MS.iter().copied())
        .take(constants::MODEL_ATTEMPTS as usize)
        .enumerate()
    {
        if backoff_ms > 0 {
            std::thread::sleep(Duration::from_millis(backoff_ms));
        }
        let started = Instant::now();
        match attempt(timeout) {
            Ok(v) => return Ok(v),
            Err(e) => {
                warn!(model = %model_id, attempt = i + 1, elapsed_ms = started.elapsed().as_millis() as u64, error = %e, "LLM call attempt failed");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        Error::new(ErrorKind::Adapter).with_context("retries exhausted with no recorded error")
    }))
}

/// A deterministic, in-memory [`LlmAdapter`] for tests: returns scripted
/// text per model and never fails unless configured to. No sleeping, no
/// network; every call returns immediately with zero-cost metrics.
pub struct ScriptedAdapter {
    pub fail_models: std::collections::HashSet<ModelId>,
    pub vote_first_wins: bool,
}

impl ScriptedAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            fail_models: std::collections::HashSet::new(),
            vote_first_wins: true,
        }
    }

    fn outcome(&self, model_id: &ModelId, text: String) -> Result<LlmCallOutcome> {
        if self.fail_models.contains(model_id) {
            return Err(Error::new(ErrorKind::Adapter).with_context(format!("{model_id} scripted to fail")));
        }
        Ok(LlmCallOutcome {
            text,
            metrics: LlmCallMetrics {
                cost_usd: 0.0001,
                prompt_tokens: 10,
                completion_tokens: 20,
                reasoning_tokens: 5,
                provider_latency_ms: Some(1),
                provider_generation_time_ms: Some(1),
            },
        })
    }
}

impl Default for ScriptedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmAdapter for ScriptedAdapter {
    fn generate_prompt(
        &self,
        prompter: &ModelId,
        sink: &mut dyn ProgressSink,
    ) -> Result<LlmCallOutcome> {
        sink.on_progress(5, true);
        self.outcome(prompter, format!("A prompt from {prompter}."))
    }

    fn generate_answer(
        &self,
        contestant: &ModelId,
        prompt: &str,
        sink: &mut dyn ProgressSink,
    ) -> Result<LlmCallOutcome> {
        sink.on_progress(5, true);
        self.outcome(contestant, format!("{contestant}'s answer to: {prompt}"))
    }

    fn cast_model_vote(
        &self,
        voter: &ModelId,
        _prompt: &str,
        _shown_first: &str,
        _shown_second: &str,
        sink: &mut dyn ProgressSink,
    ) -> Result<(bool, LlmCallMetrics)> {
        sink.on_progress(2, true);
        if self.fail_models.contains(voter) {
            return Err(Error::new(ErrorKind::Adapter).with_context(format!("{voter} scripted to fail")));
        }
        Ok((
            self.vote_first_wins,
            LlmCallMetrics {
                cost_usd: 0.0001,
                prompt_tokens: 10,
                completion_tokens: 5,
                reasoning_tokens: 2,
                provider_latency_ms: Some(1),
                provider_generation_time_ms: Some(1),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_with_retry_succeeds_without_retrying_on_first_try() {
        let model = ModelId("m".into());
        let mut calls = 0;
        let result = call_with_retry(&model, |_timeout| {
            calls += 1;
            Ok::<_, Error>(42)
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[test]
    fn call_with_retry_exhausts_attempts_then_fails() {
        let model = ModelId("m".into());
        let mut calls = 0;
        let result = call_with_retry(&model, |_timeout| {
            calls += 1;
            Err::<u32, _>(Error::new(ErrorKind::Adapter))
        });
        assert!(result.is_err());
        assert_eq!(calls, constants::MODEL_ATTEMPTS as usize);
    }

    #[test]
    fn scripted_adapter_fails_only_configured_models() {
        let mut adapter = ScriptedAdapter::new();
        adapter.fail_models.insert(ModelId("bad".into()));
        let mut sink = |_: u64, _: bool| {};
        assert!(adapter.generate_prompt(&ModelId("good".into()), &mut sink).is_ok());
        assert!(adapter.generate_prompt(&ModelId("bad".into()), &mut sink).is_err());
    }
}
