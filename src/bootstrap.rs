//! Usage & Bootstrap Recorder, projection half (§4.9): ensures every
//! active model has at least [`constants::BOOTSTRAP_MIN_SAMPLES`]
//! non-error usage samples of each request type at its current
//! `metrics_epoch` and the engine's current `generation`, so a read layer
//! built on top of [`crate::store::EngineStore::usage_sample_count`] (out
//! of this crate's scope) always has enough data to project from.

use crate::config::constants;
use crate::error::Result;
use crate::llm_adapter::{LlmAdapter, LlmCallOutcome};
use crate::store::EngineStore;
use crate::types::{LlmUsageEvent, Model, RequestType, Time, UsageOrigin};
use std::sync::Arc;
use tracing::{debug, info, warn};

const FALLBACK_PROMPT: &str = "Describe the worst thing to hear during a routine dental checkup.";

/// Drives `runProjectionBootstrap` (§4.9). Holds no lease of its own: the
/// bootstrap runs opportunistically whenever invoked and guards every
/// sample write against generation drift, exactly like the round driver's
/// own mutations.
pub struct BootstrapScheduler {
    store: Arc<EngineStore>,
    adapter: Arc<dyn LlmAdapter>,
    concurrency: usize,
}

impl BootstrapScheduler {
    #[must_use]
    pub fn new(store: Arc<EngineStore>, adapter: Arc<dyn LlmAdapter>, concurrency: usize) -> Self {
        Self {
            store,
            adapter,
            concurrency: concurrency.clamp(1, 3),
        }
    }

    /// Runs a single bootstrap pass to completion (or until the generation
    /// shifts under it). Returns immediately without doing any work if a
    /// run is already in flight and not stale (§4.9).
    pub fn run_once(&self, now: Time) {
        let Some(run_id) = self.store.start_bootstrap_run(now) else {
            debug!("bootstrap already in flight, skipping");
            return;
        };
        let generation = self.store.get_state().generation;
        let models = self.store.active_models();
        info!(generation, models = models.len(), "projection bootstrap starting");

        for chunk in models.chunks(self.concurrency) {
            std::thread::scope(|scope| {
                for model in chunk {
                    scope.spawn(|| self.ensure_model_samples(model, generation, run_id));
                }
            });
            if self.store.get_state().generation != generation {
                warn!("generation shifted mid-bootstrap, aborting run");
                break;
            }
        }
        self.store.finish_bootstrap_run(run_id);
        info!(generation, "projection bootstrap finished");
    }

    fn ensure_model_samples(&self, model: &Model, generation: u64, run_id: u64) {
        let mut generated_prompts: Vec<String> = Vec::new();
        let mut generated_answers: Vec<(String, String)> = Vec::new();

        for request_type in [RequestType::Prompt, RequestType::Answer, RequestType::Vote] {
            let mut attempts = 0u32;
            while attempts < constants::BOOTSTRAP_MAX_ATTEMPTS
                && self.store.usage_sample_count(&model.id, request_type, model.metrics_epoch) < constants::BOOTSTRAP_MIN_SAMPLES
            {
                attempts += 1;
                if self.store.get_state().generation != generation {
                    return;
                }
                if self
                    .store
                    .get_state()
                    .bootstrap_run
                    .is_none_or(|r| r.run_id != run_id)
                {
                    return;
                }

                match self.synthesize_sample(model, request_type, &mut generated_prompts, &mut generated_answers, generation) {
                    Ok(event) => self.store.record_usage(event),
                    Err(e) => debug!(model = %model.id, request_type = ?request_type, error = %e, "bootstrap sample attempt failed"),
                }
            }
        }
    }

    fn synthesize_sample(
        &self,
        model: &Model,
        request_type: RequestType,
        generated_prompts: &mut Vec<String>,
        generated_answers: &mut Vec<(String, String)>,
        generation: u64,
    ) -> Result<LlmUsageEvent> {
        let start = Time::now();
        let mut sink = |_: u64, _: bool| {};

        let outcome: LlmCallOutcome = match request_type {
            RequestType::Prompt => {
                let outcome = self.adapter.generate_prompt(&model.id, &mut sink)?;
                generated_prompts.push(outcome.text.clone());
                outcome
            }
            RequestType::Answer => {
                let prompt = generated_prompts.last().cloned().unwrap_or_else(|| FALLBACK_PROMPT.to_string());
                let outcome = self.adapter.generate_answer(&model.id, &prompt, &mut sink)?;
                generated_answers.push((prompt, outcome.text.clone()));
                outcome
            }
            RequestType::Vote => {
                let (prompt, first) = generated_answers
                    .last()
                    .cloned()
                    .unwrap_or_else(|| (FALLBACK_PROMPT.to_string(), "A filler answer.".to_string()));
                let second = generated_answers
                    .iter()
                    .rev()
                    .nth(1)
                    .map(|(_, a)| a.clone())
                    .unwrap_or_else(|| "Another filler answer.".to_string());
                let (_, metrics) = self.adapter.cast_model_vote(&model.id, &prompt, &first, &second, &mut sink)?;
                LlmCallOutcome {
                    text: String::new(),
                    metrics,
                }
            }
        };

        let finished = Time::now();
        let (duration_ms, duration_source) = outcome.metrics.preferred_duration_ms(start.elapsed_since(finished));
        Ok(LlmUsageEvent {
            generation,
            model_id: model.id.clone(),
            metrics_epoch: model.metrics_epoch,
            request_type,
            origin: UsageOrigin::Bootstrap,
            metrics: outcome.metrics,
            duration_ms,
            duration_source,
            started_at: start,
            finished_at: finished,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_adapter::ScriptedAdapter;
    use crate::types::ModelId;

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

    #[test]
    fn bootstrap_fills_minimum_samples_per_request_type() {
        let store = Arc::new(EngineStore::new());
        store.upsert_model(model("m1"));
        let adapter: Arc<dyn LlmAdapter> = Arc::new(ScriptedAdapter::new());
        let scheduler = BootstrapScheduler::new(Arc::clone(&store), adapter, 2);

        scheduler.run_once(Time::from_millis(0));

        for request_type in [RequestType::Prompt, RequestType::Answer, RequestType::Vote] {
            assert!(
                store.usage_sample_count(&ModelId("m1".into()), request_type, 0) >= constants::BOOTSTRAP_MIN_SAMPLES,
                "expected enough {request_type:?} samples"
            );
        }
        assert!(store.get_state().bootstrap_run.is_none());
    }

    #[test]
    fn bootstrap_does_not_run_twice_concurrently() {
        let store = Arc::new(EngineStore::new());
        store.upsert_model(model("m1"));
        let run_id = store.start_bootstrap_run(Time::from_millis(0)).unwrap();
        let adapter: Arc<dyn LlmAdapter> = Arc::new(ScriptedAdapter::new());
        let scheduler = BootstrapScheduler::new(Arc::clone(&store), adapter, 1);

        scheduler.run_once(Time::from_millis(1_000));

        assert_eq!(store.usage_sample_count(&ModelId("m1".into()), RequestType::Prompt, 0), 0);
        store.finish_bootstrap_run(run_id);
    }
}
