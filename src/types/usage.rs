//! Append-only LLM usage accounting (§3 `LlmUsageEvent`, §4.9).

use super::id::ModelId;
use super::round::{DurationSource, LlmCallMetrics};
use super::time::Time;
use serde::{Deserialize, Serialize};

/// The kind of remote call a usage event accounts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Prompt,
    Answer,
    Vote,
}

/// Who initiated the call that produced this usage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageOrigin {
    /// Produced by the live round driver.
    Runtime,
    /// Produced by the projection bootstrap (§4.9).
    Bootstrap,
}

/// A single successful (or sampled) LLM call, keyed for indexed windowed reads
/// by `(generation, model_id, metrics_epoch, request_type, finished_at)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmUsageEvent {
    pub generation: u64,
    pub model_id: ModelId,
    pub metrics_epoch: u64,
    pub request_type: RequestType,
    pub origin: UsageOrigin,
    pub metrics: LlmCallMetrics,
    pub duration_ms: u64,
    pub duration_source: DurationSource,
    pub started_at: Time,
    pub finished_at: Time,
}
