//! Streaming reasoning-token progress (§3 `LiveReasoningProgress`, §4.5).

use super::id::{ModelId, RoundId};
use super::usage::RequestType;
use serde::{Deserialize, Serialize};

/// Key identifying a single live reasoning-progress row.
///
/// `answer_index` is absent for the prompt call and `Some(0|1)` for the two
/// answer calls, matching §4.5's key description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReasoningKey {
    pub round_id: RoundId,
    pub request_type: RequestType,
    pub answer_index: Option<u8>,
}

/// A single streaming reasoning-token estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveReasoningProgress {
    pub key: ReasoningKey,
    pub model_id: ModelId,
    pub estimated_reasoning_tokens: u64,
    pub finalized: bool,
}
