//! Core data-model types for the tournament engine (§3).
//!
//! - [`id`]: opaque identifiers (`RoundId`, `LeaseId`, `ModelId`, `ViewerId`)
//! - [`time`]: wall-clock millisecond timestamps
//! - [`model`]: the catalog `Model` descriptor
//! - [`round`]: `Round`, `Task`, `Vote`, `Phase`, `Side`
//! - [`viewer`]: `ViewerPresence`, `ViewerCountShard`, `ViewerVote`
//! - [`usage`]: `LlmUsageEvent`
//! - [`reasoning`]: `LiveReasoningProgress`
//! - [`engine_state`]: the `EngineState` singleton
//! - [`snapshot`]: read-model payloads for the admin/live surfaces

pub mod engine_state;
pub mod id;
pub mod model;
pub mod reasoning;
pub mod round;
pub mod snapshot;
pub mod time;
pub mod usage;
pub mod viewer;

pub use engine_state::{BootstrapRun, EngineState, RunsMode};
pub use id::{LeaseId, ModelId, RoundId, ViewerId};
pub use model::{Model, ReasoningEffort};
pub use reasoning::{LiveReasoningProgress, ReasoningKey};
pub use round::{
    DurationSource, LlmCallMetrics, Phase, Round, Side, SkipType, Task, Vote, ViewerVotingMode,
};
pub use snapshot::{AdminSnapshot, LivePayload, LivePayloadData, RunBlockedReason};
pub use time::Time;
pub use usage::{LlmUsageEvent, RequestType, UsageOrigin};
pub use viewer::{ViewerCountShard, ViewerPresence, ViewerVote, VoteCastStatus};
