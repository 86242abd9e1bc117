//! Viewer presence and voting entities (§3).

use super::id::{RoundId, ViewerId};
use super::round::Side;
use super::time::Time;
use serde::{Deserialize, Serialize};

/// A viewer considered "online" as of its last heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerPresence {
    pub viewer_id: ViewerId,
    pub expires_at: Time,
    pub shard: usize,
    pub last_seen_at: Time,
}

/// Per-shard live-viewer counter (§3 `ViewerCountShard`).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ViewerCountShard {
    pub count: u64,
}

/// A single viewer's current ballot for a round; last-writer-wins (§3 `ViewerVote`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerVote {
    pub round_id: RoundId,
    pub viewer_id: ViewerId,
    pub side: Side,
    pub shard: usize,
}

/// Outcome of a `castVote` call (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteCastStatus {
    Accepted,
    Unchanged,
    Updated,
    Inactive,
}
