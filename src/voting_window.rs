//! Voting Window Controller (§4.7): picks the initial viewer-voting
//! deadline and performs the one-shot IDLE -> ACTIVE shortening.

use crate::config::constants;
use crate::store::EngineStore;
use crate::types::{Phase, RoundId, Time, ViewerVotingMode};

/// Chooses the initial `(deadline, window_ms, mode)` for `startVoting`
/// based on the current total viewer count (§4.7).
#[must_use]
pub fn initial_voting_window(total_viewers: u64, now: Time) -> (Time, u64, ViewerVotingMode) {
    if total_viewers > 0 {
        (
            now.plus_millis(constants::VIEWER_VOTE_WINDOW_ACTIVE_MS),
            constants::VIEWER_VOTE_WINDOW_ACTIVE_MS,
            ViewerVotingMode::Active,
        )
    } else {
        (
            now.plus_millis(constants::VIEWER_VOTE_WINDOW_IDLE_MS),
            constants::VIEWER_VOTE_WINDOW_IDLE_MS,
            ViewerVotingMode::Idle,
        )
    }
}

/// `maybeShortenVotingWindow` (§4.7): invoked after every heartbeat that
/// crosses 0->positive viewers and after each viewer-target poll. Shortens
/// the active round's deadline to `now + ACTIVE` iff the round is in
/// voting, the remaining window exceeds `ACTIVE`, and viewers are present.
/// Never lengthens; a one-shot IDLE -> ACTIVE transition.
pub fn maybe_shorten_voting_window(store: &EngineStore, round_id: RoundId, total_viewers: u64, now: Time) {
    if total_viewers == 0 {
        return;
    }
    let Some(round) = store.get_round(round_id) else {
        return;
    };
    if round.phase != Phase::Voting {
        return;
    }
    let Some(ends_at) = round.viewer_voting_ends_at else {
        return;
    };
    if ends_at.remaining_from(now) > constants::VIEWER_VOTE_WINDOW_ACTIVE_MS {
        store.patch_voting_deadline(round_id, now.plus_millis(constants::VIEWER_VOTE_WINDOW_ACTIVE_MS), now);
    }
}
