//! Viewer Aggregates mutations: presence heartbeats, reaping, and sharded
//! vote tallies (§4.8).

use super::EngineStore;
use crate::config::constants;
use crate::types::{RoundId, Side, Time, ViewerId, ViewerPresence, VoteCastStatus};

/// Result of a [`EngineStore::heartbeat`] call.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatResult {
    pub shard: usize,
    /// `true` iff the total viewer count just moved from 0 to ≥1, the
    /// trigger condition for asking the Voting Window Controller to
    /// shorten the active round's deadline (§4.7, §4.8).
    pub crossed_zero: bool,
}

impl EngineStore {
    /// `heartbeat(viewerId, page)` (§4.8): only `page == "live"` counts
    /// (broadcast captures are silent, so callers on other pages get
    /// `None`). Upserts a presence row with a refreshed TTL, incrementing
    /// the shard count only if the row is newly created or was already
    /// expired at call time.
    pub fn heartbeat(&self, viewer_id: ViewerId, page: &str, now: Time) -> Option<HeartbeatResult> {
        if page != "live" {
            return None;
        }
        let mut g = self.inner.lock();
        let shard = viewer_id.shard(constants::SHARD_COUNT);
        let should_increment = match g.presence.get(&viewer_id) {
            Some(existing) => existing.expires_at.has_passed(now),
            None => true,
        };
        let before_total = g.total_viewer_count();
        g.presence.insert(
            viewer_id.clone(),
            ViewerPresence {
                viewer_id,
                expires_at: now.plus_millis(constants::PRESENCE_TTL_MS),
                shard,
                last_seen_at: now,
            },
        );
        if should_increment {
            g.shard_counts[shard] += 1;
        }
        let crossed_zero = before_total == 0 && g.total_viewer_count() > 0;
        Some(HeartbeatResult { shard, crossed_zero })
    }

    /// `reapExpired` (§4.8): removes presence rows whose TTL has lapsed, up
    /// to `limit` rows (caller clamps to [`constants::REAP_BATCH_MAX`]).
    /// Returns the number reaped; the caller reschedules itself immediately
    /// if the batch came back full, since more may remain.
    pub fn reap_expired(&self, now: Time, limit: usize) -> usize {
        let mut g = self.inner.lock();
        let expired: Vec<ViewerId> = g
            .presence
            .iter()
            .filter(|(_, p)| p.expires_at.has_passed(now))
            .map(|(id, _)| id.clone())
            .take(limit)
            .collect();
        let count = expired.len();
        for id in expired {
            if let Some(p) = g.presence.remove(&id) {
                g.shard_counts[p.shard] = g.shard_counts[p.shard].saturating_sub(1);
            }
        }
        count
    }

    /// `castVote` (§4.8): idempotent per `(round, viewer)`. Rejects votes
    /// for rounds that are no longer actively accepting votes; otherwise
    /// applies compensation to the sharded tally on a changed vote and
    /// reports whether the ballot was new, unchanged, or updated.
    pub fn cast_viewer_vote(
        &self,
        round_id: RoundId,
        viewer_id: ViewerId,
        side: Side,
        now: Time,
    ) -> VoteCastStatus {
        let mut g = self.inner.lock();
        let round = match g.rounds.get(&round_id) {
            Some(r) => r,
            None => return VoteCastStatus::Inactive,
        };
        let accepting = round.phase == crate::types::Phase::Voting
            && round
                .viewer_voting_ends_at
                .is_some_and(|deadline| !deadline.has_passed(now));
        if !accepting {
            return VoteCastStatus::Inactive;
        }

        let shard = viewer_id.shard(constants::SHARD_COUNT);
        let key = (round_id, viewer_id);
        match g.viewer_votes.get(&key).copied() {
            Some(existing) if existing == side => VoteCastStatus::Unchanged,
            Some(existing) => {
                *g.vote_tallies.entry((round_id, existing, shard)).or_insert(0) -= 1;
                *g.vote_tallies.entry((round_id, side, shard)).or_insert(0) += 1;
                g.viewer_votes.insert(key, side);
                VoteCastStatus::Updated
            }
            None => {
                *g.vote_tallies.entry((round_id, side, shard)).or_insert(0) += 1;
                g.viewer_votes.insert(key, side);
                VoteCastStatus::Accepted
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModelId;

    fn store_with_voting_round() -> (EngineStore, RoundId) {
        let store = EngineStore::new();
        let now = Time::from_millis(0);
        let (round_id, _) = store
            .create_round(
                0,
                ModelId("prompter".into()),
                [ModelId("a".into()), ModelId("b".into())],
                now,
            )
            .unwrap();
        store.start_answering(0, round_id, now).unwrap();
        store
            .start_voting(
                0,
                round_id,
                vec![ModelId("c".into())],
                now.plus_millis(30_000),
                30_000,
                crate::types::ViewerVotingMode::Idle,
                now,
            )
            .unwrap();
        (store, round_id)
    }

    #[test]
    fn heartbeat_increments_shard_once_per_viewer() {
        let store = EngineStore::new();
        let viewer = ViewerId("v1".into());
        let first = store.heartbeat(viewer.clone(), "live", Time::from_millis(0)).unwrap();
        assert!(first.crossed_zero);
        let second = store.heartbeat(viewer, "live", Time::from_millis(1_000)).unwrap();
        assert!(!second.crossed_zero);
        let g = store.inner.lock();
        assert_eq!(g.shard_counts[first.shard], 1);
    }

    #[test]
    fn heartbeat_ignores_non_live_pages() {
        let store = EngineStore::new();
        let viewer = ViewerId("v1".into());
        assert!(store.heartbeat(viewer, "broadcast", Time::from_millis(0)).is_none());
        assert_eq!(store.viewer_count(), 0);
    }

    #[test]
    fn reap_expired_decrements_shard_counts() {
        let store = EngineStore::new();
        let viewer = ViewerId("v1".into());
        let shard = store.heartbeat(viewer, "live", Time::from_millis(0)).unwrap().shard;
        let reaped = store.reap_expired(Time::from_millis(60_000), 100);
        assert_eq!(reaped, 1);
        let g = store.inner.lock();
        assert_eq!(g.shard_counts[shard], 0);
    }

    #[test]
    fn cast_vote_is_idempotent_and_supports_change() {
        let (store, round_id) = store_with_voting_round();
        let viewer = ViewerId("v1".into());
        let now = Time::from_millis(5_000);
        assert_eq!(
            store.cast_viewer_vote(round_id, viewer.clone(), Side::A, now),
            VoteCastStatus::Accepted
        );
        assert_eq!(
            store.cast_viewer_vote(round_id, viewer.clone(), Side::A, now),
            VoteCastStatus::Unchanged
        );
        assert_eq!(
            store.cast_viewer_vote(round_id, viewer, Side::B, now),
            VoteCastStatus::Updated
        );
        let g = store.inner.lock();
        let total_a: i64 = g
            .vote_tallies
            .iter()
            .filter(|((rid, side, _), _)| *rid == round_id && *side == Side::A)
            .map(|(_, c)| *c as i64)
            .sum();
        let total_b: i64 = g
            .vote_tallies
            .iter()
            .filter(|((rid, side, _), _)| *rid == round_id && *side == Side::B)
            .map(|(_, c)| *c as i64)
            .sum();
        assert_eq!(total_a, 0);
        assert_eq!(total_b, 1);
    }

    #[test]
    fn cast_vote_rejects_unknown_round() {
        let store = EngineStore::new();
        let status = store.cast_viewer_vote(RoundId::new(), ViewerId("v1".into()), Side::A, Time::from_millis(0));
        assert_eq!(status, VoteCastStatus::Inactive);
    }
}
