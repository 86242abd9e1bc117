//! ESS-level mutations: the lease protocol (§4.2) and the admin
//! pause/resume/reset family (§4.4).

use super::EngineStore;
use crate::types::{LeaseId, RoundId, Time};

impl EngineStore {
    /// `acquireIfVacant` (§4.2): atomically grants a fresh lease if none is
    /// currently valid.
    pub fn acquire_lease_if_vacant(&self, now: Time, lease_ms: u64) -> Option<LeaseId> {
        let mut g = self.inner.lock();
        if !g.engine_state.lease_is_vacant(now) {
            return None;
        }
        let id = LeaseId::fresh();
        g.engine_state.runner_lease_id = Some(id);
        g.engine_state.runner_lease_until = Some(now.plus_millis(lease_ms));
        Some(id)
    }

    /// `renew` (§4.2): extends the lease iff `lease_id` is the current holder.
    pub fn renew_lease(&self, lease_id: LeaseId, now: Time, lease_ms: u64) -> bool {
        let mut g = self.inner.lock();
        if g.engine_state.runner_lease_id != Some(lease_id) {
            return false;
        }
        g.engine_state.runner_lease_until = Some(now.plus_millis(lease_ms));
        true
    }

    /// `validate` (§4.2): read-only re-check of lease id, expected
    /// generation, and non-expiry.
    #[must_use]
    pub fn validate_lease(&self, lease_id: LeaseId, expected_generation: u64, now: Time) -> bool {
        let g = self.inner.lock();
        g.engine_state.generation == expected_generation
            && g.engine_state.lease_is_held_by(lease_id, now)
    }

    /// Admin `pause` (§4.4): the driver's next tick self-reschedules without
    /// advancing.
    pub fn pause(&self) {
        self.inner.lock().engine_state.is_paused = true;
    }

    /// Admin `resume` (§4.4): clears `isPaused`/`done`. Lease acquisition
    /// and loop scheduling are the caller's responsibility (see
    /// [`crate::lease::LeaseManager::ensure_started`]).
    pub fn resume(&self) {
        let mut g = self.inner.lock();
        g.engine_state.is_paused = false;
        g.engine_state.done = false;
    }

    /// Admin `reset` (§4.4): bumps generation, pauses, clears active round
    /// and scoreboards, and clears the lease. Returns the *old* generation
    /// so the caller can scope the cascaded purge to it (§4.4, §8 S7).
    pub fn reset(&self) -> u64 {
        let mut g = self.inner.lock();
        let old_generation = g.engine_state.generation;
        g.engine_state.generation += 1;
        g.engine_state.is_paused = true;
        g.engine_state.done = false;
        g.engine_state.active_round_id = None;
        g.engine_state.last_completed_round_id = None;
        g.engine_state.completed_rounds = 0;
        g.engine_state.next_round_num = 1;
        g.engine_state.scores.clear();
        g.engine_state.human_scores.clear();
        g.engine_state.human_vote_totals.clear();
        g.engine_state.runner_lease_id = None;
        g.engine_state.runner_lease_until = None;
        g.engine_state.bootstrap_run = None;

        // Presence rows and shard counts are cleared synchronously (shards
        // reset to 0, not deleted) -- §4.4.
        g.presence.clear();
        for shard in &mut g.shard_counts {
            *shard = 0;
        }

        old_generation
    }

    /// Purges up to `limit` rows belonging to `old_generation` from the
    /// generation-scoped tables (Rounds, ViewerVotes/Tallies,
    /// LlmUsageEvents, LiveReasoningProgress). Returns the number of rows
    /// actually removed; the caller reschedules itself while this is
    /// non-zero and the store still holds rows for `old_generation` (§4.4).
    pub fn purge_generation_batch(&self, old_generation: u64, limit: usize) -> usize {
        let mut g = self.inner.lock();
        let mut removed = 0usize;

        let stale_round_ids: Vec<RoundId> = g
            .rounds
            .iter()
            .filter(|(_, r)| r.generation == old_generation)
            .map(|(id, _)| *id)
            .take(limit)
            .collect();
        for id in &stale_round_ids {
            if let Some(round) = g.rounds.remove(id) {
                g.rounds_by_gen_num.remove(&(round.generation, round.num));
                removed += 1;
            }
        }
        let mut budget = limit.saturating_sub(removed);

        if budget > 0 {
            let stale_votes: Vec<(RoundId, crate::types::ViewerId)> = g
                .viewer_votes
                .keys()
                .filter(|(round_id, _)| {
                    stale_round_ids.contains(round_id)
                        || !g.rounds.contains_key(round_id)
                })
                .take(budget)
                .cloned()
                .collect();
            for key in stale_votes {
                g.viewer_votes.remove(&key);
                removed += 1;
            }
            budget = limit.saturating_sub(removed);
        }

        if budget > 0 {
            let stale_tallies: Vec<(RoundId, crate::types::Side, usize)> = g
                .vote_tallies
                .keys()
                .filter(|(round_id, _, _)| !g.rounds.contains_key(round_id))
                .take(budget)
                .cloned()
                .collect();
            for key in stale_tallies {
                g.vote_tallies.remove(&key);
                removed += 1;
            }
            budget = limit.saturating_sub(removed);
        }

        if budget > 0 {
            let before = g.usage_events.len();
            g.usage_events.retain(|e| {
                if e.generation == old_generation && budget > 0 {
                    budget -= 1;
                    removed += 1;
                    false
                } else {
                    true
                }
            });
            debug_assert!(g.usage_events.len() <= before);
        }

        if budget > 0 {
            let stale_reasoning: Vec<crate::types::ReasoningKey> = g
                .reasoning
                .keys()
                .filter(|k| !g.rounds.contains_key(&k.round_id))
                .take(budget)
                .cloned()
                .collect();
            for key in stale_reasoning {
                g.reasoning.remove(&key);
                removed += 1;
            }
        }

        removed
    }

    /// `true` iff any generation-scoped row for `old_generation` remains.
    #[must_use]
    pub fn generation_has_remaining_rows(&self, old_generation: u64) -> bool {
        let g = self.inner.lock();
        g.rounds.values().any(|r| r.generation == old_generation)
            || g.usage_events.iter().any(|e| e.generation == old_generation)
            || g.viewer_votes.keys().any(|(round_id, _)| !g.rounds.contains_key(round_id))
            || g.vote_tallies.keys().any(|(round_id, _, _)| !g.rounds.contains_key(round_id))
            || g.reasoning.keys().any(|k| !g.rounds.contains_key(&k.round_id))
    }
}
