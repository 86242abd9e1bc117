//! Stale-Phase Recovery (§4.6): detects and repairs an active round that
//! has stalled past its phase-specific threshold.

use crate::config::constants;
use crate::store::EngineStore;
use crate::types::{Phase, SkipType, Time};
use tracing::{info, warn};

/// `recoverStaleActiveRound(expectedGeneration)` (§4.6). Returns
/// `(recovered, reason)`; `recovered=true` means the loop may proceed to
/// create a new round next tick, `false` means the active round is still
/// healthy (or the generation already drifted out from under the caller).
pub fn recover_stale_active_round(store: &EngineStore, expected_generation: u64, now: Time) -> (bool, String) {
    let state = store.get_state();
    if state.generation != expected_generation {
        return (false, "generation drifted before recovery check".to_string());
    }
    let Some(round_id) = state.active_round_id else {
        return (false, "no active round".to_string());
    };

    let Some(round) = store.get_round(round_id) else {
        store.clear_active_round(None);
        warn!(round = %round_id, "active round document missing, clearing pointer");
        return (true, "missing round document".to_string());
    };

    if round.phase == Phase::Done {
        store.clear_active_round(Some(round_id));
        return (true, "phase done but still active".to_string());
    }

    match round.phase {
        Phase::Prompting => {
            if round.prompt_task.started_at.elapsed_since(now) > constants::PROMPT_STALE_MS {
                store.force_terminalize(
                    round_id,
                    SkipType::PromptError,
                    "stale prompting phase".to_string(),
                    now,
                );
                info!(round = %round_id, "recovered stale prompting round");
                (true, "stale prompting phase".to_string())
            } else {
                (false, "prompting not yet stale".to_string())
            }
        }
        Phase::Answering => {
            let newest_start = round
                .answer_tasks
                .iter()
                .map(|t| t.started_at)
                .max_by_key(|t| t.0)
                .unwrap_or(now);
            if newest_start.elapsed_since(now) > constants::ANSWER_STALE_MS {
                store.timeout_unfinished_answers(round_id, now);
                store.force_terminalize(
                    round_id,
                    SkipType::AnswerError,
                    "stale answering phase".to_string(),
                    now,
                );
                info!(round = %round_id, "recovered stale answering round");
                (true, "stale answering phase".to_string())
            } else {
                (false, "answering not yet stale".to_string())
            }
        }
        Phase::Voting => {
            let earliest_unfinished_start = round
                .votes
                .iter()
                .filter(|v| !v.is_terminal())
                .map(|v| v.started_at)
                .min_by_key(|t| t.0);
            if let Some(earliest) = earliest_unfinished_start {
                if earliest.elapsed_since(now) > constants::VOTE_STALE_MS {
                    store.timeout_unfinished_votes(round_id, now);
                }
            }

            let window_closed = match round.viewer_voting_ends_at {
                Some(deadline) => deadline.has_passed(now),
                None => true,
            };
            if window_closed {
                match store.finalize_round(expected_generation, round_id, now) {
                    Ok(()) => {
                        info!(round = %round_id, "recovered stale voting round via inline finalize");
                        (true, "voting window closed, finalized inline".to_string())
                    }
                    Err(e) => (false, format!("finalize during recovery failed: {e}")),
                }
            } else {
                (false, "voting window still open".to_string())
            }
        }
        Phase::Done => (false, "already done".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ModelId, ViewerVotingMode};

    #[test]
    fn missing_round_clears_active_pointer() {
        let store = EngineStore::new();
        let now = Time::from_millis(0);
        store
            .create_round(0, ModelId("p".into()), [ModelId("a".into()), ModelId("b".into())], now)
            .unwrap();
        // Simulate the row vanishing without a matching ESS update (shouldn't
        // happen in practice, but the policy must still be defensive).
        {
            let mut g = store.inner.lock();
            g.rounds.clear();
        }
        let (recovered, _) = recover_stale_active_round(&store, 0, now);
        assert!(recovered);
        assert!(store.get_state().active_round_id.is_none());
    }

    #[test]
    fn stale_prompting_round_is_terminated() {
        let store = EngineStore::new();
        let start = Time::from_millis(0);
        let (round_id, _) = store
            .create_round(0, ModelId("p".into()), [ModelId("a".into()), ModelId("b".into())], start)
            .unwrap();
        let later = start.plus_millis(constants::PROMPT_STALE_MS + 1);
        let (recovered, _) = recover_stale_active_round(&store, 0, later);
        assert!(recovered);
        let round = store.get_round(round_id).unwrap();
        assert_eq!(round.phase, Phase::Done);
        assert!(round.skipped);
        assert_eq!(round.skip_type, Some(SkipType::PromptError));
    }

    #[test]
    fn healthy_prompting_round_is_left_alone() {
        let store = EngineStore::new();
        let start = Time::from_millis(0);
        store
            .create_round(0, ModelId("p".into()), [ModelId("a".into()), ModelId("b".into())], start)
            .unwrap();
        let soon = start.plus_millis(1_000);
        let (recovered, _) = recover_stale_active_round(&store, 0, soon);
        assert!(!recovered);
    }

    #[test]
    fn voting_round_past_closed_window_finalizes_inline() {
        let store = EngineStore::new();
        let now = Time::from_millis(0);
        let (round_id, _) = store
            .create_round(0, ModelId("p".into()), [ModelId("a".into()), ModelId("b".into())], now)
            .unwrap();
        store.start_answering(0, round_id, now).unwrap();
        store
            .start_voting(0, round_id, vec![ModelId("c".into())], now.plus_millis(1_000), 1_000, ViewerVotingMode::Active, now)
            .unwrap();
        let (recovered, _) = recover_stale_active_round(&store, 0, now.plus_millis(2_000));
        assert!(recovered);
        let round = store.get_round(round_id).unwrap();
        assert_eq!(round.phase, Phase::Done);
        assert!(store.get_state().active_round_id.is_none());
    }
}
