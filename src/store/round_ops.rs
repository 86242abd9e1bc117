//! Round Record Store mutations (§4.3.2-§4.3.6).

use super::{EngineStore, StoreInner};
use crate::error::{Error, ErrorKind, Result};
use crate::types::{
    LlmCallMetrics, ModelId, Phase, Round, RoundId, Side, SkipType, Task, Time, Vote,
    ViewerVotingMode,
};

fn occ(context: impl Into<String>) -> Error {
    Error::new(ErrorKind::OptimisticConcurrencyControlFailure).with_context(context)
}

impl EngineStore {
    /// `createRound` (§4.3.2): fails if the generation has moved on, the
    /// engine is done, or a round is already active.
    pub fn create_round(
        &self,
        expected_generation: u64,
        prompter: ModelId,
        contestants: [ModelId; 2],
        now: Time,
    ) -> Result<(RoundId, u64)> {
        let mut g = self.inner.lock();
        if g.engine_state.generation != expected_generation {
            return Err(occ("generation drifted before round creation"));
        }
        if g.engine_state.done {
            return Err(occ("engine is done"));
        }
        if g.engine_state.active_round_id.is_some() {
            return Err(occ("a round is already active"));
        }

        let id = RoundId::new();
        let num = g.engine_state.next_round_num;
        let round = Round {
            id,
            generation: expected_generation,
            num,
            phase: Phase::Prompting,
            prompter: prompter.clone(),
            prompt_task: Task::pending(prompter, now),
            prompt: None,
            contestants: contestants.clone(),
            answer_tasks: [
                Task::pending(contestants[0].clone(), Time::from_millis(0)),
                Task::pending(contestants[1].clone(), Time::from_millis(0)),
            ],
            votes: Vec::new(),
            skipped: false,
            skip_reason: None,
            skip_type: None,
            score_a: None,
            score_b: None,
            viewer_votes_a: None,
            viewer_votes_b: None,
            viewer_voting_ends_at: None,
            viewer_voting_window_ms: None,
            viewer_voting_mode: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        g.rounds.insert(id, round);
        g.rounds_by_gen_num.insert((expected_generation, num), id);
        g.engine_state.active_round_id = Some(id);
        Ok((id, num))
    }

    fn round_mut<'a>(g: &'a mut StoreInner, id: RoundId) -> Result<&'a mut Round> {
        g.rounds
            .get_mut(&id)
            .ok_or_else(|| Error::new(ErrorKind::NotFound).with_context(format!("{id}")))
    }

    /// `setPromptResult` (§4.3.3): transitions prompting -> answering-ready
    /// by recording the prompt text; the phase itself advances in
    /// `start_answering`.
    pub fn set_prompt_result(
        &self,
        expected_generation: u64,
        round_id: RoundId,
        prompt: String,
        metrics: LlmCallMetrics,
        now: Time,
    ) -> Result<()> {
        let mut g = self.inner.lock();
        if g.engine_state.generation != expected_generation {
            return Err(occ("generation drifted during prompting"));
        }
        let round = Self::round_mut(&mut g, round_id)?;
        round.prompt_task.finished_at = Some(now);
        round.prompt_task.result = Some(prompt.clone());
        round.prompt_task.metrics = Some(metrics);
        round.prompt = Some(prompt);
        round.updated_at = now;
        Ok(())
    }

    /// `setPromptError` (§4.3.3): moves the round straight to
    /// `done`/`skipped`/`prompt_error` and updates ESS bookkeeping.
    pub fn set_prompt_error(
        &self,
        expected_generation: u64,
        round_id: RoundId,
        error: String,
        now: Time,
    ) -> Result<()> {
        let mut g = self.inner.lock();
        if g.engine_state.generation != expected_generation {
            return Err(occ("generation drifted during prompting"));
        }
        {
            let round = Self::round_mut(&mut g, round_id)?;
            round.prompt_task.finished_at = Some(now);
            round.prompt_task.error = Some(error.clone());
            round.phase = Phase::Done;
            round.skipped = true;
            round.skip_type = Some(SkipType::PromptError);
            round.skip_reason = Some(error);
            round.updated_at = now;
            round.completed_at = Some(now);
        }
        g.engine_state.active_round_id = None;
        g.engine_state.last_completed_round_id = Some(round_id);
        Ok(())
    }

    /// `startAnswering` (§4.3.4): phase=answering, stamps both answer tasks.
    pub fn start_answering(
        &self,
        expected_generation: u64,
        round_id: RoundId,
        now: Time,
    ) -> Result<()> {
        let mut g = self.inner.lock();
        if g.engine_state.generation != expected_generation {
            return Err(occ("generation drifted before answering"));
        }
        let round = Self::round_mut(&mut g, round_id)?;
        if round.phase != Phase::Prompting {
            return Err(occ("round left prompting before startAnswering"));
        }
        round.phase = Phase::Answering;
        round.answer_tasks[0].started_at = now;
        round.answer_tasks[1].started_at = now;
        round.updated_at = now;
        Ok(())
    }

    /// `setAnswerResult` (§4.3.4): idempotent per `answer_index`, writes
    /// either a success or an error terminal state.
    pub fn set_answer_result(
        &self,
        expected_generation: u64,
        round_id: RoundId,
        side: Side,
        result: String,
        error: Option<String>,
        metrics: Option<LlmCallMetrics>,
        now: Time,
    ) -> Result<()> {
        let mut g = self.inner.lock();
        if g.engine_state.generation != expected_generation {
            return Err(occ("generation drifted during answering"));
        }
        let round = Self::round_mut(&mut g, round_id)?;
        let task = round.answer_task_mut(side);
        task.finished_at = Some(now);
        task.result = Some(result);
        task.error = error;
        task.metrics = metrics;
        round.updated_at = now;
        Ok(())
    }

    /// Moves an answering round to terminal `skipped`/`answer_error` (§4.3.4).
    pub fn mark_round_answer_error(
        &self,
        expected_generation: u64,
        round_id: RoundId,
        reason: String,
        now: Time,
    ) -> Result<()> {
        let mut g = self.inner.lock();
        if g.engine_state.generation != expected_generation {
            return Err(occ("generation drifted before answer-error skip"));
        }
        {
            let round = Self::round_mut(&mut g, round_id)?;
            round.phase = Phase::Done;
            round.skipped = true;
            round.skip_type = Some(SkipType::AnswerError);
            round.skip_reason = Some(reason);
            round.updated_at = now;
            round.completed_at = Some(now);
        }
        g.engine_state.active_round_id = None;
        g.engine_state.last_completed_round_id = Some(round_id);
        Ok(())
    }

    /// `startVoting` (§4.3.5): assigns voters and the initial viewer
    /// deadline (computed by the caller via the Voting Window Controller).
    pub fn start_voting(
        &self,
        expected_generation: u64,
        round_id: RoundId,
        voters: Vec<ModelId>,
        viewer_voting_ends_at: Time,
        viewer_voting_window_ms: u64,
        viewer_voting_mode: ViewerVotingMode,
        now: Time,
    ) -> Result<()> {
        let mut g = self.inner.lock();
        if g.engine_state.generation != expected_generation {
            return Err(occ("generation drifted before voting"));
        }
        let round = Self::round_mut(&mut g, round_id)?;
        if round.phase != Phase::Answering {
            return Err(occ("round left answering before startVoting"));
        }
        round.phase = Phase::Voting;
        round.votes = voters
            .into_iter()
            .map(|voter| Vote::pending(voter, now))
            .collect();
        round.viewer_voting_ends_at = Some(viewer_voting_ends_at);
        round.viewer_voting_window_ms = Some(viewer_voting_window_ms);
        round.viewer_voting_mode = Some(viewer_voting_mode);
        round.updated_at = now;
        Ok(())
    }

    /// `setModelVote` (§4.3.5): idempotent per `vote_index`.
    pub fn set_model_vote(
        &self,
        expected_generation: u64,
        round_id: RoundId,
        vote_index: usize,
        side: Option<Side>,
        now: Time,
    ) -> Result<()> {
        let mut g = self.inner.lock();
        if g.engine_state.generation != expected_generation {
            return Err(occ("generation drifted during voting"));
        }
        let round = Self::round_mut(&mut g, round_id)?;
        let vote = round
            .votes
            .get_mut(vote_index)
            .ok_or_else(|| Error::new(ErrorKind::NotFound).with_context("vote index"))?;
        vote.finished_at = Some(now);
        match side {
            Some(s) => vote.voted_for_side = Some(s),
            None => vote.error = Some(true),
        }
        round.updated_at = now;
        Ok(())
    }

    /// Patches `viewer_voting_ends_at` directly, used by the Voting Window
    /// Controller's one-shot IDLE -> ACTIVE shortening (§4.7). Never
    /// lengthens; the caller is expected to have already checked that.
    pub fn patch_voting_deadline(&self, round_id: RoundId, new_deadline: Time, now: Time) {
        let mut g = self.inner.lock();
        if let Some(round) = g.rounds.get_mut(&round_id) {
            round.viewer_voting_ends_at = Some(new_deadline);
            round.viewer_voting_mode = Some(ViewerVotingMode::Active);
            round.updated_at = now;
        }
    }

    /// `finalizeRound` (§4.3.6, reused inline by SPR per §4.6 and the §9
    /// open question on the double-finalize guard): refuses unless the
    /// round is still the active one and still in `voting`. Tallies model
    /// votes and sharded viewer tallies, updates ESS scoreboards, and marks
    /// the round `done`.
    pub fn finalize_round(&self, expected_generation: u64, round_id: RoundId, now: Time) -> Result<()> {
        let mut g = self.inner.lock();
        if g.engine_state.generation != expected_generation {
            return Err(occ("generation drifted before finalize"));
        }
        if g.engine_state.active_round_id != Some(round_id) {
            return Err(occ("round is not the active round"));
        }
        {
            let round = g
                .rounds
                .get(&round_id)
                .ok_or_else(|| Error::new(ErrorKind::NotFound).with_context(format!("{round_id}")))?;
            if round.phase != Phase::Voting {
                return Err(occ("round is not in voting phase"));
            }
        }

        let contestants = g.rounds[&round_id].contestants.clone();
        let votes_a = g.rounds[&round_id]
            .votes
            .iter()
            .filter(|v| v.voted_for_side == Some(Side::A))
            .count() as u64;
        let votes_b = g.rounds[&round_id]
            .votes
            .iter()
            .filter(|v| v.voted_for_side == Some(Side::B))
            .count() as u64;

        let viewer_votes_a: u64 = g
            .vote_tallies
            .iter()
            .filter(|((rid, side, _), _)| *rid == round_id && *side == Side::A)
            .map(|(_, count)| *count)
            .sum();
        let viewer_votes_b: u64 = g
            .vote_tallies
            .iter()
            .filter(|((rid, side, _), _)| *rid == round_id && *side == Side::B)
            .map(|(_, count)| *count)
            .sum();

        use std::cmp::Ordering;
        match votes_a.cmp(&votes_b) {
            Ordering::Greater => {
                *g.engine_state.scores.entry(contestants[0].0.clone()).or_insert(0) += 1;
            }
            Ordering::Less => {
                *g.engine_state.scores.entry(contestants[1].0.clone()).or_insert(0) += 1;
            }
            Ordering::Equal => {}
        }
        *g.engine_state
            .human_vote_totals
            .entry(contestants[0].0.clone())
            .or_insert(0) += viewer_votes_a as i64;
        *g.engine_state
            .human_vote_totals
            .entry(contestants[1].0.clone())
            .or_insert(0) += viewer_votes_b as i64;
        match viewer_votes_a.cmp(&viewer_votes_b) {
            Ordering::Greater => {
                *g.engine_state
                    .human_scores
                    .entry(contestants[0].0.clone())
                    .or_insert(0) += 1;
            }
            Ordering::Less => {
                *g.engine_state
                    .human_scores
                    .entry(contestants[1].0.clone())
                    .or_insert(0) += 1;
            }
            Ordering::Equal => {}
        }

        {
            let round = g.rounds.get_mut(&round_id).expect("checked above");
            round.phase = Phase::Done;
            round.score_a = Some(votes_a * 100);
            round.score_b = Some(votes_b * 100);
            round.viewer_votes_a = Some(viewer_votes_a);
            round.viewer_votes_b = Some(viewer_votes_b);
            round.completed_at = Some(now);
            round.updated_at = now;
        }

        g.engine_state.active_round_id = None;
        g.engine_state.last_completed_round_id = Some(round_id);
        g.engine_state.completed_rounds += 1;
        g.engine_state.next_round_num += 1;
        g.engine_state.done = g.engine_state.runs_mode == crate::types::RunsMode::Finite
            && g
                .engine_state
                .total_rounds
                .is_some_and(|total| g.engine_state.completed_rounds >= total);

        Ok(())
    }

    /// Forcibly terminalizes a round with the given skip metadata and
    /// clears the active pointer; used by Stale-Phase Recovery (§4.6) for
    /// the prompting/answering timeout paths.
    pub fn force_terminalize(
        &self,
        round_id: RoundId,
        skip_type: SkipType,
        reason: String,
        now: Time,
    ) {
        let mut g = self.inner.lock();
        if let Some(round) = g.rounds.get_mut(&round_id) {
            round.phase = Phase::Done;
            round.skipped = true;
            round.skip_type = Some(skip_type);
            round.skip_reason = Some(reason);
            round.completed_at = Some(now);
            round.updated_at = now;
        }
        if g.engine_state.active_round_id == Some(round_id) {
            g.engine_state.active_round_id = None;
            g.engine_state.last_completed_round_id = Some(round_id);
        }
    }

    /// Clears the active-round pointer without touching the round document;
    /// used by SPR when the active round is missing or already `done`
    /// (§4.6 first two policies).
    pub fn clear_active_round(&self, last_completed: Option<RoundId>) {
        let mut g = self.inner.lock();
        g.engine_state.active_round_id = None;
        if let Some(id) = last_completed {
            g.engine_state.last_completed_round_id = Some(id);
        }
    }

    /// Finalizes all unfinished answer tasks with a timeout error, in place
    /// (§4.6 answering-phase recovery), without moving the phase forward.
    pub fn timeout_unfinished_answers(&self, round_id: RoundId, now: Time) {
        let mut g = self.inner.lock();
        if let Some(round) = g.rounds.get_mut(&round_id) {
            for task in &mut round.answer_tasks {
                if !task.is_terminal() {
                    task.finished_at = Some(now);
                    task.result = Some("[no answer]".to_string());
                    task.error = Some("Timed out".to_string());
                }
            }
            round.updated_at = now;
        }
    }

    /// Finalizes all unfinished votes with an error, in place (§4.6
    /// voting-phase recovery), without moving the phase forward.
    pub fn timeout_unfinished_votes(&self, round_id: RoundId, now: Time) {
        let mut g = self.inner.lock();
        if let Some(round) = g.rounds.get_mut(&round_id) {
            for vote in &mut round.votes {
                if !vote.is_terminal() {
                    vote.finished_at = Some(now);
                    vote.error = Some(true);
                }
            }
            round.updated_at = now;
        }
    }
}
