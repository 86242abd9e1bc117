//! Round, Task, and Vote value types (§3).

use super::id::{ModelId, RoundId};
use super::time::Time;
use serde::{Deserialize, Serialize};

/// A round's lifecycle phase. Progresses only forward (P2: phase monotonicity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Prompting,
    Answering,
    Voting,
    Done,
}

impl Phase {
    /// Index used to check that a transition only ever moves forward.
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        match self {
            Self::Prompting => 0,
            Self::Answering => 1,
            Self::Voting => 2,
            Self::Done => 3,
        }
    }
}

/// Why a round was terminated without completing its natural lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipType {
    PromptError,
    AnswerError,
}

/// Which of the two contestants a vote favors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

/// Metrics recorded for a single LLM call, used for usage accounting (§4.9).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmCallMetrics {
    pub cost_usd: f64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub reasoning_tokens: u64,
    /// Provider-reported wall latency, if given.
    pub provider_latency_ms: Option<u64>,
    /// Provider-reported `generation_time`, if given (may differ from latency).
    pub provider_generation_time_ms: Option<u64>,
}

impl LlmCallMetrics {
    /// Picks the duration a usage event should record, preferring
    /// provider-reported latency over provider-reported `generation_time`
    /// over the caller's own wall-clock measurement (§4.9).
    #[must_use]
    pub fn preferred_duration_ms(&self, local_wall_clock_ms: u64) -> (u64, DurationSource) {
        if let Some(ms) = self.provider_latency_ms {
            (ms, DurationSource::ProviderLatency)
        } else if let Some(ms) = self.provider_generation_time_ms {
            (ms, DurationSource::ProviderGenerationTime)
        } else {
            (local_wall_clock_ms, DurationSource::LocalWallClock)
        }
    }
}

/// Which of the three timing sources backed a usage event's recorded duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationSource {
    ProviderLatency,
    ProviderGenerationTime,
    LocalWallClock,
}


/// One remote-call phase's task: a prompt generation or an answer generation.
///
/// Exactly one of `result`/`error` is set once `finished_at` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub model: ModelId,
    pub started_at: Time,
    pub finished_at: Option<Time>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub metrics: Option<LlmCallMetrics>,
}

impl Task {
    #[must_use]
    pub fn pending(model: ModelId, started_at: Time) -> Self {
        Self {
            model,
            started_at,
            finished_at: None,
            result: None,
            error: None,
            metrics: None,
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.finished_at.is_some()
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.is_terminal() && self.error.is_none()
    }
}

/// A single voter's ballot for a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub voter: ModelId,
    pub started_at: Time,
    pub finished_at: Option<Time>,
    pub voted_for_side: Option<Side>,
    pub error: Option<bool>,
}

impl Vote {
    #[must_use]
    pub fn pending(voter: ModelId, started_at: Time) -> Self {
        Self {
            voter,
            started_at,
            finished_at: None,
            voted_for_side: None,
            error: None,
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.finished_at.is_some()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.is_terminal() && self.error != Some(true) && self.voted_for_side.is_some()
    }
}

/// Viewer voting window mode: widened while idle, narrowed once a viewer arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewerVotingMode {
    Active,
    Idle,
}

/// A round document (§3 `Round`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub generation: u64,
    pub num: u64,
    pub phase: Phase,
    pub prompter: ModelId,
    pub prompt_task: Task,
    pub prompt: Option<String>,
    pub contestants: [ModelId; 2],
    pub answer_tasks: [Task; 2],
    pub votes: Vec<Vote>,
    pub skipped: bool,
    pub skip_reason: Option<String>,
    pub skip_type: Option<SkipType>,
    pub score_a: Option<u64>,
    pub score_b: Option<u64>,
    pub viewer_votes_a: Option<u64>,
    pub viewer_votes_b: Option<u64>,
    pub viewer_voting_ends_at: Option<Time>,
    pub viewer_voting_window_ms: Option<u64>,
    pub viewer_voting_mode: Option<ViewerVotingMode>,
    pub created_at: Time,
    pub updated_at: Time,
    pub completed_at: Option<Time>,
}

impl Round {
    /// Looks up a contestant's side given its model id, if it is a contestant.
    #[must_use]
    pub fn side_of(&self, model: &ModelId) -> Option<Side> {
        if &self.contestants[0] == model {
            Some(Side::A)
        } else if &self.contestants[1] == model {
            Some(Side::B)
        } else {
            None
        }
    }

    #[must_use]
    pub fn answer_task(&self, side: Side) -> &Task {
        match side {
            Side::A => &self.answer_tasks[0],
            Side::B => &self.answer_tasks[1],
        }
    }

    #[must_use]
    pub fn answer_task_mut(&mut self, side: Side) -> &mut Task {
        match side {
            Side::A => &mut self.answer_tasks[0],
            Side::B => &mut self.answer_tasks[1],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_ordinals_are_monotonic() {
        assert!(Phase::Prompting.ordinal() < Phase::Answering.ordinal());
        assert!(Phase::Answering.ordinal() < Phase::Voting.ordinal());
        assert!(Phase::Voting.ordinal() < Phase::Done.ordinal());
    }

    #[test]
    fn side_other_is_involution() {
        assert_eq!(Side::A.other(), Side::B);
        assert_eq!(Side::B.other(), Side::A);
        assert_eq!(Side::A.other().other(), Side::A);
    }

    #[test]
    fn vote_success_requires_side_and_no_error() {
        let mut v = Vote::pending(ModelId("m".into()), Time::from_millis(0));
        assert!(!v.is_success());
        v.finished_at = Some(Time::from_millis(1));
        v.voted_for_side = Some(Side::A);
        assert!(v.is_success());
        v.error = Some(true);
        assert!(!v.is_success());
    }
}
