//! Participant selection (§4.3.1).

use crate::types::{Model, ModelId};

/// The three roles filled for a single round.
pub struct Participants {
    pub prompter: ModelId,
    pub contestants: [ModelId; 2],
    pub voters: Vec<ModelId>,
}

/// Why participant selection could not produce a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionFailure {
    InsufficientRoleCoverage,
}

/// Shuffles `models` with a uniform Fisher-Yates permutation, then assigns
/// roles: any one prompt-capable model as prompter; two distinct
/// answer-capable models excluding the prompter as contestants; every
/// remaining vote-capable model excluding both contestants as voters.
/// Fails with `InsufficientRoleCoverage` if no prompt-capable model exists,
/// fewer than two answer-capable models exist, or zero voters remain.
pub fn select_participants(models: &[Model]) -> Result<Participants, SelectionFailure> {
    let mut shuffled: Vec<&Model> = models.iter().collect();
    fisher_yates_shuffle(&mut shuffled);

    let prompter = shuffled
        .iter()
        .find(|m| m.can_prompt)
        .ok_or(SelectionFailure::InsufficientRoleCoverage)?;

    let mut answerers = shuffled.iter().filter(|m| m.can_answer && m.id != prompter.id);
    let first = answerers.next().ok_or(SelectionFailure::InsufficientRoleCoverage)?;
    let second = answerers.next().ok_or(SelectionFailure::InsufficientRoleCoverage)?;

    let voters: Vec<ModelId> = shuffled
        .iter()
        .filter(|m| m.can_vote && m.id != first.id && m.id != second.id)
        .map(|m| m.id.clone())
        .collect();
    if voters.is_empty() {
        return Err(SelectionFailure::InsufficientRoleCoverage);
    }

    Ok(Participants {
        prompter: prompter.id.clone(),
        contestants: [first.id.clone(), second.id.clone()],
        voters,
    })
}

fn fisher_yates_shuffle<T>(items: &mut [T]) {
    for i in (1..items.len()).rev() {
        let j = fastrand::usize(..=i);
        items.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str, can_prompt: bool, can_answer: bool, can_vote: bool) -> Model {
        Model {
            id: ModelId(id.to_string()),
            name: id.to_string(),
            color: "#000".into(),
            logo_id: "logo".into(),
            reasoning_effort: None,
            metrics_epoch: 0,
            enabled: true,
            archived_at: None,
            can_prompt,
            can_answer,
            can_vote,
        }
    }

    #[test]
    fn selects_disjoint_roles_from_a_healthy_pool() {
        let models: Vec<Model> = (0..5).map(|i| model(&format!("m{i}"), true, true, true)).collect();
        let p = select_participants(&models).unwrap();
        assert_ne!(p.contestants[0], p.contestants[1]);
        assert!(!p.voters.contains(&p.contestants[0]));
        assert!(!p.voters.contains(&p.contestants[1]));
    }

    #[test]
    fn fails_without_a_prompt_capable_model() {
        let models = vec![model("a", false, true, true), model("b", false, true, true)];
        assert_eq!(select_participants(&models).unwrap_err(), SelectionFailure::InsufficientRoleCoverage);
    }

    #[test]
    fn fails_with_fewer_than_two_answer_capable_models() {
        let models = vec![model("a", true, true, true), model("b", true, false, true)];
        assert_eq!(select_participants(&models).unwrap_err(), SelectionFailure::InsufficientRoleCoverage);
    }

    #[test]
    fn fails_with_no_voters_left_after_excluding_contestants() {
        let models = vec![model("a", true, true, false), model("b", true, true, false), model("c", true, true, false)];
        assert_eq!(select_participants(&models).unwrap_err(), SelectionFailure::InsufficientRoleCoverage);
    }

    #[test]
    fn prompter_can_also_be_excluded_from_voting_if_it_cannot_vote() {
        // Regression check for the §9 open question: the prompter should be
        // eligible to vote (only contestants are excluded) when capable.
        let models = vec![
            model("prompter", true, false, true),
            model("a", false, true, false),
            model("b", false, true, false),
        ];
        let p = select_participants(&models).unwrap();
        assert!(p.voters.contains(&p.prompter));
    }
}
