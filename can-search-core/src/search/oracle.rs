//! Operator feedback during a search
//!
//! The search replays a chunk and then blocks on the oracle until it knows
//! whether the physical effect showed up. The terminal front-end implements
//! [`Oracle`] with prompts; [`ScriptedOracle`] and [`PredicateOracle`] serve
//! embedding and testing.

use crate::types::Frame;
use std::collections::VecDeque;

/// Answer to "did the effect occur?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    /// Stop the whole search now
    Abort,
}

impl From<bool> for Answer {
    fn from(occurred: bool) -> Self {
        if occurred {
            Answer::Yes
        } else {
            Answer::No
        }
    }
}

/// What to do when no chunk reproduced the effect while minimizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinimizationAction {
    /// Shuffle the last working chunk and start splitting in two again
    Retry,
    /// Replay the last working chunk unsplit to confirm it still works
    ReTest,
    /// Stop and keep the current result
    Cancel,
}

/// The human in the loop
pub trait Oracle {
    /// Ask whether the effect occurred after `chunk` was replayed
    fn effect_occurred(&mut self, chunk: &[Frame]) -> Answer;

    /// Ask how to continue after a failed minimization round
    fn minimization_action(&mut self, last_working: &[Frame]) -> MinimizationAction;

    /// Called when a batch has been sent and an answer is about to be requested
    fn transition_cue(&mut self) {}
}

impl<O: Oracle + ?Sized> Oracle for &mut O {
    fn effect_occurred(&mut self, chunk: &[Frame]) -> Answer {
        (**self).effect_occurred(chunk)
    }

    fn minimization_action(&mut self, last_working: &[Frame]) -> MinimizationAction {
        (**self).minimization_action(last_working)
    }

    fn transition_cue(&mut self) {
        (**self).transition_cue()
    }
}

/// Oracle answering from fixed queues
///
/// Once the effect queue runs dry every further question is answered with
/// [`Answer::Abort`]; once the action queue runs dry, with
/// [`MinimizationAction::Cancel`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedOracle {
    answers: VecDeque<Answer>,
    actions: VecDeque<MinimizationAction>,
    questions: usize,
    cues: usize,
}

impl ScriptedOracle {
    pub fn new(
        answers: impl IntoIterator<Item = Answer>,
        actions: impl IntoIterator<Item = MinimizationAction>,
    ) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            actions: actions.into_iter().collect(),
            questions: 0,
            cues: 0,
        }
    }

    /// Number of effect questions asked so far
    pub fn questions(&self) -> usize {
        self.questions
    }

    /// Number of transition cues so far
    pub fn cues(&self) -> usize {
        self.cues
    }
}

impl Oracle for ScriptedOracle {
    fn effect_occurred(&mut self, _chunk: &[Frame]) -> Answer {
        self.questions += 1;
        self.answers.pop_front().unwrap_or(Answer::Abort)
    }

    fn minimization_action(&mut self, _last_working: &[Frame]) -> MinimizationAction {
        self.actions.pop_front().unwrap_or(MinimizationAction::Cancel)
    }

    fn transition_cue(&mut self) {
        self.cues += 1;
    }
}

/// Oracle deciding with a predicate over the replayed chunk
///
/// Models a target that reacts deterministically to the frames it receives.
/// Minimization actions are taken from a queue, defaulting to
/// [`MinimizationAction::Cancel`].
pub struct PredicateOracle<F>
where
    F: FnMut(&[Frame]) -> bool,
{
    predicate: F,
    actions: VecDeque<MinimizationAction>,
    questions: usize,
}

impl<F> PredicateOracle<F>
where
    F: FnMut(&[Frame]) -> bool,
{
    pub fn new(predicate: F) -> Self {
        Self {
            predicate,
            actions: VecDeque::new(),
            questions: 0,
        }
    }

    /// Builder method: queue minimization actions
    pub fn with_actions(mut self, actions: impl IntoIterator<Item = MinimizationAction>) -> Self {
        self.actions.extend(actions);
        self
    }

    /// Number of effect questions asked so far
    pub fn questions(&self) -> usize {
        self.questions
    }
}

impl<F> Oracle for PredicateOracle<F>
where
    F: FnMut(&[Frame]) -> bool,
{
    fn effect_occurred(&mut self, chunk: &[Frame]) -> Answer {
        self.questions += 1;
        Answer::from((self.predicate)(chunk))
    }

    fn minimization_action(&mut self, _last_working: &[Frame]) -> MinimizationAction {
        self.actions.pop_front().unwrap_or(MinimizationAction::Cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_oracle_defaults() {
        let mut oracle = ScriptedOracle::new([Answer::No], [MinimizationAction::Retry]);
        assert_eq!(oracle.effect_occurred(&[]), Answer::No);
        assert_eq!(oracle.effect_occurred(&[]), Answer::Abort);
        assert_eq!(oracle.minimization_action(&[]), MinimizationAction::Retry);
        assert_eq!(oracle.minimization_action(&[]), MinimizationAction::Cancel);
        assert_eq!(oracle.questions(), 2);
    }

    #[test]
    fn test_predicate_oracle() {
        let target = Frame::new(0x10, vec![1]).unwrap();
        let wanted = target.clone();
        let mut oracle = PredicateOracle::new(move |chunk: &[Frame]| chunk.contains(&wanted));

        assert_eq!(oracle.effect_occurred(&[target]), Answer::Yes);
        assert_eq!(oracle.effect_occurred(&[]), Answer::No);
        assert_eq!(oracle.questions(), 2);
    }
}
