//! Bisecting search for the frames behind an observed effect
//!
//! Given a set of candidate frames and an operator who can tell whether a
//! physical effect happened after a replay, the search first walks down a
//! binary split until at most one frame is left (`Descending`), then takes the
//! smallest set known to work and tries finer splits of it (`Minimizing`).
//!
//! ```text
//! Idle ──▶ Descending ──▶ Minimizing ──▶ Done
//!              │               │
//!              └──────┬────────┘
//!                     ▼
//!                  Aborted   (operator abort/cancel, or a bus error)
//! ```
//!
//! Every oracle question blocks until the operator answers; no two questions
//! are ever outstanding for the same search.

pub mod chunks;
pub mod oracle;

pub use chunks::{effective_chunk_amount, split_into_chunks};
pub use oracle::{Answer, MinimizationAction, Oracle, PredicateOracle, ScriptedOracle};

use crate::config::SearchConfig;
use crate::observer::SearchObserver;
use crate::replay::Replayer;
use crate::source::FrameSource;
use crate::types::{Frame, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fmt;

/// Phase of a bisecting search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    Idle,
    Descending,
    Minimizing,
    Done,
    Aborted,
}

impl fmt::Display for SearchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchPhase::Idle => write!(f, "idle"),
            SearchPhase::Descending => write!(f, "descending"),
            SearchPhase::Minimizing => write!(f, "minimizing"),
            SearchPhase::Done => write!(f, "done"),
            SearchPhase::Aborted => write!(f, "aborted"),
        }
    }
}

/// Whether the search is narrowing down or re-splitting a known working set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDirection {
    Downward,
    Expanding,
}

/// Live state of a bisecting search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchState {
    pub phase: SearchPhase,
    /// Frames still under consideration
    pub working_set: Vec<Frame>,
    /// Smallest set known to reproduce the effect
    pub last_working_chunk: Vec<Frame>,
    /// Requested number of chunks for the next minimizing round
    pub chunk_amount: usize,
    /// Number of replay-and-ask rounds so far
    pub rounds: usize,
    /// Number of frames put on the bus so far
    pub frames_replayed: usize,
}

impl SearchState {
    fn new(frames: Vec<Frame>) -> Self {
        Self {
            phase: SearchPhase::Idle,
            last_working_chunk: frames.clone(),
            working_set: frames,
            chunk_amount: 2,
            rounds: 0,
            frames_replayed: 0,
        }
    }

    pub fn direction(&self) -> SearchDirection {
        match self.phase {
            SearchPhase::Minimizing => SearchDirection::Expanding,
            _ => SearchDirection::Downward,
        }
    }
}

/// Final result of a search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    /// The reported frames: the working set when the search stopped
    pub frames: Vec<Frame>,
    /// Smallest set that was confirmed to reproduce the effect
    pub last_working_chunk: Vec<Frame>,
    /// `Done` or `Aborted`
    pub phase: SearchPhase,
    pub rounds: usize,
    pub frames_replayed: usize,
}

impl SearchOutcome {
    pub fn is_aborted(&self) -> bool {
        self.phase == SearchPhase::Aborted
    }
}

/// Bisecting search engine
///
/// Owns its working set for the whole run. The frame source is borrowed and
/// only ever used to send, one frame at a time, from the calling thread.
pub struct BisectingSearch<'a, O: Oracle> {
    source: &'a dyn FrameSource,
    oracle: O,
    config: SearchConfig,
    observer: Option<Box<dyn SearchObserver + 'a>>,
    rng: StdRng,
    state: SearchState,
}

impl<'a, O: Oracle> BisectingSearch<'a, O> {
    pub fn new(source: &'a dyn FrameSource, oracle: O, frames: Vec<Frame>, config: SearchConfig) -> Self {
        let rng = match config.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            source,
            oracle,
            config,
            observer: None,
            rng,
            state: SearchState::new(frames),
        }
    }

    /// Builder method: register a state observer
    pub fn with_observer(mut self, observer: impl SearchObserver + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn working_set(&self) -> &[Frame] {
        &self.state.working_set
    }

    pub fn last_working_chunk(&self) -> &[Frame] {
        &self.state.last_working_chunk
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn is_aborted(&self) -> bool {
        self.state.phase == SearchPhase::Aborted
    }

    /// Run both phases and report the result
    ///
    /// A bus error aborts the search and is returned; the last working chunk
    /// stays available through [`last_working_chunk`](Self::last_working_chunk).
    pub fn run(&mut self) -> Result<SearchOutcome> {
        log::debug!("Starting search over {} frame(s)", self.state.working_set.len());
        self.state.last_working_chunk = self.state.working_set.clone();

        self.descend()?;
        if !self.is_aborted() {
            self.minimize()?;
        }
        if !self.is_aborted() {
            self.set_phase(SearchPhase::Done);
        }

        log::info!(
            "Search {} after {} round(s): {} frame(s) remaining",
            self.state.phase,
            self.state.rounds,
            self.state.working_set.len()
        );
        Ok(self.outcome())
    }

    /// Snapshot of the current result
    pub fn outcome(&self) -> SearchOutcome {
        SearchOutcome {
            frames: self.state.working_set.clone(),
            last_working_chunk: self.state.last_working_chunk.clone(),
            phase: self.state.phase,
            rounds: self.state.rounds,
            frames_replayed: self.state.frames_replayed,
        }
    }

    /// Halve the working set until at most one frame is left
    pub fn descend(&mut self) -> Result<()> {
        self.set_phase(SearchPhase::Descending);

        while self.state.working_set.len() > 1 {
            self.send_and_search(2)?;
            if self.is_aborted() {
                break;
            }
        }
        Ok(())
    }

    /// Try ever finer splits of the last working chunk
    ///
    /// After a failed round the operator picks the next step. A re-test replays
    /// the last working chunk once and then goes straight back to the operator
    /// without another split round; its outcome is not recorded.
    pub fn minimize(&mut self) -> Result<()> {
        self.set_phase(SearchPhase::Minimizing);
        self.state.working_set = self.state.last_working_chunk.clone();
        self.state.chunk_amount = 2;

        let mut skip_sending = false;

        while self.state.working_set.len() > 1 {
            if !skip_sending {
                let found = self.send_and_search(self.state.chunk_amount)?;
                if self.is_aborted() {
                    break;
                }
                if found {
                    self.state.chunk_amount += 1;
                    self.state.working_set = self.state.last_working_chunk.clone();
                    log::info!("Minimizing worked, trying once again");
                    self.notify();
                    continue;
                }
            }

            self.state.working_set = self.state.last_working_chunk.clone();
            skip_sending = false;

            self.oracle.transition_cue();
            match self.oracle.minimization_action(&self.state.last_working_chunk) {
                MinimizationAction::Retry => {
                    log::debug!("Shuffling the last working chunk");
                    self.state.chunk_amount = 2;
                    self.state.last_working_chunk.shuffle(&mut self.rng);
                    self.state.working_set = self.state.last_working_chunk.clone();
                }
                MinimizationAction::ReTest => {
                    log::debug!("Testing the last working chunk");
                    let chunk = self.state.last_working_chunk.clone();
                    self.replay_chunk(&chunk)?;
                    skip_sending = true;
                }
                MinimizationAction::Cancel => {
                    log::info!(
                        "Stopping, {} frame(s) remaining",
                        self.state.working_set.len()
                    );
                    self.set_phase(SearchPhase::Aborted);
                    break;
                }
            }
            self.notify();
        }
        Ok(())
    }

    /// Replay the working set chunk by chunk, newest chunk first, until the
    /// operator confirms one
    ///
    /// On success the confirmed chunk becomes both the working set and the last
    /// working chunk. Each rejected chunk is dropped from the working set. An
    /// abort from the operator ends the round with `false` and the search in
    /// `Aborted`.
    pub fn send_and_search(&mut self, chunk_amount: usize) -> Result<bool> {
        let amount = effective_chunk_amount(self.state.working_set.len(), chunk_amount);
        log::info!(
            "# frames: {} (round {}, {} chunk(s))",
            self.state.working_set.len(),
            self.state.rounds + 1,
            amount
        );

        let mut chunks = split_into_chunks(&self.state.working_set, amount);
        self.state.rounds += 1;

        for index in (0..chunks.len()).rev() {
            self.replay_chunk(&chunks[index])?;

            self.oracle.transition_cue();
            match self.oracle.effect_occurred(&chunks[index]) {
                Answer::Yes => {
                    log::debug!("Splitting current chunk");
                    let chunk = chunks.swap_remove(index);
                    self.state.last_working_chunk = chunk.clone();
                    self.state.working_set = chunk;
                    self.notify();
                    return Ok(true);
                }
                Answer::No => {
                    log::debug!("Splitting other chunk(s)");
                    chunks.remove(index);
                    self.state.working_set = chunks.iter().flatten().cloned().collect();
                    self.notify();
                }
                Answer::Abort => {
                    log::info!("Search aborted by operator");
                    self.set_phase(SearchPhase::Aborted);
                    return Ok(false);
                }
            }
        }

        Ok(false)
    }

    fn replay_chunk(&mut self, chunk: &[Frame]) -> Result<()> {
        let replayer = Replayer::new(self.source, self.config.replay.clone());
        match replayer.replay(chunk) {
            Ok(stats) => {
                self.state.frames_replayed += stats.sent;
                Ok(())
            }
            Err(e) => {
                log::error!("Replay on {} failed, aborting search: {}", self.source.name(), e);
                self.set_phase(SearchPhase::Aborted);
                Err(e)
            }
        }
    }

    fn set_phase(&mut self, phase: SearchPhase) {
        if self.state.phase != phase {
            log::debug!("Search phase: {} -> {}", self.state.phase, phase);
            self.state.phase = phase;
            self.notify();
        }
    }

    fn notify(&mut self) {
        if let Some(observer) = self.observer.as_mut() {
            observer.on_search_state_changed(&self.state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MemorySource;
    use crate::types::CanError;

    fn frames(n: u32) -> Vec<Frame> {
        (0..n).map(|id| Frame::new(id, vec![id as u8]).unwrap()).collect()
    }

    fn ids(frames: &[Frame]) -> Vec<u32> {
        frames.iter().map(Frame::id).collect()
    }

    #[test]
    fn test_reverse_order_and_narrowing() {
        let source = MemorySource::new("vcan0");
        let oracle = ScriptedOracle::new([Answer::Yes], []);
        let mut search = BisectingSearch::new(&source, oracle, frames(5), SearchConfig::default());

        assert!(search.send_and_search(2).unwrap());
        // Last chunk carries the remainder and is tried first
        assert_eq!(ids(search.working_set()), vec![2, 3, 4]);
        assert_eq!(ids(search.last_working_chunk()), vec![2, 3, 4]);
        assert_eq!(ids(&source.sent()), vec![2, 3, 4]);
    }

    #[test]
    fn test_rejected_chunks_are_dropped() {
        let source = MemorySource::new("vcan0");
        let oracle = ScriptedOracle::new([Answer::No, Answer::No, Answer::No], []);
        let mut search = BisectingSearch::new(&source, oracle, frames(9), SearchConfig::default());

        assert!(!search.send_and_search(3).unwrap());
        assert!(search.working_set().is_empty());
        // Last working chunk is untouched by failed rounds
        assert_eq!(search.last_working_chunk().len(), 9);
        assert_eq!(ids(&source.sent()), vec![6, 7, 8, 3, 4, 5, 0, 1, 2]);
    }

    #[test]
    fn test_flatten_keeps_order() {
        let source = MemorySource::new("vcan0");
        let oracle = ScriptedOracle::new([Answer::No, Answer::Abort], []);
        let mut search = BisectingSearch::new(&source, oracle, frames(9), SearchConfig::default());

        assert!(!search.send_and_search(3).unwrap());
        assert_eq!(ids(search.working_set()), vec![0, 1, 2, 3, 4, 5]);
        assert!(search.is_aborted());
    }

    #[test]
    fn test_single_frame_needs_no_rounds() {
        let source = MemorySource::new("vcan0");
        let oracle = ScriptedOracle::default();
        let mut search = BisectingSearch::new(&source, oracle, frames(1), SearchConfig::default());

        let outcome = search.run().unwrap();
        assert_eq!(outcome.phase, SearchPhase::Done);
        assert_eq!(ids(&outcome.frames), vec![0]);
        assert_eq!(outcome.rounds, 0);
        assert_eq!(source.sent_count(), 0);
    }

    #[test]
    fn test_empty_set() {
        let source = MemorySource::new("vcan0");
        let mut search =
            BisectingSearch::new(&source, ScriptedOracle::default(), Vec::new(), SearchConfig::default());

        let outcome = search.run().unwrap();
        assert_eq!(outcome.phase, SearchPhase::Done);
        assert!(outcome.frames.is_empty());
    }

    #[test]
    fn test_abort_during_descent() {
        let source = MemorySource::new("vcan0");
        let oracle = ScriptedOracle::new([Answer::Yes, Answer::Abort], []);
        let mut search = BisectingSearch::new(&source, oracle, frames(8), SearchConfig::default());

        let outcome = search.run().unwrap();
        assert!(outcome.is_aborted());
        assert_eq!(ids(&outcome.last_working_chunk), vec![4, 5, 6, 7]);
    }

    #[test]
    fn test_bus_error_keeps_last_working_chunk() {
        // 8 frames: round 1 sends 4 frames, round 2 fails on its first send
        let source = MemorySource::new("vcan0").fail_send_at(5);
        let oracle = ScriptedOracle::new([Answer::Yes, Answer::Yes], []);
        let mut search = BisectingSearch::new(&source, oracle, frames(8), SearchConfig::default());

        let result = search.run();
        assert!(matches!(result, Err(CanError::Io(_))));
        assert!(search.is_aborted());
        assert_eq!(ids(search.last_working_chunk()), vec![4, 5, 6, 7]);
    }

    #[test]
    fn test_damaged_frame_skipped_not_fatal() {
        let source = MemorySource::new("vcan0").reject_id(3);
        let oracle = PredicateOracle::new(|chunk: &[Frame]| chunk.iter().any(|f| f.id() == 1));
        let mut search = BisectingSearch::new(&source, oracle, frames(4), SearchConfig::default());

        let outcome = search.run().unwrap();
        assert_eq!(ids(&outcome.frames), vec![1]);
        assert!(!source.sent().iter().any(|f| f.id() == 3));
    }

    #[test]
    fn test_retest_then_cancel() {
        // {0, 3} are both needed: every split fails
        let source = MemorySource::new("vcan0");
        let oracle = PredicateOracle::new(|chunk: &[Frame]| {
            chunk.iter().any(|f| f.id() == 0) && chunk.iter().any(|f| f.id() == 3)
        })
        .with_actions([MinimizationAction::ReTest, MinimizationAction::Cancel]);
        let mut search = BisectingSearch::new(&source, oracle, frames(4), SearchConfig::default());

        let outcome = search.run().unwrap();
        assert!(outcome.is_aborted());
        assert_eq!(ids(&outcome.frames), vec![0, 1, 2, 3]);
        // Descent (4) + one minimizing round (4) + re-test (4)
        assert_eq!(source.sent_count(), 12);
        assert_eq!(outcome.frames_replayed, 12);
        // Re-test does not ask whether the effect occurred
        assert_eq!(search.oracle().questions(), 4);
    }

    #[test]
    fn test_minimizing_success_increments_chunk_amount() {
        let source = MemorySource::new("vcan0");
        // Descent: [3,4,5] yes, then [4,5] and [3] no -> empty. Minimizing
        // from [3,4,5]: [4,5] yes, then [5] and [4] fail and the operator cancels.
        let oracle = ScriptedOracle::new(
            [
                Answer::Yes,
                Answer::No,
                Answer::No,
                Answer::Yes,
                Answer::No,
                Answer::No,
            ],
            [MinimizationAction::Cancel],
        );
        let mut search = BisectingSearch::new(&source, oracle, frames(6), SearchConfig::default());

        let outcome = search.run().unwrap();
        assert_eq!(ids(&outcome.frames), vec![4, 5]);
        assert_eq!(ids(&outcome.last_working_chunk), vec![4, 5]);
        assert_eq!(search.state().chunk_amount, 3);
        assert!(outcome.is_aborted());
    }

    #[test]
    fn test_retry_reshuffles_and_resets_chunk_amount() {
        struct ChunkAmounts<'p>(&'p mut Vec<usize>);
        impl SearchObserver for ChunkAmounts<'_> {
            fn on_search_state_changed(&mut self, state: &SearchState) {
                if self.0.last() != Some(&state.chunk_amount) {
                    self.0.push(state.chunk_amount);
                }
            }
        }

        const SEED: u64 = 42;
        // Same path as above up to the failed round over [4,5], then the
        // operator retries, both shuffled halves fail and the operator cancels.
        let oracle = ScriptedOracle::new(
            [
                Answer::Yes,
                Answer::No,
                Answer::No,
                Answer::Yes,
                Answer::No,
                Answer::No,
                Answer::No,
                Answer::No,
            ],
            [MinimizationAction::Retry, MinimizationAction::Cancel],
        );
        let source = MemorySource::new("vcan0");
        let mut amounts = Vec::new();
        let (outcome, questions, cues) = {
            let mut search = BisectingSearch::new(
                &source,
                oracle,
                frames(6),
                SearchConfig::default().with_shuffle_seed(SEED),
            )
            .with_observer(ChunkAmounts(&mut amounts));
            let outcome = search.run().unwrap();
            assert_eq!(search.state().chunk_amount, 2);
            (outcome, search.oracle().questions(), search.oracle().cues())
        };

        // Raised to 3 by the successful minimizing round, back to 2 on retry
        assert_eq!(amounts, vec![2, 3, 2]);

        // The retry shuffled the last working chunk with the seeded generator
        let mut expected = vec![4u32, 5];
        expected.shuffle(&mut StdRng::seed_from_u64(SEED));
        assert_eq!(ids(&outcome.last_working_chunk), expected);
        assert_eq!(ids(&outcome.frames), expected);

        // The round after the retry splits the shuffled order, newest chunk first
        let sent = ids(&source.sent());
        assert_eq!(sent[sent.len() - 2..], [expected[1], expected[0]]);

        // One cue before every question and before every action prompt
        assert_eq!(questions, 8);
        assert_eq!(cues, questions + 2);
        assert!(outcome.is_aborted());
    }

    #[test]
    fn test_observer_sees_phases() {
        struct Phases<'p>(&'p mut Vec<(SearchPhase, SearchDirection)>);
        impl SearchObserver for Phases<'_> {
            fn on_search_state_changed(&mut self, state: &SearchState) {
                let entry = (state.phase, state.direction());
                if self.0.last() != Some(&entry) {
                    self.0.push(entry);
                }
            }
        }

        let mut seen = Vec::new();
        {
            let source = MemorySource::new("vcan0");
            let oracle = PredicateOracle::new(|chunk: &[Frame]| chunk.iter().any(|f| f.id() == 2));
            let mut search = BisectingSearch::new(&source, oracle, frames(4), SearchConfig::default())
                .with_observer(Phases(&mut seen));
            search.run().unwrap();
        }
        assert_eq!(
            seen,
            vec![
                (SearchPhase::Descending, SearchDirection::Downward),
                (SearchPhase::Minimizing, SearchDirection::Expanding),
                (SearchPhase::Done, SearchDirection::Downward),
            ]
        );
    }
}
