//! CAN Search Library
//!
//! Finds the CAN frames responsible for a physical effect on a vehicle or
//! ECU (a door unlocking, a lamp switching on) by filtering captured traffic
//! and replaying candidate subsets to a live bus.
//!
//! # Architecture
//!
//! The library is organised around two engines and the plumbing they need:
//! - [`NoiseFilter`] removes idle background traffic from captured samples
//!   and keeps only the frames seen in every sample
//! - [`BisectingSearch`] replays halves of a candidate set, asks an
//!   [`Oracle`] whether the effect occurred, and narrows the set down
//! - [`CaptureSession`] reads a [`FrameSource`] on a producer thread and
//!   hands frames to a consumer thread through a bounded channel
//! - [`Replayer`] sends a frame list with an optional gap between frames
//!
//! The library never prompts anybody. Front-ends supply the oracle and the
//! observers; the terminal front-end lives in the `can-search` binary.
//!
//! # Example Usage
//!
//! ```no_run
//! use can_search_core::{
//!     BisectingSearch, Frame, MemorySource, PredicateOracle, SearchConfig,
//! };
//!
//! let source = MemorySource::new("vcan0");
//! let candidates: Vec<Frame> = (0..64u32)
//!     .map(|id| Frame::new(0x100 + id, vec![id as u8]).unwrap())
//!     .collect();
//!
//! // A target that reacts to frame 0x12A
//! let oracle = PredicateOracle::new(|chunk: &[Frame]| chunk.iter().any(|f| f.id() == 0x12A));
//!
//! let mut search = BisectingSearch::new(&source, oracle, candidates, SearchConfig::default());
//! let outcome = search.run().unwrap();
//! println!("Responsible frames: {:?}", outcome.frames);
//! ```

pub mod capture;
pub mod config;
pub mod formats;
pub mod noise_filter;
pub mod observer;
pub mod replay;
pub mod search;
pub mod source;
pub mod sources;
pub mod types;

pub use capture::{Capture, CaptureChannel, CaptureSession, CollectionControl, ErrorThrottle, SampleCollector};
pub use config::{CaptureConfig, FilterConfig, ReplayConfig, SearchConfig};
pub use noise_filter::{filter_noise, FilterReport, NoiseFilter};
pub use observer::{CaptureObserver, NoopObserver, SearchObserver};
pub use replay::{ReplayStats, Replayer};
pub use search::{
    effective_chunk_amount, split_into_chunks, Answer, BisectingSearch, MinimizationAction, Oracle,
    PredicateOracle, ScriptedOracle, SearchDirection, SearchOutcome, SearchPhase, SearchState,
};
pub use source::FrameSource;
pub use sources::MemorySource;
#[cfg(feature = "socketcan")]
pub use sources::SocketCanSource;
pub use types::{CanError, Frame, MatchMode, NoiseSet, Result, Sample, Timestamp};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: a search over nothing finishes without asking anything
        let source = MemorySource::new("mem");
        let mut search = BisectingSearch::new(
            &source,
            ScriptedOracle::default(),
            Vec::new(),
            SearchConfig::default(),
        );
        let outcome = search.run().unwrap();
        assert!(outcome.frames.is_empty());
        assert_eq!(search.oracle().questions(), 0);
        assert!(!VERSION.is_empty());
    }
}
