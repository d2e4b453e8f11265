//! Noise subtraction and sample intersection
//!
//! Removes frames attributable to idle bus traffic from each sample, then
//! keeps only the frames that were seen in every sample. The engine is a pure
//! function of its inputs: samples are copied, sorted and filtered, never
//! modified in place.

use crate::types::{Frame, MatchMode, Sample};
use std::collections::HashSet;

/// Result of a filter run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterReport {
    /// Frames present in every sample after noise removal, sorted by ID
    pub frames: Vec<Frame>,
    /// Number of frames removed as noise, per examined sample
    pub noise_removed: Vec<usize>,
    /// Number of samples that were examined before the result was final
    pub samples_compared: usize,
}

impl FilterReport {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Noise filter engine
#[derive(Debug, Clone, Copy, Default)]
pub struct NoiseFilter {
    mode: MatchMode,
}

impl NoiseFilter {
    /// Create a filter using the given noise match mode
    pub fn new(mode: MatchMode) -> Self {
        Self { mode }
    }

    /// Filter `samples` against `noise` and intersect what remains
    ///
    /// Membership across samples is always decided by ID and payload; the
    /// match mode only affects noise removal. The first sample's multiplicity
    /// is kept, so a single sample without noise comes back sorted but
    /// otherwise unchanged. Once no candidate is left, later samples are not
    /// examined at all.
    pub fn apply(&self, noise: &[Frame], samples: &[Sample]) -> FilterReport {
        let mut report = FilterReport::default();

        let Some((first, rest)) = samples.split_first() else {
            log::warn!("No samples to analyze");
            return report;
        };

        let sorted_noise = sorted_by_id(noise);
        if sorted_noise.is_empty() {
            log::debug!("No noise collected, samples are only sorted");
        }

        log::info!("Starting to analyze {} sample(s)", samples.len());

        let (mut candidates, removed) = self.remove_noise(&sorted_noise, first);
        report.noise_removed.push(removed);
        report.samples_compared = 1;

        for sample in rest {
            // Every potential frame is gone, nothing left to confirm
            if candidates.is_empty() {
                break;
            }

            let (filtered, removed) = self.remove_noise(&sorted_noise, sample);
            report.noise_removed.push(removed);
            report.samples_compared += 1;

            let present: HashSet<(u32, &[u8])> = filtered.iter().map(Frame::key).collect();
            candidates.retain(|frame| present.contains(&frame.key()));
        }

        log::info!(
            "Finished analyzing: {} frame(s) in all samples ({} of {} samples compared)",
            candidates.len(),
            report.samples_compared,
            samples.len()
        );

        report.frames = candidates;
        report
    }

    /// Return a copy of `sample`, sorted by ID, without frames masked by `sorted_noise`
    ///
    /// `sorted_noise` must be sorted by ID. Returns the filtered copy and the
    /// number of removed frames.
    pub fn remove_noise(&self, sorted_noise: &[Frame], sample: &[Frame]) -> (Vec<Frame>, usize) {
        log::debug!("Sample size: {}", sample.len());

        let mut filtered = sorted_by_id(sample);
        if sorted_noise.is_empty() {
            return (filtered, 0);
        }

        let before = filtered.len();
        filtered.retain(|frame| !self.is_noise(sorted_noise, frame));
        let removed = before - filtered.len();

        log::debug!("Removed {} noise frame(s) ({})", removed, self.mode);
        (filtered, removed)
    }

    fn is_noise(&self, sorted_noise: &[Frame], frame: &Frame) -> bool {
        // Jump to the first noise frame with this ID; stop once IDs grow past it
        let start = sorted_noise.partition_point(|n| n.id() < frame.id());
        sorted_noise[start..]
            .iter()
            .take_while(|n| n.id() == frame.id())
            .any(|n| self.mode.matches(n, frame))
    }
}

/// Convenience wrapper around [`NoiseFilter::apply`] returning only the frames
pub fn filter_noise(noise: &[Frame], samples: &[Sample], mode: MatchMode) -> Vec<Frame> {
    NoiseFilter::new(mode).apply(noise, samples).frames
}

fn sorted_by_id(frames: &[Frame]) -> Vec<Frame> {
    let mut sorted = frames.to_vec();
    sorted.sort_by_key(Frame::id);
    sorted
}
