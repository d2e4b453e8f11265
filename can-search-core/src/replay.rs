//! Ordered frame replay with an inter-frame delay

use crate::config::ReplayConfig;
use crate::source::FrameSource;
use crate::types::{CanError, Frame, Result};
use std::thread;

/// Counters of one replay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Frames put on the bus
    pub sent: usize,
    /// Frames the transport refused to build
    pub skipped: usize,
}

/// Replays frame sequences on a [`FrameSource`]
pub struct Replayer<'a> {
    source: &'a dyn FrameSource,
    config: ReplayConfig,
}

impl<'a> Replayer<'a> {
    pub fn new(source: &'a dyn FrameSource, config: ReplayConfig) -> Self {
        Self { source, config }
    }

    /// Send `frames` in order, sleeping the configured gap after each one
    ///
    /// A frame the transport cannot build is skipped with a warning. Any other
    /// error aborts the run and is returned to the caller.
    pub fn replay(&self, frames: &[Frame]) -> Result<ReplayStats> {
        let gap = self.config.frame_gap();
        let mut stats = ReplayStats::default();

        for (index, frame) in frames.iter().enumerate() {
            let counter = index + 1;
            if self.config.progress_interval > 0 && counter % self.config.progress_interval == 0 {
                log::info!("Frame {}/{}", counter, frames.len());
            }

            match self.source.send(frame) {
                Ok(()) => {
                    stats.sent += 1;
                    if !gap.is_zero() {
                        thread::sleep(gap);
                    }
                }
                Err(CanError::InvalidFrame(reason)) => {
                    log::warn!("Ignoring damaged frame {}: {}", frame, reason);
                    stats.skipped += 1;
                }
                Err(e) => {
                    log::debug!("Socket error received on {}: {}", self.source.name(), e);
                    return Err(e);
                }
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MemorySource;
    use std::time::{Duration, Instant};

    fn frames(ids: &[u32]) -> Vec<Frame> {
        ids.iter().map(|&id| Frame::new(id, vec![id as u8]).unwrap()).collect()
    }

    #[test]
    fn test_replay_in_order() {
        let source = MemorySource::new("vcan0");
        let replayer = Replayer::new(&source, ReplayConfig::default());

        let stats = replayer.replay(&frames(&[3, 1, 2])).unwrap();
        assert_eq!(stats, ReplayStats { sent: 3, skipped: 0 });
        assert_eq!(source.sent(), frames(&[3, 1, 2]));
    }

    #[test]
    fn test_damaged_frames_skipped() {
        let source = MemorySource::new("vcan0").reject_id(2);
        let replayer = Replayer::new(&source, ReplayConfig::default());

        let stats = replayer.replay(&frames(&[1, 2, 3])).unwrap();
        assert_eq!(stats, ReplayStats { sent: 2, skipped: 1 });
        assert_eq!(source.sent(), frames(&[1, 3]));
    }

    #[test]
    fn test_io_error_aborts() {
        let source = MemorySource::new("vcan0").fail_send_at(2);
        let replayer = Replayer::new(&source, ReplayConfig::default());

        let result = replayer.replay(&frames(&[1, 2, 3]));
        assert!(matches!(result, Err(CanError::Io(_))));
        assert_eq!(source.sent(), frames(&[1]));
    }

    #[test]
    fn test_frame_gap_applied() {
        let source = MemorySource::new("vcan0");
        let replayer = Replayer::new(&source, ReplayConfig::new().with_frame_gap_ms(10.0));

        let start = Instant::now();
        replayer.replay(&frames(&[1, 2, 3])).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
