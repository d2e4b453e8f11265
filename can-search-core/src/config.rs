//! Engine configuration types
//!
//! This module defines the knobs of the capture pipeline, the replayer, the
//! noise filter and the bisecting search. All of them deserialize with
//! sensible defaults so an application can load partial sections from a file.

use crate::types::{CanError, MatchMode, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest accepted delay between two replayed frames (one minute)
pub const MAX_FRAME_GAP_MS: f64 = 60_000.0;

/// Configuration of one capture session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureConfig {
    /// Bounded wait of a single receive call on the bus (default: 100ms)
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,

    /// Bounded wait of the consumer on the capture conduit (default: 100ms)
    #[serde(default = "default_consumer_poll")]
    pub consumer_poll_ms: u64,

    /// Number of frames the conduit holds before the producer has to wait
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Log only every Nth receive error during sustained failure
    #[serde(default = "default_error_log_interval")]
    pub error_log_interval: u64,
}

fn default_poll_timeout() -> u64 {
    100
}

fn default_consumer_poll() -> u64 {
    100
}

fn default_channel_capacity() -> usize {
    4096
}

fn default_error_log_interval() -> u64 {
    10_000
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: default_poll_timeout(),
            consumer_poll_ms: default_consumer_poll(),
            channel_capacity: default_channel_capacity(),
            error_log_interval: default_error_log_interval(),
        }
    }
}

impl CaptureConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the bus receive timeout
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder method: set the consumer poll interval
    pub fn with_consumer_poll(mut self, timeout: Duration) -> Self {
        self.consumer_poll_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder method: set the conduit capacity
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Builder method: set the error log interval
    pub fn with_error_log_interval(mut self, interval: u64) -> Self {
        self.error_log_interval = interval;
        self
    }

    /// Reject settings a capture session cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.poll_timeout_ms == 0 {
            return Err(CanError::InvalidConfig("poll_timeout_ms must be positive".into()));
        }
        if self.consumer_poll_ms == 0 {
            return Err(CanError::InvalidConfig("consumer_poll_ms must be positive".into()));
        }
        if self.channel_capacity == 0 {
            return Err(CanError::InvalidConfig("channel_capacity must be positive".into()));
        }
        Ok(())
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn consumer_poll(&self) -> Duration {
        Duration::from_millis(self.consumer_poll_ms)
    }
}

/// Configuration of a replay run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplayConfig {
    /// Delay after each sent frame in milliseconds
    #[serde(default)]
    pub frame_gap_ms: f64,

    /// Log a progress line every N frames (0 disables it)
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
}

fn default_progress_interval() -> usize {
    1000
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            frame_gap_ms: 0.0,
            progress_interval: default_progress_interval(),
        }
    }
}

impl ReplayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration from an inter-frame delay in seconds
    ///
    /// Negative and non-finite values are clamped to zero.
    pub fn from_gap_secs(seconds: f64) -> Self {
        Self::default().with_frame_gap_ms(seconds * 1000.0)
    }

    /// Builder method: set the inter-frame delay in milliseconds
    ///
    /// Negative and NaN values become zero; anything above
    /// [`MAX_FRAME_GAP_MS`] (including infinity) is clamped to it.
    pub fn with_frame_gap_ms(mut self, millis: f64) -> Self {
        self.frame_gap_ms = if millis.is_nan() {
            0.0
        } else {
            millis.clamp(0.0, MAX_FRAME_GAP_MS)
        };
        self
    }

    /// Reject gaps that are negative, not a number, or above [`MAX_FRAME_GAP_MS`]
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=MAX_FRAME_GAP_MS).contains(&self.frame_gap_ms) {
            return Err(CanError::InvalidConfig(format!(
                "frame_gap_ms must be between 0 and {} ms, got {}",
                MAX_FRAME_GAP_MS, self.frame_gap_ms
            )));
        }
        Ok(())
    }

    /// Builder method: set the progress log interval
    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn frame_gap(&self) -> Duration {
        if self.frame_gap_ms.is_finite() && self.frame_gap_ms > 0.0 {
            Duration::try_from_secs_f64(self.frame_gap_ms.min(MAX_FRAME_GAP_MS) / 1000.0)
                .unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        }
    }
}

/// Configuration of the noise filter workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterConfig {
    /// How noise frames are matched
    #[serde(default)]
    pub match_mode: MatchMode,

    /// Seconds of idle traffic to record as noise (0 = no noise capture)
    #[serde(default)]
    pub noise_seconds: u64,

    /// Number of samples to record
    #[serde(default = "default_sample_amount")]
    pub samples: usize,
}

fn default_sample_amount() -> usize {
    2
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            match_mode: MatchMode::default(),
            noise_seconds: 0,
            samples: default_sample_amount(),
        }
    }
}

impl FilterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the match mode
    pub fn with_match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    /// Builder method: set the noise capture duration
    pub fn with_noise_seconds(mut self, seconds: u64) -> Self {
        self.noise_seconds = seconds;
        self
    }

    /// Builder method: set the number of samples
    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples;
        self
    }
}

/// Configuration of a bisecting search
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    /// Replay settings used for every chunk
    #[serde(default)]
    pub replay: ReplayConfig,

    /// Fixed seed for the retry shuffle (None = seeded from entropy)
    #[serde(default)]
    pub shuffle_seed: Option<u64>,
}

impl SearchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the replay settings
    pub fn with_replay(mut self, replay: ReplayConfig) -> Self {
        self.replay = replay;
        self
    }

    /// Builder method: fix the shuffle seed
    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }
}
