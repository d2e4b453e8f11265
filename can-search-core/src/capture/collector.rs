//! Noise and sample collection for the filter workflow
//!
//! The operator first records a stretch of background traffic, then records
//! one sample per manual trigger of the effect. Each recording is its own
//! [`CaptureSession`]; the results feed the [`NoiseFilter`].

use super::session::CaptureSession;
use crate::config::CaptureConfig;
use crate::noise_filter::{FilterReport, NoiseFilter};
use crate::observer::{CaptureObserver, NoopObserver};
use crate::source::FrameSource;
use crate::types::{NoiseSet, Result, Sample};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How often a running noise capture reports progress
pub const NOISE_TICK: Duration = Duration::from_millis(500);

/// Operator side of the filter workflow
pub trait CollectionControl {
    /// Called every [`NOISE_TICK`] while noise is being recorded
    ///
    /// Return `false` to cancel the noise capture.
    fn noise_progress(&mut self, elapsed: Duration, total: Duration, captured: usize) -> bool;

    /// Block until the operator closes sample `index` (1-based) of `total`
    ///
    /// The session is running while this is called, so an implementation can
    /// show [`CaptureSession::frames_so_far`].
    fn close_sample(&mut self, index: usize, total: usize, session: &CaptureSession);
}

/// Runs the capture sessions of the filter workflow on one source
pub struct SampleCollector {
    source: Arc<dyn FrameSource>,
    config: CaptureConfig,
    filter: NoiseFilter,
    observer: Arc<dyn CaptureObserver>,
}

impl SampleCollector {
    pub fn new(source: Arc<dyn FrameSource>, config: CaptureConfig, filter: NoiseFilter) -> Self {
        Self {
            source,
            config,
            filter,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Builder method: notify `observer` of every captured frame
    pub fn with_observer(mut self, observer: Arc<dyn CaptureObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Record background traffic for `duration`
    ///
    /// Returns `None` if the operator cancelled. The frames captured so far
    /// are discarded in that case.
    pub fn collect_noise(
        &self,
        duration: Duration,
        control: &mut dyn CollectionControl,
    ) -> Result<Option<NoiseSet>> {
        let session = self.start("noise")?;
        let started = Instant::now();
        let mut cancelled = false;

        loop {
            let elapsed = started.elapsed();
            if elapsed >= duration {
                break;
            }
            thread::sleep(NOISE_TICK.min(duration - elapsed));
            if !control.noise_progress(started.elapsed().min(duration), duration, session.frames_so_far()) {
                cancelled = true;
                break;
            }
        }

        let capture = session.stop()?;
        if cancelled {
            log::info!("Noise collection cancelled after {} frame(s)", capture.len());
            return Ok(None);
        }
        log::info!("Collected {} noise frame(s) in {:?}", capture.len(), duration);
        Ok(Some(capture.into_frames()))
    }

    /// Record sample `index` (1-based) of `total`, closed by the operator
    pub fn collect_sample(
        &self,
        index: usize,
        total: usize,
        control: &mut dyn CollectionControl,
    ) -> Result<Sample> {
        let session = self.start(&format!("sample-{}", index))?;
        control.close_sample(index, total, &session);
        let capture = session.stop()?;
        log::info!("Sample {}/{} holds {} frame(s)", index, total, capture.len());
        Ok(capture.into_frames())
    }

    /// Full workflow: noise, then `samples` samples, then the filter
    ///
    /// A zero `noise_duration` skips noise collection. Returns `None` when the
    /// operator cancelled the noise capture; no sample is collected then.
    pub fn run_filter(
        &self,
        noise_duration: Duration,
        samples: usize,
        control: &mut dyn CollectionControl,
    ) -> Result<Option<FilterReport>> {
        let noise = if noise_duration.is_zero() {
            log::debug!("Skipping noise collection");
            Vec::new()
        } else {
            match self.collect_noise(noise_duration, control)? {
                Some(noise) => noise,
                None => return Ok(None),
            }
        };

        let mut collected = Vec::with_capacity(samples);
        for index in 1..=samples {
            collected.push(self.collect_sample(index, samples, control)?);
        }

        Ok(Some(self.filter.apply(&noise, &collected)))
    }

    fn start(&self, label: &str) -> Result<CaptureSession> {
        CaptureSession::start(
            label,
            Arc::clone(&self.source),
            &self.config,
            Arc::clone(&self.observer),
        )
    }
}
