//! Producer/consumer capture session

use super::channel::{CaptureChannel, Delivery, FrameReceiver, FrameSender, PushResult};
use super::throttle::ErrorThrottle;
use crate::config::CaptureConfig;
use crate::observer::CaptureObserver;
use crate::source::FrameSource;
use crate::types::{CanError, Frame, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Pause after a failed receive so a dead bus does not spin a core
const ERROR_BACKOFF: Duration = Duration::from_millis(1);

/// Counters of the producer side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    /// Frames received from the source
    pub received: u64,
    /// Receive errors seen (logged or not)
    pub errors: u64,
    /// Frames given up because capture stopped while the conduit was full
    pub dropped: u64,
}

/// Everything a finished session captured
#[derive(Debug, Clone, Default)]
pub struct Capture {
    /// Captured frames in arrival order
    pub frames: Vec<Frame>,
    pub stats: ProducerStats,
}

impl Capture {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

/// A running capture: one producer thread reading the bus, one consumer
/// thread collecting what the producer hands over
///
/// Both threads have their own enabled flag. [`CaptureSession::stop`] shuts
/// them down in order and returns the captured frames.
pub struct CaptureSession {
    label: String,
    producer_enabled: Arc<AtomicBool>,
    consumer_enabled: Arc<AtomicBool>,
    captured: Arc<AtomicUsize>,
    producer: Option<JoinHandle<ProducerStats>>,
    consumer: Option<JoinHandle<Vec<Frame>>>,
}

impl CaptureSession {
    /// Start capturing from `source`
    ///
    /// `label` names the threads and log lines, e.g. `noise` or `sample-2`.
    pub fn start(
        label: &str,
        source: Arc<dyn FrameSource>,
        config: &CaptureConfig,
        observer: Arc<dyn CaptureObserver>,
    ) -> Result<Self> {
        config.validate()?;
        let (sender, receiver) = CaptureChannel::bounded(config.channel_capacity).split();
        let producer_enabled = Arc::new(AtomicBool::new(true));
        let consumer_enabled = Arc::new(AtomicBool::new(true));
        let captured = Arc::new(AtomicUsize::new(0));

        log::info!("Starting capture '{}' on {}", label, source.name());

        let consumer = {
            let enabled = Arc::clone(&consumer_enabled);
            let captured = Arc::clone(&captured);
            let poll = config.consumer_poll();
            thread::Builder::new()
                .name(format!("capture-consumer-{}", label))
                .spawn(move || run_consumer(receiver, enabled, captured, observer, poll))?
        };

        let producer = {
            let enabled = Arc::clone(&producer_enabled);
            let config = config.clone();
            let spawned = thread::Builder::new()
                .name(format!("capture-producer-{}", label))
                .spawn(move || run_producer(source, sender, enabled, config));
            match spawned {
                Ok(handle) => handle,
                Err(e) => {
                    // The sender went down with the closure, so the consumer exits on its own
                    consumer_enabled.store(false, Ordering::SeqCst);
                    let _ = consumer.join();
                    return Err(CanError::Io(e));
                }
            }
        };

        Ok(Self {
            label: label.to_string(),
            producer_enabled,
            consumer_enabled,
            captured,
            producer: Some(producer),
            consumer: Some(consumer),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of frames the consumer has collected so far
    pub fn frames_so_far(&self) -> usize {
        self.captured.load(Ordering::SeqCst)
    }

    /// False once the producer has ended, e.g. because the source closed
    pub fn is_producing(&self) -> bool {
        self.producer.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stop both threads and hand out what was captured
    ///
    /// The producer is stopped and joined first. The consumer then drains the
    /// conduit, so every frame the producer accepted ends up in the result.
    pub fn stop(mut self) -> Result<Capture> {
        let (stats, frames) = self.shutdown()?;
        log::info!(
            "Capture '{}' stopped: {} frame(s), {} receive error(s)",
            self.label,
            frames.len(),
            stats.errors
        );
        if stats.dropped > 0 {
            log::warn!(
                "Capture '{}' dropped {} frame(s) while stopping with a full conduit",
                self.label,
                stats.dropped
            );
        }
        Ok(Capture { frames, stats })
    }

    fn shutdown(&mut self) -> Result<(ProducerStats, Vec<Frame>)> {
        self.producer_enabled.store(false, Ordering::SeqCst);
        let stats = match self.producer.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| CanError::TaskPanicked("capture producer"))?,
            None => ProducerStats::default(),
        };

        self.consumer_enabled.store(false, Ordering::SeqCst);
        let frames = match self.consumer.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| CanError::TaskPanicked("capture consumer"))?,
            None => Vec::new(),
        };

        Ok((stats, frames))
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if self.producer.is_some() || self.consumer.is_some() {
            log::debug!("Capture '{}' dropped without stop, discarding frames", self.label);
            let _ = self.shutdown();
        }
    }
}

fn run_producer(
    source: Arc<dyn FrameSource>,
    sender: FrameSender,
    enabled: Arc<AtomicBool>,
    config: CaptureConfig,
) -> ProducerStats {
    let mut stats = ProducerStats::default();
    let mut throttle = ErrorThrottle::new(config.error_log_interval);
    let timeout = config.poll_timeout();

    while enabled.load(Ordering::SeqCst) {
        match source.try_receive(timeout) {
            Ok(Some(frame)) => {
                stats.received += 1;
                match sender.push(frame, &enabled, timeout) {
                    PushResult::Delivered => {}
                    PushResult::Dropped => stats.dropped += 1,
                    PushResult::Disconnected => {
                        log::warn!("Capture consumer on {} is gone, stopping producer", source.name());
                        break;
                    }
                }
            }
            Ok(None) => {}
            Err(CanError::SourceClosed) => {
                log::info!("Source {} closed, capture producer ends", source.name());
                break;
            }
            Err(e) => {
                stats.errors += 1;
                if throttle.should_log() {
                    log::error!(
                        "Receive error on {} ({} so far): {}",
                        source.name(),
                        throttle.count(),
                        e
                    );
                }
                // Unavailable interface: back off a full poll
                thread::sleep(if e.is_transient() { ERROR_BACKOFF } else { timeout });
            }
        }
    }

    stats
}

fn run_consumer(
    receiver: FrameReceiver,
    enabled: Arc<AtomicBool>,
    captured: Arc<AtomicUsize>,
    observer: Arc<dyn CaptureObserver>,
    poll: Duration,
) -> Vec<Frame> {
    let mut frames = Vec::new();
    let mut deliver = |frame: Frame| {
        observer.on_frame_captured(&frame);
        frames.push(frame);
        captured.fetch_add(1, Ordering::SeqCst);
    };

    while enabled.load(Ordering::SeqCst) {
        match receiver.recv_timeout(poll) {
            Delivery::Frame(frame) => deliver(frame),
            Delivery::Empty => {}
            Delivery::Closed => break,
        }
    }

    // Producer is joined by now; take whatever it left behind
    while let Some(frame) = receiver.try_next() {
        deliver(frame);
    }

    frames
}
