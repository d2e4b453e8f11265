//! Bounded single-producer/single-consumer frame conduit

use crate::types::Frame;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Result of pushing one frame into the conduit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushResult {
    Delivered,
    /// The conduit stayed full and the producer was disabled meanwhile
    Dropped,
    /// The consumer side is gone
    Disconnected,
}

/// Result of waiting on the consumer side
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Frame(Frame),
    /// Nothing arrived within the wait
    Empty,
    /// The producer side is gone and the conduit is drained
    Closed,
}

/// Bounded conduit moving frames from a capture producer to its consumer
///
/// Frames come out in exactly the order they went in. Split it once; each
/// half has a single owner.
pub struct CaptureChannel {
    sender: FrameSender,
    receiver: FrameReceiver,
}

impl CaptureChannel {
    /// Create a conduit holding at most `capacity` frames (at least one)
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            sender: FrameSender { tx },
            receiver: FrameReceiver { rx },
        }
    }

    pub fn split(self) -> (FrameSender, FrameReceiver) {
        (self.sender, self.receiver)
    }
}

/// Producer half of a [`CaptureChannel`]
pub struct FrameSender {
    tx: Sender<Frame>,
}

impl FrameSender {
    /// Push a frame, waiting in slices of `retry` while the conduit is full
    ///
    /// Keeps waiting as long as `enabled` is set. A frame is only given up when
    /// the conduit is still full after the producer has been disabled.
    pub fn push(&self, frame: Frame, enabled: &AtomicBool, retry: Duration) -> PushResult {
        let mut pending = frame;
        loop {
            match self.tx.send_timeout(pending, retry) {
                Ok(()) => return PushResult::Delivered,
                Err(SendTimeoutError::Timeout(frame)) => {
                    if !enabled.load(Ordering::SeqCst) {
                        return PushResult::Dropped;
                    }
                    log::trace!("Capture conduit full, waiting");
                    pending = frame;
                }
                Err(SendTimeoutError::Disconnected(_)) => return PushResult::Disconnected,
            }
        }
    }
}

/// Consumer half of a [`CaptureChannel`]
pub struct FrameReceiver {
    rx: Receiver<Frame>,
}

impl FrameReceiver {
    /// Wait at most `timeout` for the next frame
    pub fn recv_timeout(&self, timeout: Duration) -> Delivery {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Delivery::Frame(frame),
            Err(RecvTimeoutError::Timeout) => Delivery::Empty,
            Err(RecvTimeoutError::Disconnected) => Delivery::Closed,
        }
    }

    /// Take a frame that is already waiting, without blocking
    pub fn try_next(&self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
