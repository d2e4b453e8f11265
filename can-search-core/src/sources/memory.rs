//! In-process loopback transport
//!
//! Frames injected with [`MemorySource::inject`] are handed out by
//! `try_receive` in order; sent frames are recorded and, with loopback
//! enabled, echoed back to the receive side like a virtual CAN interface.

use crate::source::FrameSource;
use crate::types::{CanError, Frame, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

enum Incoming {
    Frame(Frame),
    Error(io::ErrorKind),
    Closed,
}

/// Loopback frame source backed by an unbounded queue
pub struct MemorySource {
    name: String,
    incoming_tx: Sender<Incoming>,
    incoming_rx: Receiver<Incoming>,
    sent: Mutex<Vec<Frame>>,
    send_attempts: AtomicUsize,
    closed: AtomicBool,
    loopback: bool,
    rejected_ids: HashSet<u32>,
    fail_send_at: Option<usize>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>) -> Self {
        let (incoming_tx, incoming_rx) = unbounded();
        Self {
            name: name.into(),
            incoming_tx,
            incoming_rx,
            sent: Mutex::new(Vec::new()),
            send_attempts: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            loopback: false,
            rejected_ids: HashSet::new(),
            fail_send_at: None,
        }
    }

    /// Builder method: echo every sent frame to the receive side
    pub fn with_loopback(mut self, enabled: bool) -> Self {
        self.loopback = enabled;
        self
    }

    /// Builder method: refuse to build frames with this ID
    pub fn reject_id(mut self, id: u32) -> Self {
        self.rejected_ids.insert(id);
        self
    }

    /// Builder method: fail the nth send attempt (1-based) and every later one
    /// with a broken-pipe error
    pub fn fail_send_at(mut self, attempt: usize) -> Self {
        self.fail_send_at = Some(attempt);
        self
    }

    /// Queue a frame for the receive side
    pub fn inject(&self, frame: Frame) {
        let _ = self.incoming_tx.send(Incoming::Frame(frame));
    }

    /// Queue a receive error
    pub fn inject_error(&self, kind: io::ErrorKind) {
        let _ = self.incoming_tx.send(Incoming::Error(kind));
    }

    /// Mark the end of the stream once all queued items have been received
    pub fn close(&self) {
        let _ = self.incoming_tx.send(Incoming::Closed);
    }

    /// Frames sent so far, in send order
    pub fn sent(&self) -> Vec<Frame> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of frames sent so far
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl FrameSource for MemorySource {
    fn send(&self, frame: &Frame) -> Result<()> {
        let attempt = self.send_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_send_at.is_some_and(|n| attempt >= n) {
            return Err(CanError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("{}: send failed", self.name),
            )));
        }
        if self.rejected_ids.contains(&frame.id()) {
            return Err(CanError::InvalidFrame(format!(
                "{}: cannot build frame {}",
                self.name, frame
            )));
        }

        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame.clone());

        if self.loopback {
            self.inject(frame.clone().with_interface(self.name.clone()));
        }
        Ok(())
    }

    fn try_receive(&self, timeout: Duration) -> Result<Option<Frame>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CanError::SourceClosed);
        }

        match self.incoming_rx.recv_timeout(timeout) {
            Ok(Incoming::Frame(frame)) => Ok(Some(frame)),
            Ok(Incoming::Error(kind)) => Err(CanError::Io(io::Error::from(kind))),
            Ok(Incoming::Closed) => {
                self.closed.store(true, Ordering::SeqCst);
                Err(CanError::SourceClosed)
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(CanError::SourceClosed),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
