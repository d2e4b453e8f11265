//! Bus transport abstraction
//!
//! A [`FrameSource`] is whatever can put a frame on the bus and pull one off
//! it with a bounded wait. Implementations live in [`crate::sources`].

use crate::types::{Frame, Result};
use std::time::Duration;

/// A CAN interface able to send and receive single frames
///
/// Sending and receiving are independent operations, so a capture session may
/// receive on a source while a search replays on it. Callers must still not
/// issue overlapping sends from two threads.
pub trait FrameSource: Send + Sync {
    /// Put one frame on the bus
    ///
    /// Returns [`CanError::InvalidFrame`](crate::CanError::InvalidFrame) if the
    /// transport cannot build the frame, [`CanError::Io`](crate::CanError::Io)
    /// on a bus failure.
    fn send(&self, frame: &Frame) -> Result<()>;

    /// Wait at most `timeout` for the next frame
    ///
    /// `Ok(None)` means nothing arrived in time. Hard I/O failures are returned
    /// as errors; [`CanError::SourceClosed`](crate::CanError::SourceClosed)
    /// means no further frame will ever arrive.
    fn try_receive(&self, timeout: Duration) -> Result<Option<Frame>>;

    /// Human readable interface name for logs
    fn name(&self) -> &str;
}

impl<T: FrameSource + ?Sized> FrameSource for std::sync::Arc<T> {
    fn send(&self, frame: &Frame) -> Result<()> {
        (**self).send(frame)
    }

    fn try_receive(&self, timeout: Duration) -> Result<Option<Frame>> {
        (**self).try_receive(timeout)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
