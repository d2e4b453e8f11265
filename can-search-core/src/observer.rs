//! Callbacks for front-ends
//!
//! The engines never talk to a UI directly. A front-end registers an
//! observer and gets notified of captured frames and search progress.

use crate::search::SearchState;
use crate::types::Frame;

/// Notified by the capture consumer for every delivered frame
///
/// Called from the consumer thread, hence `Send + Sync`.
pub trait CaptureObserver: Send + Sync {
    fn on_frame_captured(&self, frame: &Frame);
}

/// Notified whenever a bisecting search changes its state
pub trait SearchObserver {
    fn on_search_state_changed(&mut self, state: &SearchState);
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl CaptureObserver for NoopObserver {
    fn on_frame_captured(&self, _frame: &Frame) {}
}

impl SearchObserver for NoopObserver {
    fn on_search_state_changed(&mut self, _state: &SearchState) {}
}

impl<F> CaptureObserver for F
where
    F: Fn(&Frame) + Send + Sync,
{
    fn on_frame_captured(&self, frame: &Frame) {
        self(frame)
    }
}
