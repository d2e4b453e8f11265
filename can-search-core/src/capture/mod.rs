//! Bus capture
//!
//! A [`CaptureSession`] runs a producer thread that reads a [`FrameSource`]
//! with bounded waits and a consumer thread that collects the frames handed
//! over through a bounded [`CaptureChannel`]. [`SampleCollector`] builds the
//! noise/sample workflow of the filter on top of it.
//!
//! [`FrameSource`]: crate::source::FrameSource

pub mod channel;
pub mod collector;
pub mod session;
pub mod throttle;

pub use channel::{CaptureChannel, Delivery, FrameReceiver, FrameSender, PushResult};
pub use collector::{CollectionControl, SampleCollector, NOISE_TICK};
pub use session::{Capture, CaptureSession, ProducerStats};
pub use throttle::ErrorThrottle;
