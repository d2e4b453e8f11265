//! Linux SocketCAN transport
//!
//! Wraps a raw `socketcan::CanSocket`. The interface must already be up and
//! configured (bitrate, or `vcan` for a virtual bus):
//!
//! ```text
//! sudo ip link set can0 up type can bitrate 500000
//! ```

use crate::source::FrameSource;
use crate::types::{CanError, Frame, Result};
use ::socketcan::{CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Id, Socket, StandardId};
use std::io;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Frame source on a SocketCAN interface
pub struct SocketCanSource {
    interface: String,
    socket: CanSocket,
    read_timeout: Mutex<Option<Duration>>,
}

impl SocketCanSource {
    /// Open a raw CAN socket on `interface` (e.g. `can0`, `vcan0`)
    pub fn open(interface: &str) -> Result<Self> {
        log::info!("Opening SocketCAN interface {}", interface);
        let socket = CanSocket::open(interface)?;
        Ok(Self {
            interface: interface.to_string(),
            socket,
            read_timeout: Mutex::new(None),
        })
    }

    /// Read and discard everything already queued on the socket
    pub fn clear(&self) -> Result<()> {
        self.socket.set_nonblocking(true)?;
        let mut discarded = 0usize;
        while self.socket.read_frame().is_ok() {
            discarded += 1;
        }
        self.socket.set_nonblocking(false)?;
        log::debug!("Discarded {} stale frame(s) on {}", discarded, self.interface);
        Ok(())
    }

    fn ensure_read_timeout(&self, timeout: Duration) -> Result<()> {
        let mut current = self.read_timeout.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != Some(timeout) {
            self.socket.set_read_timeout(timeout)?;
            *current = Some(timeout);
        }
        Ok(())
    }

    fn build(frame: &Frame) -> Result<CanFrame> {
        let id: Id = if frame.is_extended() {
            ExtendedId::new(frame.id()).map(Id::Extended)
        } else {
            u16::try_from(frame.id())
                .ok()
                .and_then(StandardId::new)
                .map(Id::Standard)
        }
        .ok_or_else(|| CanError::InvalidFrame(format!("ID out of range: {}", frame)))?;

        CanFrame::new(id, frame.payload())
            .ok_or_else(|| CanError::InvalidFrame(format!("cannot build frame {}", frame)))
    }

    /// Turn a received frame into a [`Frame`]; remote and error frames carry
    /// no payload to search and yield `None`
    fn convert(interface: &str, raw: &CanFrame) -> Result<Option<Frame>> {
        match raw {
            CanFrame::Data(_) => {}
            CanFrame::Remote(_) => {
                log::trace!("Ignoring remote frame on {}", interface);
                return Ok(None);
            }
            CanFrame::Error(_) => {
                log::trace!("Ignoring error frame on {}", interface);
                return Ok(None);
            }
        }

        let (id, extended) = match raw.id() {
            Id::Standard(id) => (u32::from(id.as_raw()), false),
            Id::Extended(id) => (id.as_raw(), true),
        };
        let frame = Frame::with_format(id, raw.data().to_vec(), extended)?
            .with_timestamp(chrono::Utc::now())
            .with_interface(interface.to_string());
        Ok(Some(frame))
    }
}

impl FrameSource for SocketCanSource {
    fn send(&self, frame: &Frame) -> Result<()> {
        let raw = Self::build(frame)?;
        self.socket.write_frame(&raw)?;
        Ok(())
    }

    fn try_receive(&self, timeout: Duration) -> Result<Option<Frame>> {
        self.ensure_read_timeout(timeout)?;
        match self.socket.read_frame() {
            Ok(raw) => Self::convert(&self.interface, &raw),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(CanError::Io(e)),
        }
    }

    fn name(&self) -> &str {
        &self.interface
    }
}
