//! Core types for the CAN search library
//!
//! This module defines the strongly-typed frame record shared by the capture
//! pipeline, the noise filter and the bisecting search, together with the
//! library-wide error type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type used throughout the library
pub type Timestamp = DateTime<Utc>;

/// Result type for library operations
pub type Result<T> = std::result::Result<T, CanError>;

/// Largest 11-bit (standard) arbitration ID
pub const MAX_STANDARD_ID: u32 = 0x7FF;

/// Largest 29-bit (extended) arbitration ID
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// Maximum payload length of a classic CAN frame
pub const MAX_PAYLOAD_LEN: usize = 8;

/// One capture run's ordered frames
pub type Sample = Vec<Frame>;

/// Frames captured while the target was idle; only ever used as a subtraction mask
pub type NoiseSet = Vec<Frame>;

/// Errors that can occur while capturing, filtering or replaying frames
#[derive(Debug, thiserror::Error)]
pub enum CanError {
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Invalid log line: {0}")]
    InvalidLogLine(String),

    #[error("Bus I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame source closed")]
    SourceClosed,

    #[error("Capture task panicked: {0}")]
    TaskPanicked(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CanError {
    /// True for bus errors worth retrying on the next iteration
    pub fn is_transient(&self) -> bool {
        match self {
            CanError::Io(e) => !matches!(
                e.kind(),
                std::io::ErrorKind::NotFound
                    | std::io::ErrorKind::PermissionDenied
                    | std::io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

/// How noise frames are matched against sample frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Both ID and payload must be equal
    #[default]
    IdAndPayload,
    /// Equal IDs match regardless of payload
    IdOnly,
}

impl MatchMode {
    /// Check whether `noise` masks `candidate` under this mode
    pub fn matches(&self, noise: &Frame, candidate: &Frame) -> bool {
        match self {
            MatchMode::IdAndPayload => noise.key() == candidate.key(),
            MatchMode::IdOnly => noise.id == candidate.id,
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMode::IdAndPayload => write!(f, "id+payload"),
            MatchMode::IdOnly => write!(f, "id-only"),
        }
    }
}

/// A single CAN bus frame
///
/// The payload length is always derived from the payload itself, and a frame
/// can only be constructed from valid data: IDs beyond 29 bits and payloads
/// longer than 8 bytes are rejected up front, so every engine can assume its
/// input is well-formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    id: u32,
    payload: Vec<u8>,
    extended: bool,
    /// Capture time, if known
    pub timestamp: Option<Timestamp>,
    /// Interface the frame was captured on, if known
    pub interface: Option<String>,
}

impl Frame {
    /// Create a frame, choosing the extended format when the ID needs it
    pub fn new(id: u32, payload: impl Into<Vec<u8>>) -> Result<Self> {
        Self::with_format(id, payload, id > MAX_STANDARD_ID)
    }

    /// Create a frame with an explicit standard/extended format
    pub fn with_format(id: u32, payload: impl Into<Vec<u8>>, extended: bool) -> Result<Self> {
        let payload = payload.into();
        let limit = if extended { MAX_EXTENDED_ID } else { MAX_STANDARD_ID };
        if id > limit {
            return Err(CanError::InvalidFrame(format!(
                "ID 0x{:X} exceeds the {} range",
                id,
                if extended { "29-bit" } else { "11-bit" }
            )));
        }
        check_payload(&payload)?;
        Ok(Self {
            id,
            payload,
            extended,
            timestamp: None,
            interface: None,
        })
    }

    /// Build a frame from its hex text form, e.g. `("1FD", "00FF")`
    ///
    /// IDs written with more than 3 characters are treated as extended.
    pub fn from_hex(id: &str, data: &str) -> Result<Self> {
        let id_text = id.trim();
        let data_text = data.trim();

        if id_text.is_empty() || !is_hex(id_text) {
            return Err(CanError::InvalidFrame(format!("CAN ID is no hex string: '{}'", id)));
        }
        if !is_hex(data_text) {
            return Err(CanError::InvalidFrame(format!("data is no hex string: '{}'", data)));
        }
        if data_text.len() % 2 != 0 {
            return Err(CanError::InvalidFrame(format!(
                "data has an odd number of hex characters: '{}'",
                data
            )));
        }

        let can_id = u32::from_str_radix(id_text, 16)
            .map_err(|e| CanError::InvalidFrame(format!("CAN ID '{}': {}", id, e)))?;
        let payload = decode_hex(data_text)?;
        let extended = id_text.len() > 3 || can_id > MAX_STANDARD_ID;

        Self::with_format(can_id, payload, extended)
    }

    /// Builder method: attach a capture timestamp
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Builder method: attach the originating interface name
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    /// Number of payload bytes
    pub fn length(&self) -> usize {
        self.payload.len()
    }

    /// Replace the payload; the length follows automatically
    pub fn set_payload(&mut self, payload: impl Into<Vec<u8>>) -> Result<()> {
        let payload = payload.into();
        check_payload(&payload)?;
        self.payload = payload;
        Ok(())
    }

    /// The `(id, payload)` pair used for every frame comparison
    pub fn key(&self) -> (u32, &[u8]) {
        (self.id, &self.payload)
    }

    /// ID as uppercase hex, padded to 3 (standard) or 8 (extended) characters
    pub fn id_hex(&self) -> String {
        if self.extended {
            format!("{:08X}", self.id)
        } else {
            format!("{:03X}", self.id)
        }
    }

    /// Payload as uppercase hex, two characters per byte
    pub fn payload_hex(&self) -> String {
        self.payload.iter().map(|b| format!("{:02X}", b)).collect()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.id_hex(), self.payload_hex())
    }
}

fn check_payload(payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(CanError::InvalidFrame(format!(
            "payload has {} bytes, at most {} allowed",
            payload.len(),
            MAX_PAYLOAD_LEN
        )));
    }
    Ok(())
}

fn is_hex(text: &str) -> bool {
    text.chars().all(|c| c.is_ascii_hexdigit())
}

fn decode_hex(text: &str) -> Result<Vec<u8>> {
    (0..text.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&text[i..i + 2], 16)
                .map_err(|e| CanError::InvalidFrame(format!("data '{}': {}", text, e)))
        })
        .collect()
}
