//! candump text logs
//!
//! One frame per line in the format written by `candump -l`:
//!
//! ```text
//! (1493280437.565631) can0 1FD#0000000000000000
//! ```

use crate::types::{CanError, Frame, Result, Timestamp};
use chrono::DateTime;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Rendered when a frame carries no capture time
pub const DEFAULT_TIMESTAMP: &str = "0000000000.000000";

/// Rendered when a frame carries no interface
pub const DEFAULT_INTERFACE: &str = "can0";

/// Frames read from a log plus the number of lines that were skipped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogParse {
    pub frames: Vec<Frame>,
    pub invalid_lines: usize,
}

/// Parse a single `(timestamp) interface ID#DATA` line
pub fn parse_line(line: &str) -> Result<Frame> {
    let mut columns = line.split_whitespace();
    let (Some(stamp), Some(interface), Some(body)) = (columns.next(), columns.next(), columns.next())
    else {
        return Err(CanError::InvalidLogLine(format!("expected 3 columns: '{}'", line)));
    };

    let (id, data) = body
        .split_once('#')
        .ok_or_else(|| CanError::InvalidLogLine(format!("missing '#' separator: '{}'", line)))?;
    if data.contains('#') {
        return Err(CanError::InvalidLogLine(format!("unsupported frame body: '{}'", line)));
    }

    let frame = Frame::from_hex(id, data)
        .map_err(|e| CanError::InvalidLogLine(format!("{}: '{}'", e, line)))?
        .with_interface(interface);

    match parse_timestamp(stamp) {
        Some(timestamp) => Ok(frame.with_timestamp(timestamp)),
        None => Err(CanError::InvalidLogLine(format!("bad timestamp '{}'", stamp))),
    }
}

fn parse_timestamp(stamp: &str) -> Option<Timestamp> {
    let inner = stamp.strip_prefix('(')?.strip_suffix(')')?;
    let (secs, fraction) = inner.split_once('.').unwrap_or((inner, "0"));
    if fraction.is_empty() || fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let secs: i64 = secs.parse().ok()?;
    let nanos: u32 = format!("{:0<9}", fraction).parse().ok()?;
    DateTime::from_timestamp(secs, nanos)
}

/// Parse a whole log, skipping (and counting) lines that do not parse
///
/// Blank lines are ignored without being counted.
pub fn parse_log(text: &str) -> LogParse {
    let mut parsed = LogParse::default();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line) {
            Ok(frame) => parsed.frames.push(frame),
            Err(e) => {
                log::warn!("Skipping line {}: {}", number + 1, e);
                parsed.invalid_lines += 1;
            }
        }
    }
    parsed
}

/// Render a frame as one log line (without newline)
pub fn format_line(frame: &Frame) -> String {
    let stamp = frame
        .timestamp
        .map(|ts| format!("{:010}.{:06}", ts.timestamp(), ts.timestamp_subsec_micros()))
        .unwrap_or_else(|| DEFAULT_TIMESTAMP.to_string());
    let interface = frame.interface.as_deref().unwrap_or(DEFAULT_INTERFACE);
    format!("({}) {} {}", stamp, interface, frame)
}

/// Read a candump log file
pub fn read_log(path: &Path) -> Result<LogParse> {
    let text = fs::read_to_string(path)?;
    let parsed = parse_log(&text);
    log::info!(
        "Read {} frame(s) from {} ({} invalid line(s))",
        parsed.frames.len(),
        path.display(),
        parsed.invalid_lines
    );
    Ok(parsed)
}

/// Write frames to a candump log file, replacing it
pub fn write_log(path: &Path, frames: &[Frame]) -> Result<()> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    for frame in frames {
        writeln!(writer, "{}", format_line(frame))?;
    }
    writer.flush()?;
    log::info!("Wrote {} frame(s) to {}", frames.len(), path.display());
    Ok(())
}
