//! Log file formats
//!
//! Frame sets are exchanged as candump text logs, the format produced and
//! consumed by the SocketCAN `can-utils`.

pub mod candump;

pub use candump::{format_line, parse_line, parse_log, read_log, write_log, LogParse};
