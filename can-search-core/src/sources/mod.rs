//! Frame source implementations
//!
//! - [`MemorySource`]: in-process loopback, always available
//! - `SocketCanSource`: Linux SocketCAN, behind the `socketcan` feature

pub mod memory;
#[cfg(feature = "socketcan")]
pub mod socketcan;

pub use memory::MemorySource;
#[cfg(feature = "socketcan")]
pub use self::socketcan::SocketCanSource;
