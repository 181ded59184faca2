//! Communicator abstraction for the renderlink command protocol.
//!
//! A communicator owns exactly one bidirectional connection and hands out a
//! byte reader and a byte writer for it:
//! - Unix domain sockets addressed by filesystem path ([`LocalSocketCommunicator`])
//! - In-memory connected pairs for tests ([`MemoryCommunicator`])
//!
//! This is the lowest layer of renderlink. The codec never touches a socket
//! directly; it only sees the [`ByteReader`] and [`ByteWriter`] traits.

pub mod error;
pub mod memory;
pub mod traits;

#[cfg(unix)]
pub mod socket;
#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use memory::MemoryCommunicator;
pub use traits::{ByteReader, ByteWriter, Communicator};

#[cfg(unix)]
pub use socket::{LocalSocketCommunicator, Role, SocketConfig};
#[cfg(unix)]
pub use uds::UnixDomainSocket;
