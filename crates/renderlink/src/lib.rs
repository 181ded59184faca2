//! Binary command protocol between a numeric host and a render server.
//!
//! A host process drives a separate real-time renderer over a local socket:
//! it writes typed drawing and display commands and reads back timestamps and
//! acknowledgements. Both ends are built from the same command catalogue and
//! exchange fixed-width native-endian scalars with no length prefix.
//!
//! # Crate Structure
//!
//! - [`transport`]: communicator trait, Unix domain sockets, in-memory pairs
//! - [`protocol`]: command catalogue, scalar/array codec, payload layouts
//! - [`dispatch`]: render-server dispatch loop and host-side sender

/// Re-export transport types.
pub mod transport {
    pub use renderlink_transport::*;
}

/// Re-export protocol types.
pub mod protocol {
    pub use renderlink_protocol::*;
}

/// Re-export dispatch types.
pub mod dispatch {
    pub use renderlink_dispatch::*;
}
