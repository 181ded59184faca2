//! Command catalogue and wire codec for the renderlink protocol.
//!
//! Every command on the wire is a 2-byte command code followed by the
//! command's payload fields in catalogue order:
//!
//! ```text
//! ┌────────────────┬──────────────────────────────────────────────┐
//! │ Code (2B, NE)  │ Payload: fixed-width scalars and arrays      │
//! │                │ (lengths implied by earlier fields/command)  │
//! └────────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! There is no length prefix. Both endpoints must be built from the same
//! catalogue or framing desynchronizes for the rest of the connection.
//! Scalars use native byte order.

pub mod codec;
pub mod command;
pub mod error;
pub mod payload;
pub mod sizes;

pub use codec::{
    discard, read, read_array, read_command_code, try_read, try_read_array, try_read_array_into,
    try_read_command_code, try_write, try_write_array, write, write_array, write_command_code,
    WireScalar,
};
pub use command::{CommandCode, CommandSpec, ReplyShape, CATALOGUE};
pub use error::{ProtocolError, Result};
pub use payload::{
    Command, DecodeLimits, Vertices, COLORED_VERTEX_FLOATS, DEFAULT_MAX_PAYLOAD, DOT_VERTEX_FLOATS,
    IDENTITY_4X4, TEXTURED_VERTEX_FLOATS,
};
