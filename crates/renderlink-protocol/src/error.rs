use crate::command::CommandCode;

/// Errors raised at the structured (non-sentinel) boundary of the codec.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Fewer bytes arrived than the field needs.
    #[error("short read of {what}: expected {expected} bytes, got {actual}")]
    ShortRead {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Fewer bytes were written than the field needs.
    #[error("short write of {what}: expected {expected} bytes, wrote {actual}")]
    ShortWrite {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The 16-bit value is not an assigned command code.
    #[error("unknown command code {0:#06x}")]
    UnknownCommand(u16),

    /// An announced array exceeds the decode limit. Its bytes were discarded.
    #[error("{command} payload too large ({size} bytes, max {max})")]
    PayloadTooLarge {
        command: CommandCode,
        size: usize,
        max: usize,
    },

    /// An announced array size does not fit in memory arithmetic; framing is lost.
    #[error("{command} payload size overflows")]
    SizeOverflow { command: CommandCode },

    /// Fields handed to the encoder do not match the command's layout.
    #[error("malformed {command} payload: {reason}")]
    MalformedPayload {
        command: CommandCode,
        reason: String,
    },
}

impl ProtocolError {
    /// Whether the connection's framing can no longer be trusted.
    pub fn desynchronizes(&self) -> bool {
        matches!(
            self,
            ProtocolError::UnknownCommand(_)
                | ProtocolError::SizeOverflow { .. }
                | ProtocolError::ShortRead { .. }
                | ProtocolError::ShortWrite { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
