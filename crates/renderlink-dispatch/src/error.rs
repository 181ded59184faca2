use renderlink_protocol::CommandCode;

/// Errors that can occur while dispatching or sending commands.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] renderlink_transport::TransportError),

    /// Codec or payload error.
    #[error("protocol error: {0}")]
    Protocol(#[from] renderlink_protocol::ProtocolError),

    /// A reply field came back short or as its sentinel value.
    #[error("{command} reply failed: {what}")]
    ReplyFailed {
        command: CommandCode,
        what: &'static str,
    },
}

impl DispatchError {
    /// Whether the command stream can no longer be trusted.
    pub fn desynchronizes(&self) -> bool {
        match self {
            DispatchError::Transport(_) | DispatchError::ReplyFailed { .. } => true,
            DispatchError::Protocol(err) => err.desynchronizes(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
