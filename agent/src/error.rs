use thiserror::Error;
use tunnel_protocol::ProtocolError;

/// Errors the agent-side library can raise. Mirrors
/// `tunnel_core::CoreError` — decode errors are unrecoverable for the
/// connection that produced them, send failures close only the
/// originating side, callback errors close the tunnel that triggered
/// them.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("envelope decode failed: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("send failed: connection's outbound queue is closed")]
    SendFailed,

    #[error("host callback failed: {0}")]
    Callback(String),
}

pub type AgentResult<T> = Result<T, AgentError>;
