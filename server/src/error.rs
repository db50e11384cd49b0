use thiserror::Error;

/// Errors raised while running the Diffie-Hellman handshake on a frontend
/// connection. Any of these aborts that connection only (error kind 5).
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("peer sent a malformed DH public value")]
    MalformedPublicValue,

    #[error("peer's public value failed the safety check")]
    UnsafePublicValue,

    #[error("peer closed the connection before completing the handshake")]
    ClosedEarly,
}
