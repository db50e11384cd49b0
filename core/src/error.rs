use thiserror::Error;
use tunnel_protocol::ProtocolError;

/// Errors the routing core can raise. Each variant is one of the error
/// kinds from the spec's error handling design: decode errors close the
/// offending pipeline, send failures close only the originating side,
/// pool exhaustion refuses a new backend connection, and callback
/// errors close the backend pipeline that triggered them.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("envelope decode failed: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("send failed: peer's outbound queue is closed")]
    SendFailed,

    #[error("agent-id pool exhausted (255 backends already connected)")]
    PoolExhausted,

    #[error("host callback failed: {0}")]
    Callback(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
