use thiserror::Error;

/// Errors produced by the framing/codec layer.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("unknown message code: {0}")]
    UnknownCode(u8),

    #[error("frame of {0} bytes exceeds the {1} byte limit")]
    FrameTooLarge(usize, usize),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
