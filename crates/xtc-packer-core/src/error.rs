use thiserror::Error;

#[derive(Debug, Error)]
pub enum XtcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Frame {index} could not be decoded: {reason}")]
    FrameDecodeFailure { index: usize, reason: String },

    #[error("Malformed container: {0}")]
    MalformedContainer(String),

    #[error("Malformed chunk: {0}")]
    MalformedChunk(String),

    #[error("Conversion cancelled")]
    Cancelled,

    #[error("Out of memory: failed to allocate {bytes} bytes")]
    ResourceExhausted { bytes: usize },

    #[error("Internal invariant violated: {0}")]
    InternalInvariant(String),
}

pub type Result<T> = std::result::Result<T, XtcError>;
