use thiserror::Error;
use vcm_types::MessageError;

/// Protocol errors from encoding or decoding frames.
///
/// Every variant rejects the frame as a whole.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("bad magic tag: expected {expected:?}, found {found:?}")]
    BadMagic { expected: [u8; 4], found: Vec<u8> },

    #[error("unsupported wire version {0}")]
    UnsupportedVersion(u16),

    #[error("truncated {section}: needed {needed} bytes, {available} available")]
    Truncated {
        section: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("dimension mismatch in {section}: header declares {expected}, found {actual}")]
    DimensionMismatch {
        section: String,
        expected: usize,
        actual: usize,
    },

    #[error("{0} trailing bytes after final section")]
    TrailingBytes(usize),

    #[error("frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("compression failed: {0}")]
    Compression(String),

    #[error("decompression failed: {0}")]
    Decompression(String),

    #[error("metadata error: {0}")]
    Metadata(String),

    #[error("invalid field: {0}")]
    InvalidField(String),
}

impl From<MessageError> for CodecError {
    fn from(e: MessageError) -> Self {
        CodecError::InvalidField(e.to_string())
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::Metadata(e.to_string())
    }
}
