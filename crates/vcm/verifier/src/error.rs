use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifierError {
    #[error("invalid checksum key: {0}")]
    InvalidKey(String),

    #[error("message has no checksum")]
    MissingChecksum,

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("validation failed: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
