use thiserror::Error;
use vcm_audit::AuditError;
use vcm_codec::CodecError;
use vcm_policy::PolicyError;
use vcm_safety::SafetyError;
use vcm_transport::TransportError;
use vcm_types::MessageError;
use vcm_verifier::VerifierError;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("message error: {0}")]
    Message(#[from] MessageError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("verification error: {0}")]
    Verifier(#[from] VerifierError),

    #[error("safety error: {0}")]
    Safety(#[from] SafetyError),

    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("configuration error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("tracing setup failed: {0}")]
    Tracing(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
