//! CLI error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Codec error: {0}")]
    Codec(#[from] vcm_codec::CodecError),

    #[error("Safety error: {0}")]
    Safety(#[from] vcm_safety::SafetyError),

    #[error("Policy error: {0}")]
    Policy(#[from] vcm_policy::PolicyError),

    #[error("Audit error: {0}")]
    Audit(#[from] vcm_audit::AuditError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] vcm_runtime::RuntimeError),

    #[error("Transport error: {0}")]
    Transport(#[from] vcm_transport::TransportError),

    #[error("Audit chain verification failed: {0}")]
    ChainBroken(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
