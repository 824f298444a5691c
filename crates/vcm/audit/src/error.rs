use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("audit chain is broken: {0}")]
    BrokenChain(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AuditError>;
