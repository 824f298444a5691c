use thiserror::Error;
use vcm_types::AgentId;
use vcm_verifier::VerifierError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("transport for {0} is not running")]
    NotRunning(AgentId),

    #[error("transport for {0} is already running")]
    AlreadyRunning(AgentId),

    #[error("outbound queue full for {0}, message dropped")]
    QueueFull(AgentId),

    #[error("invalid message: {}", .0.join("; "))]
    InvalidMessage(Vec<String>),

    #[error("checksum error: {0}")]
    Checksum(#[from] VerifierError),

    #[error("no members in group '{0}'")]
    EmptyGroup(String),

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("transport task failed: {0}")]
    Task(String),
}
