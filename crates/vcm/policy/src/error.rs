use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("policy parse error: {0}")]
    Parse(String),

    #[error("policy is missing required limit: {0}")]
    MissingLimit(&'static str),

    #[error("invalid quantity for {field}: '{value}'")]
    InvalidQuantity { field: String, value: String },

    #[error("no policy loaded")]
    NotLoaded,

    #[error("unknown attestation key: {0}")]
    UnknownKey(String),

    #[error("attestation error: {0}")]
    Attestation(String),

    #[error("lock poisoned")]
    LockPoisoned,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_yaml::Error> for PolicyError {
    fn from(e: serde_yaml::Error) -> Self {
        PolicyError::Parse(e.to_string())
    }
}
