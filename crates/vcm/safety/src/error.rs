use thiserror::Error;

/// Errors from building or applying a safety region.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SafetyError {
    #[error("vector has {actual} components, safety region expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector component {index} is not finite")]
    NonFiniteVector { index: usize },

    #[error("constraint '{label}' has a zero normal")]
    ZeroNormal { label: String },

    #[error("constraint '{label}' is not finite")]
    NonFinite { label: String },

    #[error("invalid region: {0}")]
    InvalidRegion(String),
}
