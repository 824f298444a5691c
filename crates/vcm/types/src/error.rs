use thiserror::Error;

/// Errors from building or interpreting a vector message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("unsupported vector dimension: {0}")]
    UnsupportedDimension(u32),

    #[error("unknown vector encoding tag: {0}")]
    UnknownEncoding(u8),

    #[error("unknown message intent tag: {0}")]
    UnknownIntent(u8),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid message: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_joins_reasons() {
        let err = MessageError::Invalid(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "invalid message: a; b");
    }
}
