/// Errors from wire encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),
}

/// Result alias for wire operations.
pub type WireResult<T> = Result<T, WireError>;
