/// Errors from identifier parsing and construction.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypeError {
    /// The input was not valid hexadecimal.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// The decoded byte length did not match the expected digest size.
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
