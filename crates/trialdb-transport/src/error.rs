/// Errors from the transport layer.
///
/// Handshake and decryption failures are channel errors: the connection
/// they occur on is torn down, not retried.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key exchange failed (short read, non-contributory peer key, or
    /// key derivation failure).
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A frame failed to decrypt or unpad.
    #[error("decryption failed: {0}")]
    Crypto(String),

    /// A frame header announced an impossible length.
    #[error("framing error: {0}")]
    Framing(String),

    /// A frame exceeded the size limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The requested security layer name is not recognized.
    #[error("unknown security layer: {0}")]
    UnknownSecurityLayer(String),
}

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
