use trialdb_store::StoreError;
use trialdb_transport::TransportError;
use trialdb_wire::WireError;

/// Errors from the dispatch server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A connection thread panicked while holding the store mutex.
    #[error("store mutex poisoned")]
    Poisoned,
}

/// Result alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
