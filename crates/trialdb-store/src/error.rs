use std::path::PathBuf;
use std::time::Duration;

use trialdb_query::QueryError;
use trialdb_types::EntityId;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Version stamps diverged under an atomic guard. Retriable: reload
    /// the entity and resubmit.
    #[error("concurrent write detected: {ours} != {theirs}")]
    ConcurrentWrite { ours: u64, theirs: u64 },

    /// An index or ownership list references an id missing from the
    /// object map.
    #[error("object map has no entry for referenced id {id}")]
    ConsistencyFault { id: EntityId },

    /// The id is not present in the store at all.
    #[error("unknown entity {id}")]
    UnknownEntity { id: EntityId },

    /// A strict store refused to create a group without an owning project.
    #[error("cannot create group {group} without an associated project")]
    MissingOwner { group: String },

    /// A chronometer was finished without a matching start.
    #[error("chronometer {name} was never started")]
    ChronoNotStarted { name: String },

    /// The metric column is step-indexed but no step was supplied.
    #[error("metric {key} is step-indexed; a step is required")]
    StepRequired { key: String },

    /// The cross-process lock could not be acquired in time.
    #[error("timed out after {waited:?} waiting for lock {path}")]
    LockTimeout { path: PathBuf, waited: Duration },

    /// The predicate was malformed.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// I/O failure on the backing resource.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot encode/decode failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Failure in a remote backend (transport, framing, or an
    /// unrecognizable server response).
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
