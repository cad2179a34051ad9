use serde::{Deserialize, Serialize};

use trialdb_store::StoreError;
use trialdb_types::EntityId;

/// Store error taxonomy, flattened for the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConcurrentWrite,
    ConsistencyFault,
    UnknownEntity,
    MalformedQuery,
    LockTimeout,
    Io,
    Internal,
}

/// A typed failure crossing the wire.
///
/// Carries enough structure for the client to rehydrate the failures a
/// caller is expected to handle programmatically — most importantly the
/// version stamps of a concurrent-write rejection, which a retry loop
/// needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ours: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theirs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityId>,
}

impl ErrorEnvelope {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            ours: None,
            theirs: None,
            entity: None,
        }
    }

    /// Rebuild the typed store error on the client side.
    pub fn into_store_error(self) -> StoreError {
        match self.kind {
            ErrorKind::ConcurrentWrite => StoreError::ConcurrentWrite {
                ours: self.ours.unwrap_or(0),
                theirs: self.theirs.unwrap_or(0),
            },
            ErrorKind::ConsistencyFault => match self.entity {
                Some(id) => StoreError::ConsistencyFault { id },
                None => StoreError::Backend(self.message),
            },
            ErrorKind::UnknownEntity => match self.entity {
                Some(id) => StoreError::UnknownEntity { id },
                None => StoreError::Backend(self.message),
            },
            ErrorKind::MalformedQuery => {
                StoreError::Query(trialdb_query::QueryError::Malformed(self.message))
            }
            _ => StoreError::Backend(self.message),
        }
    }
}

impl From<&StoreError> for ErrorEnvelope {
    fn from(err: &StoreError) -> Self {
        let mut envelope = ErrorEnvelope::new(
            match err {
                StoreError::ConcurrentWrite { .. } => ErrorKind::ConcurrentWrite,
                StoreError::ConsistencyFault { .. } => ErrorKind::ConsistencyFault,
                StoreError::UnknownEntity { .. } => ErrorKind::UnknownEntity,
                StoreError::Query(_) => ErrorKind::MalformedQuery,
                StoreError::LockTimeout { .. } => ErrorKind::LockTimeout,
                StoreError::Io(_) => ErrorKind::Io,
                _ => ErrorKind::Internal,
            },
            err.to_string(),
        );
        match err {
            StoreError::ConcurrentWrite { ours, theirs } => {
                envelope.ours = Some(*ours);
                envelope.theirs = Some(*theirs);
            }
            StoreError::ConsistencyFault { id } | StoreError::UnknownEntity { id } => {
                envelope.entity = Some(*id);
            }
            _ => {}
        }
        envelope
    }
}
