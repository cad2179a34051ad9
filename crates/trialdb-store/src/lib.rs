//! Lock-guarded, optimistically-versioned object store for TrialDB.
//!
//! The store keeps one JSON snapshot file per logical store and makes it
//! safe for several OS processes to share: every operation runs under a
//! cross-process advisory lock, reloads the snapshot (eager mode),
//! re-resolves the caller's entity arguments against the fresh state, and
//! persists before releasing. Atomic operations additionally compare
//! version stamps and abort on concurrent modification instead of
//! clobbering it.
//!
//! # Key Types
//!
//! - [`Protocol`] — the transactional operation set (also implemented by
//!   the remote client in `trialdb-client`)
//! - [`FileProtocol`] — the file-backed implementation
//! - [`Snapshot`] — the in-memory object map and derived indices
//! - [`StoreOptions`] — strict/eager/lock-timeout switches

pub mod error;
pub mod file;
pub mod lock;
pub mod persist;
pub mod protocol;
pub mod snapshot;

pub use error::{StoreError, StoreResult};
pub use file::{FileProtocol, StoreOptions, RUNTIME_CHRONO};
pub use protocol::Protocol;
pub use snapshot::Snapshot;
