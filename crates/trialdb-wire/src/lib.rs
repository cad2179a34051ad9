//! Wire format for remote TrialDB access.
//!
//! Defines the [`Request`]/[`Response`] message pair covering the full
//! store protocol, the typed [`ErrorEnvelope`] that carries store failures
//! back to the client, and the bincode [`Codec`]. Framing (and optional
//! encryption) lives one layer down, in `trialdb-transport`.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod message;

pub use codec::Codec;
pub use envelope::{ErrorEnvelope, ErrorKind};
pub use error::{WireError, WireResult};
pub use message::{Request, Response, PROTOCOL_VERSION};
