//! Client side of remote TrialDB access.
//!
//! [`RemoteClient`] implements the same [`Protocol`] trait as the
//! in-process file store, over a plain or encrypted TCP channel; the
//! [`open`] selector resolves a `file://` or `socket://` URI to whichever
//! backend it names. Code written against `Box<dyn Protocol>` never
//! learns which one it got.
//!
//! [`Protocol`]: trialdb_store::Protocol

pub mod client;
pub mod uri;

pub use client::RemoteClient;
pub use uri::{open, open_with, parse_uri, Backend};
