//! Remote dispatch server for TrialDB.
//!
//! Binds one file-backed store to a TCP listener and executes wire
//! requests against it, one connection per thread, with an optional
//! encrypted transport upgrade at accept time. The client-side stub in
//! `trialdb-client` speaks the matching dialect.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod server;

pub use config::ServerConfig;
pub use dispatch::dispatch;
pub use error::{ServerError, ServerResult};
pub use server::{ServerHandle, StoreServer};
