//! Encrypted byte transport for TrialDB.
//!
//! A drop-in framed channel over any `Read + Write` stream, with an
//! optional symmetric encryption layer negotiated at connection setup:
//! an ephemeral X25519 key agreement derives an AES-256-CBC session key
//! via HKDF-SHA256, and every subsequent payload travels as one
//! length-prefixed, PKCS#7-padded, encrypted frame.
//!
//! The threat model is a trusted network: the handshake authenticates
//! nobody, so the layer protects against passive eavesdroppers only.

pub mod channel;
pub mod encrypted;
pub mod error;
pub mod frame;

pub use channel::{Channel, SecurityLayer};
pub use encrypted::{EncryptedStream, CIPHER_BLOCK_SIZE};
pub use error::{TransportError, TransportResult};
pub use frame::{read_frame, write_frame, FRAME_HEADER_SIZE, MAX_FRAME_SIZE};
