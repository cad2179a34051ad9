use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Hash with a domain tag so different entity kinds never collide on id
/// even when their input bytes coincide.
fn domain_hash(domain: &str, parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain.as_bytes());
    hasher.update(b":");
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

fn decode_hex32(s: &str) -> Result<[u8; 32], TypeError> {
    let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(TypeError::InvalidLength {
            expected: 32,
            actual: bytes.len(),
        });
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

/// Identifier shared by every entity kind in the store's object map.
///
/// Ids are BLAKE3 hashes with per-kind domain separation: a project named
/// `"x"` and a group named `"x"` get different ids. Trial ids are derived
/// from the (fingerprint, revision) pair, so bumping a revision re-derives
/// the id automatically.
///
/// Serializes as a hex string in human-readable formats (so it can key JSON
/// maps) and as raw bytes otherwise.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId([u8; 32]);

impl EntityId {
    const PROJECT_DOMAIN: &'static str = "trialdb-project-v1";
    const GROUP_DOMAIN: &'static str = "trialdb-group-v1";
    const TRIAL_DOMAIN: &'static str = "trialdb-trial-v1";

    /// Id of the project with the given name.
    pub fn for_project(name: &str) -> Self {
        Self(domain_hash(Self::PROJECT_DOMAIN, &[name.as_bytes()]))
    }

    /// Id of the trial group with the given name.
    pub fn for_group(name: &str) -> Self {
        Self(domain_hash(Self::GROUP_DOMAIN, &[name.as_bytes()]))
    }

    /// Id of the trial with the given fingerprint and revision.
    pub fn for_trial(fingerprint: &Fingerprint, revision: u32) -> Self {
        Self(domain_hash(
            Self::TRIAL_DOMAIN,
            &[fingerprint.as_bytes(), &revision.to_le_bytes()],
        ))
    }

    /// Wrap a pre-computed hash.
    pub const fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters) for log lines.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        decode_hex32(s).map(Self)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.short_hex())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_hex(&s).map_err(D::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Self)
        }
    }
}

/// Deterministic hash of a trial's parameter set.
///
/// The fingerprint is the trial's primary identity: two trials with the
/// same parameter mapping share a fingerprint and are told apart by their
/// revision counter. Parameters are hashed through their canonical JSON
/// encoding (`BTreeMap` gives a stable key order), so structurally equal
/// mappings always fingerprint identically.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    const DOMAIN: &'static str = "trialdb-params-v1";

    /// Fingerprint of a parameter mapping.
    ///
    /// The encoding cannot fail for a string-keyed map, so this is
    /// infallible.
    pub fn of_params(params: &crate::trial::Params) -> Self {
        let encoded = serde_json::to_vec(params).unwrap_or_default();
        Self(domain_hash(Self::DOMAIN, &[&encoded]))
    }

    pub const fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        decode_hex32(s).map(Self)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short_hex())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_hex(&s).map_err(D::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Self)
        }
    }
}
