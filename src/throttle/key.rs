//! Caller identity extraction and ledger key derivation.

use std::net::{IpAddr, SocketAddr};

use sha2::{Digest, Sha256};

/// A one-way transform that obscures raw caller identifiers before they are
/// stored in the ledger.
///
/// Implementations must be deterministic: the same input always maps to the
/// same stored key.
pub trait KeyEncoder: Send + Sync {
    fn encode(&self, raw: &str) -> String;
}

/// Hex-encoded SHA-256 digest of the namespaced key.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256KeyEncoder;

impl KeyEncoder for Sha256KeyEncoder {
    fn encode(&self, raw: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(raw.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Stores keys verbatim. Handy when inspecting a ledger while debugging.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainKeyEncoder;

impl KeyEncoder for PlainKeyEncoder {
    fn encode(&self, raw: &str) -> String {
        raw.to_string()
    }
}

/// Something that can name the caller of a request.
pub trait CallerIdentity {
    fn caller_identity(&self) -> String;
}

impl CallerIdentity for IpAddr {
    fn caller_identity(&self) -> String {
        self.to_string()
    }
}

/// Only the IP is used; ephemeral client ports would defeat throttling.
impl CallerIdentity for SocketAddr {
    fn caller_identity(&self) -> String {
        self.ip().to_string()
    }
}

impl CallerIdentity for str {
    fn caller_identity(&self) -> String {
        self.to_string()
    }
}

impl CallerIdentity for String {
    fn caller_identity(&self) -> String {
        self.clone()
    }
}

/// Derive the stored key for `raw_key` under `namespace`.
pub fn ledger_key(encoder: &dyn KeyEncoder, namespace: &str, raw_key: &str) -> String {
    let mut composed = String::with_capacity(namespace.len() + raw_key.len());
    composed.push_str(namespace);
    composed.push_str(raw_key);
    encoder.encode(&composed)
}
