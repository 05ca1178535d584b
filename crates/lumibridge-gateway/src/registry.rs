//! Device address registry.
//!
//! Maps every sid the bridge has heard about to the UDP endpoint it is
//! reachable through, and each gateway sid to its rolling session token.
//! Sub-devices are only reachable via their gateway, so enumeration writes
//! the gateway's own endpoint for each of them.
//!
//! Entries live for the process lifetime; the protocol has no notion of a
//! device leaving, and a stale endpoint is refreshed by the next discovery
//! round. The book is plain data with no interior locking: the protocol
//! engine task is its single owner.

use std::collections::HashMap;
use std::net::SocketAddr;

use thiserror::Error;

/// Resolution failures. The display strings are published verbatim in
/// status envelopes, so their wording is part of the bus contract.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("sid >{0}< unknown.")]
    UnknownDevice(String),

    #[error("no session token for gateway >{0}<.")]
    NoSession(String),
}

/// In-memory sid registry.
#[derive(Debug, Default)]
pub struct AddressBook {
    endpoints: HashMap<String, SocketAddr>,
    tokens: HashMap<String, String>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or refresh) where a sid is reachable. Last write wins.
    pub fn record_endpoint(&mut self, sid: impl Into<String>, addr: SocketAddr) {
        self.endpoints.insert(sid.into(), addr);
    }

    /// Resolve a sid to its endpoint.
    pub fn endpoint(&self, sid: &str) -> Result<SocketAddr, RegistryError> {
        self.endpoints
            .get(sid)
            .copied()
            .ok_or_else(|| RegistryError::UnknownDevice(sid.to_string()))
    }

    /// Record (or refresh) a gateway's session token.
    pub fn record_token(&mut self, sid: impl Into<String>, token: impl Into<String>) {
        self.tokens.insert(sid.into(), token.into());
    }

    /// Current session token for a gateway sid.
    pub fn token(&self, sid: &str) -> Result<&str, RegistryError> {
        self.tokens
            .get(sid)
            .map(String::as_str)
            .ok_or_else(|| RegistryError::NoSession(sid.to_string()))
    }

    /// Number of sids with a known endpoint.
    pub fn device_count(&self) -> usize {
        self.endpoints.len()
    }
}
