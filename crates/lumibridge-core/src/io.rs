//! Transport seams.
//!
//! The protocol engine talks to the network only through these two traits,
//! so tests can substitute recording fakes and the engine logic stays free
//! of sockets and broker clients.

use std::net::SocketAddr;

use async_trait::async_trait;
use thiserror::Error;

use crate::envelope::Envelope;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("udp send failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("bus publish failed: {0}")]
    Bus(String),
}

/// Outbound UDP datagrams. The multicast group is the implementation's
/// configuration, so callers only ever name resolved device endpoints.
#[async_trait]
pub trait DatagramSink: Send + Sync {
    /// Send to one resolved endpoint.
    async fn unicast(&self, payload: &[u8], target: SocketAddr) -> Result<(), TransportError>;

    /// Send to the discovery multicast group.
    async fn multicast(&self, payload: &[u8]) -> Result<(), TransportError>;
}

/// Outbound envelopes onto the message bus.
#[async_trait]
pub trait EnvelopePublisher: Send + Sync {
    async fn publish(&self, envelope: &Envelope) -> Result<(), TransportError>;
}
