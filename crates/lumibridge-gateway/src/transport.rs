//! Multicast UDP socket.
//!
//! One socket serves both directions: it joins the discovery multicast
//! group for inbound traffic and sends unicast requests from the same local
//! port, which is what the gateway firmware expects replies to come back
//! to. Binding or joining failure is fatal; everything after that is a
//! logged, non-fatal event.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{info, trace, warn};

use lumibridge_core::io::{DatagramSink, TransportError};
use lumibridge_core::GatewayConfig;

// Fits any UDP datagram. A shorter buffer would truncate, and the cut-off
// JSON would then be dropped as malformed.
const RECV_BUFFER_SIZE: usize = 65536;

/// The bridge's UDP endpoint.
#[derive(Debug)]
pub struct UdpLink {
    socket: Arc<UdpSocket>,
    multicast_target: SocketAddr,
}

impl UdpLink {
    /// Bind the listen port and join the discovery group.
    pub async fn bind(config: &GatewayConfig) -> std::io::Result<Self> {
        let group: Ipv4Addr = config.multicast_address.parse().map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid multicast address `{}`", config.multicast_address),
            )
        })?;
        let socket = UdpSocket::bind(("0.0.0.0", config.listen_port)).await?;
        socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;
        info!(
            "listening on udp port {}, discovery group {}:{}",
            config.listen_port, group, config.multicast_port
        );
        Ok(Self {
            socket: Arc::new(socket),
            multicast_target: SocketAddr::new(IpAddr::V4(group), config.multicast_port),
        })
    }

    /// Spawn the reader task. Every received datagram lands on the returned
    /// channel; the task ends when the receiver is dropped.
    pub fn incoming(&self) -> mpsc::Receiver<(Vec<u8>, SocketAddr)> {
        let socket = Arc::clone(&self.socket);
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut buf = vec![0u8; RECV_BUFFER_SIZE];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, source)) => {
                        if tx.send((buf[..len].to_vec(), source)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!("udp receive failed: {}", err);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });
        rx
    }
}

#[async_trait]
impl DatagramSink for UdpLink {
    async fn unicast(&self, payload: &[u8], target: SocketAddr) -> Result<(), TransportError> {
        trace!("send to {}: {}", target, String::from_utf8_lossy(payload));
        self.socket.send_to(payload, target).await?;
        Ok(())
    }

    async fn multicast(&self, payload: &[u8]) -> Result<(), TransportError> {
        trace!(
            "multicast to {}: {}",
            self.multicast_target,
            String::from_utf8_lossy(payload)
        );
        self.socket.send_to(payload, self.multicast_target).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_rejects_bad_group() {
        let config = GatewayConfig {
            multicast_address: "not-an-address".to_string(),
            listen_port: 0,
            ..GatewayConfig::default()
        };
        let err = UdpLink::bind(&config).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }

    // Needs a network stack that permits multicast membership.
    #[tokio::test]
    #[ignore]
    async fn test_loopback_roundtrip() {
        let config = GatewayConfig {
            listen_port: 0,
            ..GatewayConfig::default()
        };
        let link = UdpLink::bind(&config).await.unwrap();
        let port = link.socket.local_addr().unwrap().port();
        let mut incoming = link.incoming();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender
            .send_to(br#"{"cmd":"whois"}"#, ("127.0.0.1", port))
            .await
            .unwrap();

        let (payload, source) = incoming.recv().await.unwrap();
        assert_eq!(payload, br#"{"cmd":"whois"}"#);
        assert_eq!(source.port(), sender.local_addr().unwrap().port());

        // Larger than any real gateway datagram; must arrive untruncated.
        let big = vec![b'x'; 8192];
        sender
            .send_to(&big, ("127.0.0.1", port))
            .await
            .unwrap();
        let (payload, _) = incoming.recv().await.unwrap();
        assert_eq!(payload, big);
    }
}
