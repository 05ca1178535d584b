//! Broker client.
//!
//! One rumqttc `AsyncClient` plus a spawned event-loop task. The task
//! re-subscribes and announces the bridge on every connection
//! acknowledgement, so a broker restart heals without any action from the
//! engine. Inbound command payloads that cannot be parsed are answered
//! with a status envelope; only the engine channel closing is terminal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, Publish, QoS};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use lumibridge_core::io::{EnvelopePublisher, TransportError};
use lumibridge_core::{BusCommand, BusConfig, Envelope};

use crate::topics::TopicLayout;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("cannot encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Handle to the broker connection. Cheap to clone; all clones share the
/// underlying client and event loop.
#[derive(Clone)]
pub struct BusClient {
    client: AsyncClient,
    topics: TopicLayout,
    running: Arc<AtomicBool>,
}

impl BusClient {
    /// Create the client and spawn its event-loop task. The connection
    /// itself is established lazily by the task; outbound publishes are
    /// queued until then.
    pub fn connect(config: &BusConfig) -> (Self, mpsc::Receiver<BusCommand>) {
        let (host, port) = broker_endpoint(&config.url, config.port);
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("lumibridge-{}", Uuid::new_v4()));
        info!("mqtt client {} for {}:{}", client_id, host, port);

        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(60));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user.as_str(), pass.as_str());
        }

        let (client, eventloop) = AsyncClient::new(options, 10);
        let (command_tx, command_rx) = mpsc::channel(16);
        let topics = TopicLayout::new(&config.topic_prefix);
        let running = Arc::new(AtomicBool::new(true));

        tokio::spawn(event_loop_task(
            eventloop,
            client.clone(),
            topics.clone(),
            command_tx,
            running.clone(),
        ));

        (
            Self {
                client,
                topics,
                running,
            },
            command_rx,
        )
    }

    /// Announce the shutdown and close the connection.
    pub async fn shutdown(self) -> Result<(), BusError> {
        let stopped = serde_json::to_vec(&Envelope::lifecycle("lumibridge stopped."))?;
        self.client
            .publish(self.topics.from_topic(), QoS::AtMostOnce, false, stopped)
            .await?;
        self.running.store(false, Ordering::Relaxed);
        self.client.disconnect().await?;
        Ok(())
    }
}

#[async_trait]
impl EnvelopePublisher for BusClient {
    async fn publish(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let payload =
            serde_json::to_vec(envelope).map_err(|err| TransportError::Bus(err.to_string()))?;
        self.client
            .publish(self.topics.from_topic(), QoS::AtMostOnce, false, payload)
            .await
            .map_err(|err| TransportError::Bus(err.to_string()))?;
        Ok(())
    }
}

async fn event_loop_task(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topics: TopicLayout,
    commands: mpsc::Sender<BusCommand>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Relaxed) {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                let filter = topics.command_filter();
                info!("broker connected, subscribing {}", filter);
                if let Err(err) = client.subscribe(filter.as_str(), QoS::AtLeastOnce).await {
                    warn!("subscribe to {} failed: {}", filter, err);
                }
                announce(&client, &topics, Envelope::lifecycle("lumibridge started.")).await;
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                handle_publish(&client, &topics, &commands, publish).await;
            }
            Ok(_) => {}
            Err(err) => {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                warn!("mqtt connection error: {}", err);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
    info!("mqtt event loop stopped");
}

async fn handle_publish(
    client: &AsyncClient,
    topics: &TopicLayout,
    commands: &mpsc::Sender<BusCommand>,
    publish: Publish,
) {
    let topic = publish.topic.as_str();
    if publish.payload.is_empty() {
        warn!("empty payload on {}", topic);
        return;
    }
    let suffix = match topics.command_suffix(topic) {
        Some(suffix) => suffix,
        None => {
            warn!("unexpected topic {}", topic);
            return;
        }
    };
    match parse_bus_command(suffix, &publish.payload) {
        Ok(Some(command)) => {
            if commands.send(command).await.is_err() {
                warn!("engine gone, dropping command from {}", topic);
            }
        }
        Ok(None) => warn!("unknown command topic {}", topic),
        Err(err) => {
            warn!("bad command on {}: {}", topic, err);
            let status = Envelope::status(format!("cannot parse command on {}: {}", topic, err));
            announce(client, topics, status).await;
        }
    }
}

/// Publish one envelope, logging instead of propagating failure.
async fn announce(client: &AsyncClient, topics: &TopicLayout, envelope: Envelope) {
    match serde_json::to_vec(&envelope) {
        Ok(payload) => {
            if let Err(err) = client
                .publish(topics.from_topic(), QoS::AtMostOnce, false, payload)
                .await
            {
                warn!("publish to {} failed: {}", topics.from_topic(), err);
            }
        }
        Err(err) => warn!("cannot encode envelope: {}", err),
    }
}

#[derive(Deserialize)]
struct SidOnly {
    sid: String,
}

/// Map a command topic suffix plus payload to a [`BusCommand`].
/// `Ok(None)` means the suffix is not a command this bridge knows.
fn parse_bus_command(suffix: &str, payload: &[u8]) -> Result<Option<BusCommand>, serde_json::Error> {
    match suffix {
        "read" => {
            let target: SidOnly = serde_json::from_slice(payload)?;
            Ok(Some(BusCommand::Read { sid: target.sid }))
        }
        "get_id_list" => {
            let target: SidOnly = serde_json::from_slice(payload)?;
            Ok(Some(BusCommand::Enumerate { sid: target.sid }))
        }
        "write" => Ok(Some(BusCommand::Write(serde_json::from_slice(payload)?))),
        _ => Ok(None),
    }
}

/// Split `mqtt://host[:port]` into host and port, the config port being the
/// fallback. The scheme prefix is optional.
fn broker_endpoint(url: &str, default_port: u16) -> (String, u16) {
    let stripped = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url)
        .trim_end_matches('/');
    match stripped.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (stripped.to_string(), default_port),
        },
        None => (stripped.to_string(), default_port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_read_command() {
        let command = parse_bus_command("read", br#"{"sid":"abc"}"#).unwrap();
        assert_eq!(
            command,
            Some(BusCommand::Read {
                sid: "abc".to_string()
            })
        );
    }

    #[test]
    fn test_parse_enumerate_command() {
        let command = parse_bus_command("get_id_list", br#"{"sid":"gw1"}"#).unwrap();
        assert_eq!(
            command,
            Some(BusCommand::Enumerate {
                sid: "gw1".to_string()
            })
        );
    }

    #[test]
    fn test_parse_write_command_defaults_cmd() {
        let command = parse_bus_command(
            "write",
            br#"{"model":"gateway","sid":"gw1","data":{"rgb":"ff0a140a"}}"#,
        )
        .unwrap();
        match command {
            Some(BusCommand::Write(envelope)) => {
                assert_eq!(envelope.cmd, "write");
                assert_eq!(envelope.sid, "gw1");
                assert_eq!(envelope.data["rgb"], json!("ff0a140a"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_missing_sid() {
        let err = parse_bus_command("read", br#"{"model":"plug"}"#).unwrap_err();
        assert!(err.to_string().contains("sid"));
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        assert!(parse_bus_command("write", b"{oops").is_err());
    }

    #[test]
    fn test_unknown_suffix_is_not_a_command() {
        assert!(parse_bus_command("reboot", br#"{"sid":"abc"}"#)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_broker_endpoint_parsing() {
        assert_eq!(
            broker_endpoint("mqtt://127.0.0.1", 1883),
            ("127.0.0.1".to_string(), 1883)
        );
        assert_eq!(
            broker_endpoint("mqtt://broker.local:1884", 1883),
            ("broker.local".to_string(), 1884)
        );
        assert_eq!(
            broker_endpoint("tcp://broker.local/", 1883),
            ("broker.local".to_string(), 1883)
        );
        assert_eq!(
            broker_endpoint("broker.local", 1883),
            ("broker.local".to_string(), 1883)
        );
    }

    // Needs a broker on localhost:1883 (mosquitto -v).
    #[tokio::test]
    #[ignore]
    async fn test_lifecycle_announcement_roundtrip() {
        let config = BusConfig::default();
        let (bus, _commands) = BusClient::connect(&config);
        tokio::time::sleep(Duration::from_millis(500)).await;
        bus.shutdown().await.unwrap();
    }
}
