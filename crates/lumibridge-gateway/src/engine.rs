//! Protocol state machine.
//!
//! One engine instance owns the [`AddressBook`] and handles every inbound
//! datagram and bus command to completion before the next, so no registry
//! access ever races. All I/O goes through the [`DatagramSink`] and
//! [`EnvelopePublisher`] seams; failures there are logged and abandoned,
//! never propagated. A lost datagram does not take the bridge down.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use lumibridge_core::io::{DatagramSink, EnvelopePublisher};
use lumibridge_core::wire::{
    self, DeviceReport, GatewayMessage, HeartbeatReport, IamReply, IdListReply,
};
use lumibridge_core::{normalize, BusCommand, Envelope, GatewayConfig, WriteEnvelope};

use crate::cipher::{self, CipherError};
use crate::registry::AddressBook;

/// Discovery progress of one gateway. Purely informational: no handler is
/// gated on it, and a gateway re-announcing itself is simply re-handshaken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayPhase {
    /// Never heard from.
    #[default]
    Undiscovered,
    /// Announced itself; device enumeration requested.
    Discovering,
    /// Device list received; reads and writes can be routed.
    Active,
}

/// The bridge's protocol core, generic over its two transports.
pub struct ProtocolEngine<S, P> {
    book: AddressBook,
    phases: HashMap<String, GatewayPhase>,
    heartbeats_seen: HashMap<String, u32>,
    heartbeat_publish_every: u32,
    passphrase: String,
    sink: S,
    bus: P,
}

impl<S: DatagramSink, P: EnvelopePublisher> ProtocolEngine<S, P> {
    pub fn new(config: &GatewayConfig, sink: S, bus: P) -> Self {
        Self {
            book: AddressBook::new(),
            phases: HashMap::new(),
            heartbeats_seen: HashMap::new(),
            heartbeat_publish_every: config.heartbeat_publish_every.max(1),
            passphrase: config.passphrase.clone(),
            sink,
            bus,
        }
    }

    /// Current discovery phase for a gateway sid.
    pub fn phase(&self, sid: &str) -> GatewayPhase {
        self.phases.get(sid).copied().unwrap_or_default()
    }

    /// Ask every gateway on the local network to announce itself.
    pub async fn discover(&self) {
        debug!("multicasting whois");
        if let Err(err) = self.sink.multicast(wire::whois().as_bytes()).await {
            warn!("whois multicast failed: {}", err);
        }
    }

    /// Handle one inbound datagram. Undecodable traffic, including our own
    /// looped-back multicast, is logged and dropped without touching state.
    pub async fn handle_datagram(&mut self, payload: &[u8], source: SocketAddr) {
        let message = match wire::decode(payload) {
            Ok(message) => message,
            Err(err) => {
                warn!("dropping datagram from {}: {}", source, err);
                return;
            }
        };
        match message {
            GatewayMessage::Iam(reply) => self.on_iam(reply).await,
            GatewayMessage::GetIdListAck(reply) => self.on_id_list(reply, source).await,
            GatewayMessage::Report(report) => self.on_device_report("report", report).await,
            GatewayMessage::ReadAck(report) => self.on_device_report("read_ack", report).await,
            GatewayMessage::WriteAck(report) => self.on_write_ack(report).await,
            GatewayMessage::Heartbeat(heartbeat) => self.on_heartbeat(heartbeat).await,
        }
    }

    /// Handle one command from the bus.
    pub async fn handle_command(&mut self, command: BusCommand) {
        match command {
            BusCommand::Read { sid } => self.on_read(&sid).await,
            BusCommand::Enumerate { sid } => self.on_enumerate(&sid).await,
            BusCommand::Write(envelope) => self.on_write(envelope).await,
        }
    }

    async fn on_iam(&mut self, reply: IamReply) {
        let ip: IpAddr = match reply.ip.parse() {
            Ok(ip) => ip,
            Err(_) => {
                warn!(
                    "iam from {} carries unusable address `{}`",
                    reply.sid, reply.ip
                );
                return;
            }
        };
        let target = SocketAddr::new(ip, reply.port);
        info!("gateway {} announced itself at {}", reply.sid, target);
        self.book.record_endpoint(reply.sid.as_str(), target);
        self.set_phase(&reply.sid, GatewayPhase::Discovering);
        self.send(wire::get_id_list().as_bytes(), target).await;
    }

    async fn on_id_list(&mut self, reply: IdListReply, source: SocketAddr) {
        let ids = match reply.device_ids() {
            Ok(ids) => ids,
            Err(err) => {
                warn!("unusable device list from {}: {}", reply.sid, err);
                return;
            }
        };
        // Sub-devices have no socket of their own; they are addressed
        // through the gateway that just answered.
        self.book.record_endpoint(reply.sid.as_str(), source);
        for sid in &ids {
            self.book.record_endpoint(sid.as_str(), source);
        }
        self.set_phase(&reply.sid, GatewayPhase::Active);
        info!("gateway {} at {} serves {} devices", reply.sid, source, ids.len());
        self.publish(Envelope::id_list(reply.sid.as_str(), ids)).await;
    }

    async fn on_device_report(&mut self, cmd: &str, report: DeviceReport) {
        let data = match wire::parse_data(&report.data) {
            Ok(data) => data,
            Err(err) => {
                warn!("dropping {} from {}: {}", cmd, report.sid, err);
                return;
            }
        };
        let envelope = normalize(cmd, &report.model, &report.sid, report.short_id, data);
        self.publish(envelope).await;
    }

    async fn on_write_ack(&mut self, report: DeviceReport) {
        let data = match wire::parse_data(&report.data) {
            Ok(data) => data,
            Err(err) => {
                warn!("dropping write_ack from {}: {}", report.sid, err);
                return;
            }
        };
        let envelope =
            Envelope::device("write_ack", report.model, report.sid, report.short_id, data);
        self.publish(envelope).await;
    }

    async fn on_heartbeat(&mut self, heartbeat: HeartbeatReport) {
        // The session token is captured on every heartbeat, published or
        // not, so writes always authenticate with the freshest one.
        if heartbeat.model == "gateway" {
            if let Some(token) = &heartbeat.token {
                self.book.record_token(heartbeat.sid.as_str(), token.as_str());
            }
        }

        let seen = self
            .heartbeats_seen
            .entry(heartbeat.sid.clone())
            .or_insert(0);
        *seen = seen.wrapping_add(1);
        if *seen % self.heartbeat_publish_every != 0 {
            return;
        }

        let data = match wire::parse_data(&heartbeat.data) {
            Ok(data) => data,
            Err(err) => {
                warn!("dropping heartbeat from {}: {}", heartbeat.sid, err);
                return;
            }
        };
        let envelope = Envelope::heartbeat(
            heartbeat.model,
            heartbeat.sid,
            heartbeat.short_id,
            heartbeat.token,
            data,
        );
        self.publish(envelope).await;
    }

    async fn on_read(&mut self, sid: &str) {
        match self.book.endpoint(sid) {
            Ok(target) => self.send(wire::read(sid).as_bytes(), target).await,
            Err(err) => self.report_failure(err.to_string()).await,
        }
    }

    async fn on_enumerate(&mut self, sid: &str) {
        match self.book.endpoint(sid) {
            Ok(target) => self.send(wire::get_id_list().as_bytes(), target).await,
            Err(err) => self.report_failure(err.to_string()).await,
        }
    }

    async fn on_write(&mut self, mut envelope: WriteEnvelope) {
        let target = match self.book.endpoint(&envelope.sid) {
            Ok(target) => target,
            Err(err) => return self.report_failure(err.to_string()).await,
        };

        // Gateways demand proof of the developer passphrase; everything
        // else takes the payload as-is.
        if envelope.targets_gateway() {
            let token = match self.book.token(&envelope.sid) {
                Ok(token) => token.to_string(),
                Err(err) => return self.report_failure(err.to_string()).await,
            };
            let key = match cipher::derive_key(&token, &self.passphrase) {
                Ok(key) => key,
                Err(err) => return self.report_failure(err.to_string()).await,
            };
            envelope.data.insert("key".to_string(), Value::String(key));
            if let Err(err) = pack_rgb_in_place(&mut envelope.data) {
                return self.report_failure(err.to_string()).await;
            }
        }

        match serde_json::to_vec(&envelope) {
            Ok(payload) => self.send(&payload, target).await,
            Err(err) => warn!("cannot serialize write for {}: {}", envelope.sid, err),
        }
    }

    fn set_phase(&mut self, sid: &str, next: GatewayPhase) {
        if self.phase(sid) != next {
            debug!("gateway {} entered {:?} phase", sid, next);
            self.phases.insert(sid.to_string(), next);
        }
    }

    /// A command that cannot be carried out is answered on the bus, never
    /// fatal and never silently swallowed.
    async fn report_failure(&self, message: String) {
        warn!("{}", message);
        self.publish(Envelope::status(message)).await;
    }

    async fn send(&self, payload: &[u8], target: SocketAddr) {
        if let Err(err) = self.sink.unicast(payload, target).await {
            warn!("send to {} failed: {}", target, err);
        }
    }

    async fn publish(&self, envelope: Envelope) {
        if let Err(err) = self.bus.publish(&envelope).await {
            warn!("bus publish failed: {}", err);
        }
    }
}

/// Replace a string `rgb` field with its packed numeric form. A number is
/// passed through (already packed by the publisher); any other JSON type
/// is rejected before the datagram is built.
fn pack_rgb_in_place(data: &mut Map<String, Value>) -> Result<(), CipherError> {
    let packed = match data.get("rgb") {
        None | Some(Value::Number(_)) => return Ok(()),
        Some(Value::String(word)) => cipher::pack_color(word)?,
        Some(other) => return Err(CipherError::MalformedColorWord(other.to_string())),
    };
    data.insert("rgb".to_string(), Value::Number(packed.into()));
    Ok(())
}
