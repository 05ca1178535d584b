//! UDP wire messages spoken by the gateway hardware.
//!
//! One JSON object per datagram, dispatched on the `cmd` field. Replies
//! nest a second JSON document inside the `data` field as a string, so
//! decoding happens in two stages: [`decode`] for the datagram itself and
//! [`parse_data`] for the inner document.
//!
//! Decoding distinguishes a datagram that is not JSON at all
//! ([`WireError::Malformed`]) from a well-formed object with a `cmd` this
//! bridge does not handle ([`WireError::UnknownCommand`]). The latter
//! includes our own multicast `whois` looped back by the kernel.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use thiserror::Error;

/// Decode failures for inbound datagrams.
#[derive(Debug, Error)]
pub enum WireError {
    /// The datagram (or its nested `data` document) is not valid JSON, or
    /// its fields do not match the command's shape.
    #[error("malformed datagram: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Valid JSON, but a `cmd` outside the inbound set.
    #[error("unsupported command `{0}`")]
    UnknownCommand(String),
}

/// Inbound datagrams, tagged by `cmd`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum GatewayMessage {
    Iam(IamReply),
    GetIdListAck(IdListReply),
    Report(DeviceReport),
    ReadAck(DeviceReport),
    WriteAck(DeviceReport),
    Heartbeat(HeartbeatReport),
}

/// Discovery reply: a gateway announcing its unicast endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct IamReply {
    pub sid: String,
    pub ip: String,
    /// Sent as a JSON number by some firmware revisions and as a numeric
    /// string by others; both are accepted.
    #[serde(deserialize_with = "de_port")]
    pub port: u16,
}

/// Reply to `get_id_list`: the gateway's attached device ids.
#[derive(Debug, Clone, Deserialize)]
pub struct IdListReply {
    pub sid: String,
    pub data: String,
}

impl IdListReply {
    /// Parse the nested sid array.
    pub fn device_ids(&self) -> Result<Vec<String>, WireError> {
        Ok(serde_json::from_str(&self.data)?)
    }
}

/// A `report`, `read_ack` or `write_ack` from a device.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceReport {
    pub model: String,
    pub sid: String,
    #[serde(default)]
    pub short_id: Option<Value>,
    pub data: String,
}

/// Periodic heartbeat; gateways include their rolling session token.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatReport {
    pub model: String,
    pub sid: String,
    #[serde(default)]
    pub short_id: Option<Value>,
    #[serde(default)]
    pub token: Option<String>,
    pub data: String,
}

/// The `cmd` values this bridge handles on the inbound path.
const INBOUND_COMMANDS: &[&str] = &[
    "iam",
    "get_id_list_ack",
    "report",
    "read_ack",
    "write_ack",
    "heartbeat",
];

/// Decode one inbound datagram.
pub fn decode(payload: &[u8]) -> Result<GatewayMessage, WireError> {
    let value: Value = serde_json::from_slice(payload)?;
    let cmd = value
        .get("cmd")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if !INBOUND_COMMANDS.contains(&cmd.as_str()) {
        return Err(WireError::UnknownCommand(cmd));
    }
    Ok(serde_json::from_value(value)?)
}

/// Parse the JSON document nested inside a reply's `data` field.
pub fn parse_data(data: &str) -> Result<Value, WireError> {
    Ok(serde_json::from_str(data)?)
}

/// `whois` discovery request, sent to the multicast group.
pub fn whois() -> String {
    json!({"cmd": "whois"}).to_string()
}

/// `get_id_list` enumeration request, sent unicast to a gateway.
pub fn get_id_list() -> String {
    json!({"cmd": "get_id_list"}).to_string()
}

/// `read` state request for a single device.
pub fn read(sid: &str) -> String {
    json!({"cmd": "read", "sid": sid}).to_string()
}

fn de_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    struct PortVisitor;

    impl Visitor<'_> for PortVisitor {
        type Value = u16;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a port number or numeric string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u16, E> {
            u16::try_from(v).map_err(|_| E::custom(format!("port {v} out of range")))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u16, E> {
            u16::try_from(v).map_err(|_| E::custom(format!("port {v} out of range")))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u16, E> {
            v.trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid port `{v}`")))
        }
    }

    deserializer.deserialize_any(PortVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_iam_with_numeric_port() {
        let msg = decode(br#"{"cmd":"iam","sid":"gw1","ip":"10.0.0.5","port":9898}"#).unwrap();
        match msg {
            GatewayMessage::Iam(iam) => {
                assert_eq!(iam.sid, "gw1");
                assert_eq!(iam.ip, "10.0.0.5");
                assert_eq!(iam.port, 9898);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_iam_with_string_port() {
        // Real gateways send the port as a string.
        let msg =
            decode(br#"{"cmd":"iam","sid":"gw1","ip":"10.0.0.5","port":"9898"}"#).unwrap();
        match msg {
            GatewayMessage::Iam(iam) => assert_eq!(iam.port, 9898),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_out_of_range_port() {
        let err =
            decode(br#"{"cmd":"iam","sid":"gw1","ip":"10.0.0.5","port":70000}"#).unwrap_err();
        assert!(matches!(err, WireError::Malformed(_)));
    }

    #[test]
    fn test_decode_report_and_inner_data() {
        let msg = decode(
            br#"{"cmd":"report","model":"sensor_ht","sid":"abc","short_id":1234,"data":"{\"temperature\":215}"}"#,
        )
        .unwrap();
        match msg {
            GatewayMessage::Report(report) => {
                assert_eq!(report.model, "sensor_ht");
                let data = parse_data(&report.data).unwrap();
                assert_eq!(data["temperature"], 215);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_heartbeat_token_optional() {
        // Sub-device heartbeats carry no token.
        let msg = decode(
            br#"{"cmd":"heartbeat","model":"magnet","sid":"abc","short_id":99,"data":"{}"}"#,
        )
        .unwrap();
        match msg {
            GatewayMessage::Heartbeat(hb) => assert!(hb.token.is_none()),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_unknown_command() {
        let err = decode(br#"{"cmd":"whois"}"#).unwrap_err();
        assert!(matches!(err, WireError::UnknownCommand(cmd) if cmd == "whois"));
    }

    #[test]
    fn test_decode_malformed_json() {
        let err = decode(b"{nonsense").unwrap_err();
        assert!(matches!(err, WireError::Malformed(_)));
    }

    #[test]
    fn test_id_list_parsing() {
        let reply = IdListReply {
            sid: "gw1".to_string(),
            data: r#"["sid1","sid2"]"#.to_string(),
        };
        assert_eq!(reply.device_ids().unwrap(), vec!["sid1", "sid2"]);

        let broken = IdListReply {
            sid: "gw1".to_string(),
            data: "not json".to_string(),
        };
        assert!(broken.device_ids().is_err());
    }

    #[test]
    fn test_outbound_requests() {
        assert_eq!(whois(), r#"{"cmd":"whois"}"#);
        assert_eq!(get_id_list(), r#"{"cmd":"get_id_list"}"#);
        let read_req: Value = serde_json::from_str(&read("abc")).unwrap();
        assert_eq!(read_req, json!({"cmd": "read", "sid": "abc"}));
    }
}
