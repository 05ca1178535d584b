//! Canonical bus envelope.
//!
//! Every device event crossing the bridge is normalized into one outbound
//! shape before publication. Field presence varies by `cmd`: device events
//! carry `sid`/`data`, gateway heartbeats add `token`, while status and
//! lifecycle envelopes only carry a human-readable `msg`. Absent fields are
//! omitted from the serialized JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The uniform message published on the `<prefix>/from` topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub cmd: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    /// Short (ZigBee network) id, forwarded verbatim. The hardware is not
    /// consistent about its JSON type, so no number/string assumption is made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_id: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl Envelope {
    /// Envelope for a device event (`report`, `read_ack`, `write_ack`, ...).
    pub fn device(
        cmd: impl Into<String>,
        model: impl Into<String>,
        sid: impl Into<String>,
        short_id: Option<Value>,
        data: Value,
    ) -> Self {
        Self {
            cmd: cmd.into(),
            model: Some(model.into()),
            sid: Some(sid.into()),
            short_id,
            token: None,
            data: Some(data),
            msg: None,
        }
    }

    /// Envelope for a gateway heartbeat, carrying the current session token.
    pub fn heartbeat(
        model: impl Into<String>,
        sid: impl Into<String>,
        short_id: Option<Value>,
        token: Option<String>,
        data: Value,
    ) -> Self {
        Self {
            cmd: "heartbeat".to_string(),
            model: Some(model.into()),
            sid: Some(sid.into()),
            short_id,
            token,
            data: Some(data),
            msg: None,
        }
    }

    /// Envelope answering a device enumeration: the parsed sid array.
    pub fn id_list(sid: impl Into<String>, ids: Vec<String>) -> Self {
        Self {
            cmd: "get_id_list_ack".to_string(),
            model: None,
            sid: Some(sid.into()),
            short_id: None,
            token: None,
            data: Some(Value::Array(ids.into_iter().map(Value::String).collect())),
            msg: None,
        }
    }

    /// Error/status envelope for a command that could not be carried out.
    pub fn status(msg: impl Into<String>) -> Self {
        Self {
            cmd: "status".to_string(),
            model: None,
            sid: None,
            short_id: None,
            token: None,
            data: None,
            msg: Some(msg.into()),
        }
    }

    /// Lifecycle envelope announced on startup and shutdown.
    pub fn lifecycle(msg: impl Into<String>) -> Self {
        Self {
            cmd: "xm".to_string(),
            model: None,
            sid: None,
            short_id: None,
            token: None,
            data: None,
            msg: Some(msg.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_device_envelope_shape() {
        let env = Envelope::device(
            "report",
            "magnet",
            "158d0001a2b3c4",
            Some(json!(4343)),
            json!({"status": "open"}),
        );
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({
                "cmd": "report",
                "model": "magnet",
                "sid": "158d0001a2b3c4",
                "short_id": 4343,
                "data": {"status": "open"}
            })
        );
    }

    #[test]
    fn test_status_envelope_omits_device_fields() {
        let env = Envelope::status("sid >deadbeef< unknown.");
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({"cmd": "status", "msg": "sid >deadbeef< unknown."})
        );
    }

    #[test]
    fn test_lifecycle_envelope() {
        let env = Envelope::lifecycle("lumibridge started.");
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({"cmd": "xm", "msg": "lumibridge started."})
        );
    }

    #[test]
    fn test_id_list_envelope() {
        let env = Envelope::id_list("gw1", vec!["a".into(), "b".into()]);
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({"cmd": "get_id_list_ack", "sid": "gw1", "data": ["a", "b"]})
        );
    }

    #[test]
    fn test_heartbeat_without_token() {
        // Sub-devices heartbeat too, just without a session token.
        let env = Envelope::heartbeat("magnet", "abc", None, None, json!({}));
        let value = serde_json::to_value(&env).unwrap();
        assert!(value.get("token").is_none());
        assert_eq!(value["cmd"], "heartbeat");
    }
}
