//! Commands arriving from the bus.
//!
//! Each `<prefix>/to/...` topic maps to one variant, so the protocol engine
//! dispatches on a closed type instead of topic strings.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A command received on the bus, addressed to a device by sid.
#[derive(Debug, Clone, PartialEq)]
pub enum BusCommand {
    /// Request the current state of a device (`<prefix>/to/read`).
    Read { sid: String },
    /// Ask a gateway to enumerate its devices (`<prefix>/to/get_id_list`).
    Enumerate { sid: String },
    /// Write a control payload to a device (`<prefix>/to/write`).
    Write(WriteEnvelope),
}

/// Payload of a bus `write` command, forwarded to the device as-is after
/// key derivation and color packing.
///
/// Fields this bridge does not interpret (`short_id`, vendor extensions)
/// are captured by `extra` and serialized back out unchanged. The `cmd`
/// field is normalized to `write` when the publisher omitted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteEnvelope {
    #[serde(default = "default_write_cmd")]
    pub cmd: String,

    pub sid: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default)]
    pub data: Map<String, Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_write_cmd() -> String {
    "write".to_string()
}

impl WriteEnvelope {
    /// Whether the target is a gateway, which needs an authenticated payload.
    pub fn targets_gateway(&self) -> bool {
        self.model.as_deref() == Some("gateway")
    }
}
