//! Bridge configuration.
//!
//! One JSON file read once at startup. Every field has a default so an
//! empty object `{}` is a valid configuration; the file itself must exist,
//! and a missing or malformed file is a startup error.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config file `{path}` is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub mqtt: BusConfig,
    /// Log filter used when `RUST_LOG` is unset and `--verbose` not given.
    #[serde(default)]
    pub log_level: Option<String>,
}

/// UDP side: where to listen and where the gateway multicast group lives.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_multicast_address")]
    pub multicast_address: String,
    #[serde(default = "default_multicast_port")]
    pub multicast_port: u16,
    /// Developer passphrase from the gateway app. Only needed for writes.
    #[serde(default)]
    pub passphrase: String,
    /// Publish every Nth heartbeat per gateway; 1 publishes all of them.
    #[serde(default = "default_heartbeat_publish_every")]
    pub heartbeat_publish_every: u32,
}

/// MQTT side: broker endpoint and topic namespace.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    #[serde(default = "default_bus_url")]
    pub url: String,
    #[serde(default = "default_bus_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Stable client id; a random one is generated when absent.
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            multicast_address: default_multicast_address(),
            multicast_port: default_multicast_port(),
            passphrase: String::new(),
            heartbeat_publish_every: default_heartbeat_publish_every(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: default_bus_url(),
            port: default_bus_port(),
            username: None,
            password: None,
            client_id: None,
            topic_prefix: default_topic_prefix(),
        }
    }
}

impl BridgeConfig {
    /// Load from a JSON file. Missing file and malformed JSON are both
    /// startup errors carrying the offending path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

fn default_listen_port() -> u16 {
    9898
}
fn default_multicast_address() -> String {
    "224.0.0.50".to_string()
}
fn default_multicast_port() -> u16 {
    4321
}
fn default_heartbeat_publish_every() -> u32 {
    1
}
fn default_bus_url() -> String {
    "mqtt://127.0.0.1".to_string()
}
fn default_bus_port() -> u16 {
    1883
}
fn default_topic_prefix() -> String {
    "xiaomi".to_string()
}
