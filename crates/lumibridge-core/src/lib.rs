//! Core types for LumiBridge.
//!
//! This crate holds everything both sides of the bridge agree on: the
//! canonical envelope published on the bus, the UDP wire messages the
//! gateway speaks, the bus command set, the report normalizer, and the
//! configuration model. It performs no I/O; the transport seams are
//! expressed as traits in [`io`] and implemented by the gateway and mqtt
//! crates.

pub mod command;
pub mod config;
pub mod envelope;
pub mod io;
pub mod report;
pub mod wire;

pub use command::{BusCommand, WriteEnvelope};
pub use config::{BridgeConfig, BusConfig, ConfigError, GatewayConfig};
pub use envelope::Envelope;
pub use io::{DatagramSink, EnvelopePublisher, TransportError};
pub use report::normalize;
pub use wire::{GatewayMessage, WireError};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
