//! Bus side of the bridge.
//!
//! Wraps a rumqttc client into the bridge's two bus roles: publishing
//! canonical envelopes on `<prefix>/from` and turning `<prefix>/to/...`
//! messages into typed [`lumibridge_core::BusCommand`]s for the engine.

pub mod client;
pub mod topics;

pub use client::{BusClient, BusError};
pub use topics::TopicLayout;
