//! Gateway-side protocol implementation.
//!
//! Everything that speaks the Lumi local-gateway UDP protocol lives here:
//! the device address registry, the AES write-key derivation, the protocol
//! state machine, the multicast socket, and the service loop tying them to
//! the bus. The engine itself performs no I/O; it only sees the transport
//! traits, and the protocol tests drive it with in-memory fakes.

pub mod cipher;
pub mod engine;
pub mod registry;
pub mod service;
pub mod transport;

pub use cipher::{derive_key, pack_color, CipherError};
pub use engine::{GatewayPhase, ProtocolEngine};
pub use registry::{AddressBook, RegistryError};
pub use service::GatewayService;
pub use transport::UdpLink;
