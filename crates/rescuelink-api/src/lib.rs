// rescuelink-api: Async transport for the RescueLink backend (REST snapshots + WebSocket push)

pub mod error;
pub mod rest;
pub mod transport;
pub mod websocket;
pub mod wire;

pub use error::Error;
pub use rest::RestClient;
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{PushClient, PushFrame, PushSession};
pub use wire::{InboundFrame, RawRecord};
