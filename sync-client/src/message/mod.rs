//! Message client and transports

pub mod client;
pub mod transport;

pub use client::MessageClient;
pub use shared::message::{BusMessage, EventType};
pub use transport::{MemoryTransport, TcpTransport, Transport};
