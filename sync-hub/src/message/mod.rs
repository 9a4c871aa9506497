//! Message bus: transports and connection handling
//!
//! Wire types live in `shared::message`; this module moves them between
//! sockets (or in-process channels) and the order hub.

pub mod bus;
pub mod connection;
pub mod tcp_server;
pub mod transport;

pub use bus::{MessageBus, TransportConfig};
pub use connection::run_connection;
pub use transport::{MemoryTransport, TcpTransport, Transport};

// Re-export the wire types for convenience
pub use shared::message::{BusMessage, EventType};
