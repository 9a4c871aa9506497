//! Order domain: identifiers, line items, status machine and snapshots

pub mod snapshot;
pub mod types;

pub use snapshot::{OrderSnapshot, OrderStatus};
pub use types::{DEFAULT_PAYMENT_METHOD, OrderId, OrderItem, compute_total};
