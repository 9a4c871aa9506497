//! Data models shared between the hub and its clients

pub mod role;

pub use role::{ConnectionCounts, Role};
