//! Role Model
//!
//! The role a connection claims when it registers. Used for message routing
//! only; it is not an authorization decision.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Subscriber role group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Staff,
    Kitchen,
    Admin,
    /// Connected but not (or not validly) registered
    Guest,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Customer,
        Role::Staff,
        Role::Kitchen,
        Role::Admin,
        Role::Guest,
    ];

    /// Parse a client-supplied role. Unknown values fall back to [`Role::Guest`].
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "customer" => Role::Customer,
            "staff" => Role::Staff,
            "kitchen" => Role::Kitchen,
            "admin" => Role::Admin,
            _ => Role::Guest,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Staff => "staff",
            Role::Kitchen => "kitchen",
            Role::Admin => "admin",
            Role::Guest => "guest",
        }
    }

    /// Roles that receive the live order backlog on registration
    pub fn sees_backlog(&self) -> bool {
        matches!(self, Role::Staff | Role::Kitchen | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-role connection counts, broadcast as `connectionStatus`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCounts {
    pub staff: usize,
    pub kitchen: usize,
    pub customers: usize,
    pub admin: usize,
}
