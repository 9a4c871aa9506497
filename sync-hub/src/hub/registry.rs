//! Connection registry
//!
//! Tracks every live connection, the role group it belongs to, and the
//! optional per-order interest sets used to narrow status fan-out.
//!
//! A connection is a member of exactly one role group at a time: it joins
//! `guest` when attached and moves on every `register`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use shared::models::{ConnectionCounts, Role};
use shared::order::OrderId;
use uuid::Uuid;

use super::{ConnectionId, Outbound};

/// Audience of status-update broadcasts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FanoutPolicy {
    /// Every live connection
    #[default]
    All,
    /// Connections that created or asked about the order, plus staff,
    /// kitchen and admin
    Interested,
}

impl FromStr for FanoutPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(FanoutPolicy::All),
            "interested" => Ok(FanoutPolicy::Interested),
            other => Err(format!("unknown fan-out policy: {other}")),
        }
    }
}

impl fmt::Display for FanoutPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanoutPolicy::All => write!(f, "all"),
            FanoutPolicy::Interested => write!(f, "interested"),
        }
    }
}

/// One live connection
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub session: Uuid,
    pub role: Role,
    pub user_id: Option<String>,
    pub peer: Option<String>,
    /// Unix millis
    pub connected_at: i64,
    pub outbound: Outbound,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    groups: HashMap<Role, HashSet<ConnectionId>>,
    interest: HashMap<OrderId, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to the `guest` group.
    ///
    /// Returns the connection it replaced when the id was already live
    /// (a client reconnecting with the same `clientId`).
    pub fn attach(
        &mut self,
        id: ConnectionId,
        session: Uuid,
        outbound: Outbound,
        peer: Option<String>,
    ) -> Option<Connection> {
        let replaced = self.detach(&id);
        self.groups.entry(Role::Guest).or_default().insert(id.clone());
        self.connections.insert(
            id.clone(),
            Connection {
                id,
                session,
                role: Role::Guest,
                user_id: None,
                peer,
                connected_at: shared::util::now_millis(),
                outbound,
            },
        );
        replaced
    }

    /// Move a connection into `role`'s group.
    ///
    /// Idempotent. Returns the previous role, or `None` for an unknown id.
    pub fn register(
        &mut self,
        id: &str,
        role: Role,
        user_id: Option<String>,
    ) -> Option<Role> {
        let conn = self.connections.get_mut(id)?;
        let previous = conn.role;
        if previous != role {
            if let Some(group) = self.groups.get_mut(&previous) {
                group.remove(id);
            }
            self.groups.entry(role).or_default().insert(id.to_string());
            conn.role = role;
        }
        if user_id.is_some() {
            conn.user_id = user_id;
        }
        Some(previous)
    }

    /// Remove a connection if `session` still owns it.
    ///
    /// A stale disconnect from a replaced session is ignored.
    pub fn unregister(&mut self, id: &str, session: Uuid) -> Option<Connection> {
        if self.connections.get(id)?.session != session {
            return None;
        }
        self.detach(id)
    }

    fn detach(&mut self, id: &str) -> Option<Connection> {
        let conn = self.connections.remove(id)?;
        if let Some(group) = self.groups.get_mut(&conn.role) {
            group.remove(id);
        }
        for members in self.interest.values_mut() {
            members.remove(id);
        }
        Some(conn)
    }

    pub fn get(&self, id: &str) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn members_of(&self, role: Role) -> HashSet<ConnectionId> {
        self.groups.get(&role).cloned().unwrap_or_default()
    }

    pub fn all_members(&self) -> Vec<ConnectionId> {
        self.connections.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Registered connections per role (guests are not counted)
    pub fn counts(&self) -> ConnectionCounts {
        let n = |role| self.groups.get(&role).map_or(0, HashSet::len);
        ConnectionCounts {
            staff: n(Role::Staff),
            kitchen: n(Role::Kitchen),
            customers: n(Role::Customer),
            admin: n(Role::Admin),
        }
    }

    pub fn add_interest(&mut self, order_id: OrderId, id: &str) {
        if self.connections.contains_key(id) {
            self.interest.entry(order_id).or_default().insert(id.to_string());
        }
    }

    pub fn drop_interest(&mut self, order_id: OrderId) {
        self.interest.remove(&order_id);
    }

    /// Connections that receive status updates for `order_id`
    pub fn audience(&self, order_id: OrderId, policy: FanoutPolicy) -> Vec<ConnectionId> {
        match policy {
            FanoutPolicy::All => self.all_members(),
            FanoutPolicy::Interested => {
                let mut ids: HashSet<ConnectionId> =
                    self.interest.get(&order_id).cloned().unwrap_or_default();
                for role in [Role::Staff, Role::Kitchen, Role::Admin] {
                    ids.extend(self.members_of(role));
                }
                ids.into_iter().collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn attach(registry: &mut ConnectionRegistry, id: &str) -> Uuid {
        let (tx, _rx) = mpsc::channel(1);
        let session = Uuid::new_v4();
        registry.attach(id.to_string(), session, tx, None);
        session
    }

    fn groups_containing(registry: &ConnectionRegistry, id: &str) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|r| registry.members_of(*r).contains(id))
            .collect()
    }

    #[test]
    fn test_attach_joins_guest() {
        let mut registry = ConnectionRegistry::new();
        attach(&mut registry, "a");
        assert_eq!(groups_containing(&registry, "a"), vec![Role::Guest]);
        assert_eq!(registry.counts(), ConnectionCounts::default());
    }

    #[test]
    fn test_only_latest_role_holds_membership() {
        let mut registry = ConnectionRegistry::new();
        attach(&mut registry, "a");

        let sequence = [Role::Customer, Role::Kitchen, Role::Staff, Role::Kitchen, Role::Admin];
        for role in sequence {
            registry.register("a", role, None);
            assert_eq!(groups_containing(&registry, "a"), vec![role]);
        }
        assert_eq!(registry.counts().admin, 1);
        assert_eq!(registry.counts().kitchen, 0);
    }

    #[test]
    fn test_register_same_role_twice_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        attach(&mut registry, "a");

        assert_eq!(registry.register("a", Role::Staff, None), Some(Role::Guest));
        let once = registry.members_of(Role::Staff);
        let counts_once = registry.counts();

        assert_eq!(registry.register("a", Role::Staff, None), Some(Role::Staff));
        assert_eq!(registry.members_of(Role::Staff), once);
        assert_eq!(registry.counts(), counts_once);
    }

    #[test]
    fn test_register_unknown_connection_is_ignored() {
        let mut registry = ConnectionRegistry::new();
        assert_eq!(registry.register("ghost", Role::Staff, None), None);
        assert!(registry.members_of(Role::Staff).is_empty());
    }

    #[test]
    fn test_unregister_clears_group_and_interest() {
        let mut registry = ConnectionRegistry::new();
        let session = attach(&mut registry, "a");
        registry.register("a", Role::Customer, Some("u1".into()));
        registry.add_interest(101, "a");

        assert!(registry.unregister("a", session).is_some());
        assert!(registry.members_of(Role::Customer).is_empty());
        assert!(registry.audience(101, FanoutPolicy::Interested).is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stale_session_does_not_remove_reconnect() {
        let mut registry = ConnectionRegistry::new();
        let old = attach(&mut registry, "kiosk");
        let new = attach(&mut registry, "kiosk");
        assert_ne!(old, new);

        assert!(registry.unregister("kiosk", old).is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister("kiosk", new).is_some());
    }

    #[test]
    fn test_audience_policies() {
        let mut registry = ConnectionRegistry::new();
        for (id, role) in [
            ("cust-a", Role::Customer),
            ("cust-b", Role::Customer),
            ("kitchen", Role::Kitchen),
            ("guest", Role::Guest),
        ] {
            attach(&mut registry, id);
            registry.register(id, role, None);
        }
        registry.add_interest(7, "cust-a");

        let mut all = registry.audience(7, FanoutPolicy::All);
        all.sort();
        assert_eq!(all, vec!["cust-a", "cust-b", "guest", "kitchen"]);

        let mut narrowed = registry.audience(7, FanoutPolicy::Interested);
        narrowed.sort();
        assert_eq!(narrowed, vec!["cust-a", "kitchen"]);
    }

    #[test]
    fn test_parse_fanout_policy() {
        assert_eq!("ALL".parse::<FanoutPolicy>(), Ok(FanoutPolicy::All));
        assert_eq!("interested".parse::<FanoutPolicy>(), Ok(FanoutPolicy::Interested));
        assert!("some".parse::<FanoutPolicy>().is_err());
    }
}
