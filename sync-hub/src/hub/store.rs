//! In-memory order state store
//!
//! Holds the live snapshot of every order that has not been evicted yet.
//! Owned by the hub actor, so no locking.

use std::collections::HashMap;

use shared::order::{OrderId, OrderSnapshot};

#[derive(Debug, Default)]
pub struct OrderStore {
    orders: HashMap<OrderId, OrderSnapshot>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; returns the previous snapshot
    pub fn upsert(&mut self, snapshot: OrderSnapshot) -> Option<OrderSnapshot> {
        self.orders.insert(snapshot.order_id, snapshot)
    }

    pub fn get(&self, order_id: OrderId) -> Option<&OrderSnapshot> {
        self.orders.get(&order_id)
    }

    pub fn get_mut(&mut self, order_id: OrderId) -> Option<&mut OrderSnapshot> {
        self.orders.get_mut(&order_id)
    }

    pub fn remove(&mut self, order_id: OrderId) -> Option<OrderSnapshot> {
        self.orders.remove(&order_id)
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.orders.contains_key(&order_id)
    }

    /// All live orders, oldest first (ties broken by id)
    pub fn all(&self) -> Vec<OrderSnapshot> {
        let mut orders: Vec<_> = self.orders.values().cloned().collect();
        orders.sort_by_key(|o| (o.created_at, o.order_id));
        orders
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}
