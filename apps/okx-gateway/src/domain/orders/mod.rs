//! Order State Cache
//!
//! Last-known order per local id. Entries are never evicted: later updates
//! from channels that omit fields rely on the cached copy to back-fill them.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::trading::Order;

/// Thread-safe map of local order id to last-known order.
#[derive(Debug, Default)]
pub struct OrderStateCache {
    orders: RwLock<HashMap<String, Order>>,
}

impl OrderStateCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `order` into the cache and return the stored result.
    ///
    /// Fields the update does not carry are copied forward from the cached
    /// order with the same id.
    pub fn upsert(&self, mut order: Order) -> Order {
        let mut orders = self.orders.write();

        if let Some(previous) = orders.get(&order.order_id)
            && order.offset.is_none()
        {
            order.offset = previous.offset;
        }

        orders.insert(order.order_id.clone(), order.clone());
        order
    }

    /// Owned copy of the cached order.
    #[must_use]
    pub fn get(&self, order_id: &str) -> Option<Order> {
        self.orders.read().get(order_id).cloned()
    }

    /// Number of cached orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }
}
