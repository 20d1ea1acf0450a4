//! Gateway Context
//!
//! The state every channel session, the order router and the bootstrap
//! share: contracts, identifier maps, the order cache and the id allocator.
//! Created once per gateway and handed around behind an `Arc`.

use chrono::{DateTime, FixedOffset};

use crate::domain::contracts::ContractCache;
use crate::domain::identifiers::{IdentifierRegistry, LocalIdAllocator};
use crate::domain::orders::OrderStateCache;

/// Shared gateway state.
#[derive(Debug)]
pub struct GatewayContext {
    gateway_name: String,
    /// Instrument metadata.
    pub contracts: ContractCache,
    /// Local↔remote order id maps.
    pub registry: IdentifierRegistry,
    /// Last-known order per local id.
    pub orders: OrderStateCache,
    /// Local order id allocator.
    pub allocator: LocalIdAllocator,
}

impl GatewayContext {
    /// Create the context for `gateway_name`, prefixing ids with `connect_time`.
    #[must_use]
    pub fn new(gateway_name: impl Into<String>, connect_time: DateTime<FixedOffset>) -> Self {
        Self {
            gateway_name: gateway_name.into(),
            contracts: ContractCache::new(),
            registry: IdentifierRegistry::new(),
            orders: OrderStateCache::new(),
            allocator: LocalIdAllocator::from_connect_time(connect_time),
        }
    }

    /// Name stamped on every emitted object.
    #[must_use]
    pub fn gateway_name(&self) -> &str {
        &self.gateway_name
    }
}
