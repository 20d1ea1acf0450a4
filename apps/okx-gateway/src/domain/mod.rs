//! Domain Layer - Trading objects and order reconciliation state.
//!
//! Pure types with no I/O: the normalized trading schema, the identifier
//! registry, the order state cache and the contract cache.

/// Normalized trading objects and requests.
pub mod trading;

/// Events emitted to the trading engine.
pub mod events;

/// Local↔remote order identifier maps and the local id allocator.
pub mod identifiers;

/// Last-known order state per local id.
pub mod orders;

/// Instrument metadata and margin mode selection.
pub mod contracts;

/// Shared state owned by one gateway instance.
pub mod context;
