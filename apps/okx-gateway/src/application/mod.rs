//! Application Layer - Use cases and port definitions.
//!
//! Ports describe the transports and sinks the gateway consumes. Services
//! implement order routing, history retrieval, reference-data bootstrap,
//! the relay variant and the gateway facade on top of them.

/// Port interfaces for transports and event delivery.
pub mod ports;

/// Order routing, history, bootstrap, relay and facade services.
pub mod services;
