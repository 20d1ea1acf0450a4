//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports: the OKX WebSocket and
//! REST adapters, the event channel, configuration and observability.

/// OKX wire types, codec, sessions and transports.
pub mod okx;

/// Channel-backed event delivery.
pub mod events;

/// Configuration loaded from the environment.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
