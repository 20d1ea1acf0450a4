#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! OKX Gateway - Market Access Adapter
//!
//! Connects a trading engine to OKX over REST and three WebSocket channels
//! (public, private, business) and normalizes everything the venue sends
//! into one trading-object schema with one order identifier space.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Trading objects and reconciliation state
//!   - `trading`: orders, trades, contracts, ticks, bars and requests
//!   - `identifiers`: local↔remote order id maps and the id allocator
//!   - `orders`, `contracts`: last-known order state and instrument metadata
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: REST transport, frame sink, event sink, relay client
//!   - `services`: order router, history, bootstrap, relay, gateway facade
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `okx`: wire types, codec, signing, channel sessions, transports
//!   - `events`: channel-backed event delivery
//!   - `config`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! public WS  ──┐
//! private WS ──┼──► ChannelSession ──► reconcile ──► EventSink ──► engine
//! business WS ─┘          ▲
//!                         │ order / cancel ops
//! engine ──► OkxGateway ──┴──► OrderRouter ──► REST (algo orders, history)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Trading objects and reconciliation state.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// Crate-level error type.
pub mod error;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::context::GatewayContext;
pub use domain::events::{GatewayEvent, LogLevel, LogRecord};
pub use domain::identifiers::{IdSpace, IdentifierRegistry, LocalIdAllocator, RegistryError};
pub use domain::trading::{
    Account, Bar, CancelRequest, Contract, Direction, Exchange, HistoryRequest, Interval, Offset,
    Order, OrderRequest, OrderType, Position, Product, Status, SubscribeRequest, Tick, Trade,
};

// Ports
pub use application::ports::{
    EventSink, FrameSink, HttpMethod, OutboundFrame, RelayClientPort, RelayError, RestResponse,
    RestTransport, TransportError,
};

// Services
pub use application::services::{
    BootstrapReport, ChannelEndpoints, HistoryError, HistoryFetcher, OkxGateway, OrderRouter,
    ReferenceBootstrap, RelayGateway, RestWorker, RouterError,
};

// Errors
pub use error::GatewayError;

// Infrastructure config
pub use infrastructure::config::{ConfigError, GatewayConfig, Server};

// Event delivery
pub use infrastructure::events::ChannelEventSink;

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
