//! Port Interfaces
//!
//! Contracts between the gateway core and its transports, following the
//! Hexagonal Architecture pattern. Infrastructure adapters implement these.
//!
//! ## Driven Ports (Outbound)
//!
//! - `RestTransport`: signed REST requests
//! - `FrameSink`: outbound WebSocket frames for one channel
//! - `EventSink`: normalized objects delivered to the trading engine
//! - `RelayClientPort`: RPC calls to downstream gateways

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::domain::events::GatewayEvent;
use crate::domain::trading::{
    Account, Bar, CancelRequest, Contract, HistoryRequest, Order, OrderRequest, Position,
    SubscribeRequest, Trade,
};

// =============================================================================
// Errors
// =============================================================================

/// Errors surfaced by transports.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The channel has no live connection.
    #[error("transport not connected")]
    NotConnected,

    /// The outbound queue was dropped.
    #[error("outbound channel closed")]
    ChannelClosed,

    /// The request could not be sent or its response not read.
    #[error("request failed: {0}")]
    Request(String),

    /// Payload serialization failed.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// Errors surfaced by the relay RPC client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// No downstream gateway owns the symbol.
    #[error("no downstream gateway for {0}")]
    UnknownSymbol(String),

    /// The RPC call failed.
    #[error("rpc call failed: {0}")]
    Rpc(String),
}

// =============================================================================
// Event Delivery
// =============================================================================

/// Receives every normalized object the gateway produces.
///
/// Implementations must not block: emission happens on frame dispatch.
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    fn emit(&self, event: GatewayEvent);
}

// =============================================================================
// WebSocket Frames
// =============================================================================

/// Outbound WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// JSON text payload.
    Text(String),
    /// Application-level keep-alive (the literal text `ping`).
    Ping,
}

/// Writes frames to one WebSocket channel.
pub trait FrameSink: Send + Sync {
    /// Queue a frame for sending.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the channel cannot accept frames.
    fn send_frame(&self, frame: OutboundFrame) -> Result<(), TransportError>;
}

// =============================================================================
// REST
// =============================================================================

/// HTTP method of a signed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET.
    Get,
    /// POST.
    Post,
}

impl HttpMethod {
    /// Uppercase method name, as used in the signature payload.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// Raw REST response. Non-2xx statuses are returned, not raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: String,
}

impl RestResponse {
    /// Create a response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status / 100 == 2
    }

    /// Parse the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Sends signed REST requests to the venue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RestTransport: Send + Sync {
    /// Sign and send one request.
    ///
    /// `params` become the query string; `body` is sent as JSON.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` only when no HTTP response was obtained.
    async fn send_signed_request(
        &self,
        method: HttpMethod,
        path: &str,
        params: &[(String, String)],
        body: Option<serde_json::Value>,
    ) -> Result<RestResponse, TransportError>;
}

// =============================================================================
// Relay
// =============================================================================

/// RPC client for a relay server fronting several downstream gateways.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelayClientPort: Send + Sync {
    /// Subscribe market data on `gateway_name`.
    async fn subscribe(&self, req: SubscribeRequest, gateway_name: &str) -> Result<(), RelayError>;

    /// Place an order; returns the downstream `gateway.orderid`.
    async fn send_order(&self, req: OrderRequest, gateway_name: &str)
    -> Result<String, RelayError>;

    /// Cancel one order.
    async fn cancel_order(&self, req: CancelRequest, gateway_name: &str)
    -> Result<(), RelayError>;

    /// Cancel several orders on one downstream gateway.
    async fn cancel_orders(
        &self,
        reqs: Vec<CancelRequest>,
        gateway_name: &str,
    ) -> Result<(), RelayError>;

    /// Fetch candle history.
    async fn query_history(
        &self,
        req: HistoryRequest,
        gateway_name: &str,
    ) -> Result<Vec<Bar>, RelayError>;

    /// Every contract known to the relay server.
    async fn get_all_contracts(&self) -> Result<Vec<Contract>, RelayError>;

    /// Every account known to the relay server.
    async fn get_all_accounts(&self) -> Result<Vec<Account>, RelayError>;

    /// Every position known to the relay server.
    async fn get_all_positions(&self) -> Result<Vec<Position>, RelayError>;

    /// Every order known to the relay server.
    async fn get_all_orders(&self) -> Result<Vec<Order>, RelayError>;

    /// Every trade known to the relay server.
    async fn get_all_trades(&self) -> Result<Vec<Trade>, RelayError>;
}

// =============================================================================
// No-op Implementations
// =============================================================================

/// Event sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, event: GatewayEvent) {
        tracing::trace!(kind = event.kind(), "Discarding gateway event");
    }
}
