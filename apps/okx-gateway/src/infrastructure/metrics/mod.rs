//! Prometheus Metrics Module
//!
//! Exposes gateway metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: inbound frames per channel, and frames dropped undecoded
//! - **Orders**: submissions per route, rejections per kind
//! - **Sessions**: reconnects and readiness per channel
//!
//! # Integration
//!
//! With a non-zero port the exporter serves `/metrics` itself; with port 0
//! the recorder is installed without a listener.

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static INSTALLED: OnceLock<u16> = OnceLock::new();

/// Install the Prometheus recorder.
///
/// Calling again after a successful install is a no-op.
///
/// # Errors
///
/// Returns `BuildError` if the recorder or listener cannot be installed.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let builder = PrometheusBuilder::new();
    if port == 0 {
        let handle = builder.install_recorder()?;
        let _ = PROMETHEUS_HANDLE.set(handle);
    } else {
        builder
            .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
            .install()?;
    }

    register_metrics();
    let _ = INSTALLED.set(port);
    Ok(())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` unless the recorder was installed without a listener.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "okx_gateway_frames_received_total",
        "Total WebSocket frames received per channel"
    );
    describe_counter!(
        "okx_gateway_frames_dropped_total",
        "Total frames dropped as undecodable or unrouted"
    );
    describe_counter!(
        "okx_gateway_orders_submitted_total",
        "Total orders submitted per route"
    );
    describe_counter!(
        "okx_gateway_orders_rejected_total",
        "Total orders rejected per rejection kind"
    );
    describe_counter!(
        "okx_gateway_reconnects_total",
        "Total WebSocket reconnection attempts"
    );
    describe_gauge!(
        "okx_gateway_session_ready",
        "1 while the channel session is ready, 0 otherwise"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Route an order was submitted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRoute {
    /// Private WebSocket `order` op.
    WebSocket,
    /// REST `order-algo`.
    RestAlgo,
}

impl OrderRoute {
    const fn as_str(self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::RestAlgo => "rest_algo",
        }
    }
}

/// Why an order was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectKind {
    /// The whole request envelope failed.
    Envelope,
    /// A per-item result failed.
    Item,
    /// The request never reached the venue.
    Local,
}

impl RejectKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Envelope => "envelope",
            Self::Item => "item",
            Self::Local => "local",
        }
    }
}

/// Record a frame received on `channel`.
pub fn record_frame_received(channel: &'static str) {
    counter!("okx_gateway_frames_received_total", "channel" => channel).increment(1);
}

/// Record a frame dropped on `channel`.
pub fn record_frame_dropped(channel: &'static str) {
    counter!("okx_gateway_frames_dropped_total", "channel" => channel).increment(1);
}

/// Record an order submission.
pub fn record_order_submitted(route: OrderRoute) {
    counter!("okx_gateway_orders_submitted_total", "route" => route.as_str()).increment(1);
}

/// Record an order rejection.
pub fn record_order_rejected(kind: RejectKind) {
    counter!("okx_gateway_orders_rejected_total", "kind" => kind.as_str()).increment(1);
}

/// Record a reconnection attempt on `channel`.
pub fn record_reconnect(channel: &'static str) {
    counter!("okx_gateway_reconnects_total", "channel" => channel).increment(1);
}

/// Update readiness of `channel`.
pub fn set_session_ready(channel: &'static str, ready: bool) {
    gauge!("okx_gateway_session_ready", "channel" => channel).set(if ready { 1.0 } else { 0.0 });
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_values() {
        assert_eq!(OrderRoute::WebSocket.as_str(), "websocket");
        assert_eq!(OrderRoute::RestAlgo.as_str(), "rest_algo");
        assert_eq!(RejectKind::Envelope.as_str(), "envelope");
        assert_eq!(RejectKind::Item.as_str(), "item");
        assert_eq!(RejectKind::Local.as_str(), "local");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_frame_received("private");
        record_order_rejected(RejectKind::Item);
        set_session_ready("public", true);
    }
}
