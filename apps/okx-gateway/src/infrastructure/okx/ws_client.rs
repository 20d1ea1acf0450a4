//! WebSocket Channel Driver
//!
//! Owns the socket for one [`ChannelSession`]: connects, feeds inbound text
//! to the session, drains the session's outbound queue and reconnects with
//! exponential backoff when the connection drops. The keep-alive is ticked
//! by the gateway timer; a pong timeout arrives here as a reconnect request.
//!
//! # Lifecycle
//!
//! 1. Connect and hand the session a queue-backed `FrameSink`
//! 2. Loop over cancellation, reconnect requests, outbound frames and reads
//! 3. On any transport failure: mark the session disconnected, back off, retry
//!
//! The session lock is only taken in synchronous sections, never across an
//! `await`.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::codec::PING_TEXT;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::session::{ChannelSession, SessionError, TransportFault};
use crate::application::ports::{FrameSink, OutboundFrame, TransportError};
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end one connection.
#[derive(Debug, thiserror::Error)]
pub enum WsClientError {
    /// WebSocket protocol or I/O error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The session could not complete its handshake.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// A reconnect was requested, usually after a pong timeout.
    #[error("reconnect requested")]
    ReconnectRequested,

    /// The server closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

// =============================================================================
// Frame Sink
// =============================================================================

/// `FrameSink` that queues frames for the driver's write half.
#[derive(Debug, Clone)]
pub struct QueuedFrameSink {
    tx: mpsc::UnboundedSender<OutboundFrame>,
}

impl QueuedFrameSink {
    /// Create a sink and the queue the driver drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl FrameSink for QueuedFrameSink {
    fn send_frame(&self, frame: OutboundFrame) -> Result<(), TransportError> {
        self.tx
            .send(frame)
            .map_err(|_| TransportError::ChannelClosed)
    }
}

/// Wire message for an outbound frame. The keep-alive is a text `ping`.
#[must_use]
pub fn to_message(frame: OutboundFrame) -> Message {
    match frame {
        OutboundFrame::Text(text) => Message::Text(text.into()),
        OutboundFrame::Ping => Message::Text(PING_TEXT.into()),
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Connection loop for one channel.
pub struct WsChannelDriver {
    url: String,
    session: Arc<Mutex<ChannelSession>>,
    reconnect: ReconnectConfig,
    reconnect_requested: Notify,
    cancel: CancellationToken,
}

impl WsChannelDriver {
    /// Create a driver for `session` at `url`.
    #[must_use]
    pub fn new(
        url: String,
        session: Arc<Mutex<ChannelSession>>,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            url,
            session,
            reconnect,
            reconnect_requested: Notify::new(),
            cancel,
        }
    }

    /// Drop the current connection and reconnect.
    ///
    /// Only a live connection hears the request; one made while the driver is
    /// connecting or backing off is discarded.
    pub fn request_reconnect(&self) {
        self.reconnect_requested.notify_waiters();
    }

    /// Session driven by this loop.
    #[must_use]
    pub fn session(&self) -> Arc<Mutex<ChannelSession>> {
        Arc::clone(&self.session)
    }

    /// Run until cancelled or reconnect attempts are exhausted.
    ///
    /// # Errors
    ///
    /// Returns `WsClientError::MaxReconnectAttemptsExceeded` once the
    /// backoff schedule gives up.
    pub async fn run(self: Arc<Self>) -> Result<(), WsClientError> {
        let channel = self.session.lock().kind().as_str();
        let mut policy = ReconnectPolicy::new(self.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(channel, "Channel driver cancelled");
                return Ok(());
            }

            match self.connect_and_run(&mut policy).await {
                Ok(()) => {
                    tracing::info!(channel, "Channel driver stopped");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(channel, error = %e, "Channel connection lost");
                    self.session.lock().on_disconnected();

                    let Some(delay) = policy.next_delay() else {
                        return Err(WsClientError::MaxReconnectAttemptsExceeded);
                    };
                    metrics::record_reconnect(channel);
                    tracing::info!(
                        channel,
                        attempt = policy.attempt_count(),
                        delay_ms = delay.as_millis(),
                        "Reconnecting"
                    );

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            tracing::info!(channel, "Channel driver cancelled during reconnect delay");
                            return Ok(());
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn connect_and_run(&self, policy: &mut ReconnectPolicy) -> Result<(), WsClientError> {
        self.session.lock().on_connecting();
        tracing::info!(url = %self.url, "Connecting");

        let ws_stream = match tokio_tungstenite::connect_async(self.url.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                self.session
                    .lock()
                    .on_error(TransportFault::Connect, &e.to_string());
                return Err(e.into());
            }
        };
        let (mut write, mut read) = ws_stream.split();

        let (sink, mut outbound) = QueuedFrameSink::channel();
        self.session.lock().on_connected(Arc::new(sink))?;

        let mut ready_seen = false;

        loop {
            if !ready_seen && self.session.lock().is_ready() {
                ready_seen = true;
                policy.reset();
            }

            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.close().await;
                    self.session.lock().on_disconnected();
                    return Ok(());
                }
                () = self.reconnect_requested.notified() => {
                    let _ = write.close().await;
                    return Err(WsClientError::ReconnectRequested);
                }
                Some(frame) = outbound.recv() => {
                    if let Err(e) = write.send(to_message(frame)).await {
                        self.session.lock().on_error(TransportFault::Write, &e.to_string());
                        return Err(e.into());
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.session.lock().on_frame(text.as_str());
                        }
                        Some(Ok(Message::Binary(data))) => {
                            if let Ok(text) = std::str::from_utf8(&data) {
                                self.session.lock().on_frame(text);
                            } else {
                                tracing::warn!(len = data.len(), "Received non-UTF8 binary message");
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!(url = %self.url, "Server sent close frame");
                            return Err(WsClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            self.session.lock().on_error(TransportFault::Read, &e.to_string());
                            return Err(e.into());
                        }
                        None => {
                            tracing::info!(url = %self.url, "WebSocket stream ended");
                            return Err(WsClientError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::application::ports::NoOpEventSink;
    use crate::domain::context::GatewayContext;
    use crate::domain::trading::now_reporting;
    use crate::infrastructure::okx::heartbeat::HeartbeatConfig;

    fn driver() -> WsChannelDriver {
        let session = ChannelSession::public(
            Arc::new(GatewayContext::new("OKX", now_reporting())),
            Arc::new(NoOpEventSink),
            HeartbeatConfig::default(),
        );
        WsChannelDriver::new(
            "wss://localhost/ws/v5/public".to_string(),
            Arc::new(Mutex::new(session)),
            ReconnectConfig::default(),
            CancellationToken::new(),
        )
    }

    #[test]
    fn keepalive_is_text_ping() {
        assert_eq!(to_message(OutboundFrame::Ping), Message::Text("ping".into()));
        assert_eq!(
            to_message(OutboundFrame::Text("{}".to_string())),
            Message::Text("{}".into())
        );
    }

    #[tokio::test]
    async fn queued_sink_delivers_in_order() {
        let (sink, mut rx) = QueuedFrameSink::channel();
        sink.send_frame(OutboundFrame::Ping).unwrap();
        sink.send_frame(OutboundFrame::Text("a".to_string())).unwrap();

        assert_eq!(rx.recv().await, Some(OutboundFrame::Ping));
        assert_eq!(rx.recv().await, Some(OutboundFrame::Text("a".to_string())));
    }

    #[test]
    fn queued_sink_fails_once_driver_is_gone() {
        let (sink, rx) = QueuedFrameSink::channel();
        drop(rx);
        assert_eq!(
            sink.send_frame(OutboundFrame::Ping),
            Err(TransportError::ChannelClosed)
        );
    }

    #[tokio::test]
    async fn reconnect_request_without_live_connection_is_discarded() {
        let driver = driver();
        driver.request_reconnect();

        let next = driver.reconnect_requested.notified();
        let woke = tokio::time::timeout(Duration::from_millis(20), next).await;
        assert!(woke.is_err());
    }

    #[tokio::test]
    async fn reconnect_request_wakes_live_connection() {
        let driver = driver();
        let next = driver.reconnect_requested.notified();
        driver.request_reconnect();

        let woke = tokio::time::timeout(Duration::from_millis(20), next).await;
        assert!(woke.is_ok());
    }
}
