//! Event Channel
//!
//! Fans every session, the router and the bootstrap into one consumer over an
//! unbounded `mpsc` channel. Emission never blocks frame dispatch.

use tokio::sync::mpsc;

use crate::application::ports::EventSink;
use crate::domain::events::GatewayEvent;

/// `EventSink` backed by an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl ChannelEventSink {
    /// Create a sink and the receiver that drains it.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Whether the consumer has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: GatewayEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::debug!(kind = e.0.kind(), "Event consumer closed, dropping event");
        }
    }
}
