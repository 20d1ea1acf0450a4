//! Keep-alive Tracking
//!
//! OKX drops a WebSocket that stays silent for 30 seconds. Each channel
//! session sends the text frame `ping` when its timer fires and no ping has
//! gone out for at least the ping interval; the venue answers `pong`.
//!
//! The state here is clock-driven rather than task-driven: callers pass the
//! current `Instant`, so the gateway timer and tests share one code path.

use std::time::{Duration, Instant};

use crate::infrastructure::config::WebSocketSettings;

/// Configuration for keep-alive behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Minimum time between pings.
    pub ping_interval: Duration,
    /// Time an unanswered ping may stay outstanding.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(30),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, pong_timeout: Duration) -> Self {
        Self {
            ping_interval,
            pong_timeout,
        }
    }

    /// Create configuration from `WebSocketSettings`.
    #[must_use]
    pub const fn from_websocket_settings(settings: &WebSocketSettings) -> Self {
        Self {
            ping_interval: settings.heartbeat_interval,
            pong_timeout: settings.heartbeat_timeout,
        }
    }
}

/// What the session should do on a timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Send a ping.
    SendPing,
    /// A ping went unanswered past the timeout; reconnect.
    Timeout,
}

/// Per-connection keep-alive state.
#[derive(Debug, Clone)]
pub struct HeartbeatState {
    config: HeartbeatConfig,
    last_ping: Option<Instant>,
    last_pong: Option<Instant>,
    unanswered_since: Option<Instant>,
}

impl HeartbeatState {
    /// Create state for a fresh connection.
    #[must_use]
    pub const fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            last_ping: None,
            last_pong: None,
            unanswered_since: None,
        }
    }

    /// Decide what to do at `now`. Does not mutate; call
    /// [`mark_ping_sent`](Self::mark_ping_sent) once the ping is queued.
    #[must_use]
    pub fn poll(&self, now: Instant) -> Option<HeartbeatEvent> {
        if let Some(since) = self.unanswered_since
            && now.saturating_duration_since(since) > self.config.pong_timeout
        {
            return Some(HeartbeatEvent::Timeout);
        }

        match self.last_ping {
            Some(sent) if now.saturating_duration_since(sent) < self.config.ping_interval => None,
            _ => Some(HeartbeatEvent::SendPing),
        }
    }

    /// Record that a ping was sent at `now`.
    ///
    /// The timeout runs from the first ping still unanswered.
    pub fn mark_ping_sent(&mut self, now: Instant) {
        self.last_ping = Some(now);
        if self.unanswered_since.is_none() {
            self.unanswered_since = Some(now);
        }
    }

    /// Record that a pong arrived at `now`.
    pub fn record_pong(&mut self, now: Instant) {
        self.last_pong = Some(now);
        self.unanswered_since = None;
    }

    /// Check if we're currently waiting for a pong.
    #[must_use]
    pub const fn is_waiting_for_pong(&self) -> bool {
        self.unanswered_since.is_some()
    }

    /// Time of the last pong, if any.
    #[must_use]
    pub const fn last_pong(&self) -> Option<Instant> {
        self.last_pong
    }

    /// Reset state for a new connection.
    pub fn reset(&mut self) {
        self.last_ping = None;
        self.last_pong = None;
        self.unanswered_since = None;
    }
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new(HeartbeatConfig::default())
    }
}
