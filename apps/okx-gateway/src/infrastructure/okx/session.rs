//! Channel Session
//!
//! One session per OKX WebSocket (public, private, business). The session
//! owns the channel's connection state, its keep-alive, the subscription set
//! it replays after every reconnect, and a `Route → handler` dispatch table.
//! It never touches the socket: outbound frames go through a `FrameSink`, and
//! the driver feeds inbound text to [`ChannelSession::on_frame`].
//!
//! # States
//!
//! ```text
//! Disconnected → Connecting → Connected → Authenticating → Ready
//!                                  └──────── (public) ──────┘
//! ```
//!
//! Any transport drop returns the session to `Disconnected`.
//!
//! # Subscriptions on Ready
//!
//! | Channel | Topics |
//! |---------|--------|
//! | public | `tickers` + `books5` per cached symbol |
//! | private | `orders(ANY)`, `account`, `positions(ANY)` |
//! | business | `orders-algo(ANY)` |

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::auth::{self, AuthError, RequestSigner};
use super::codec::{self, CodecError, InboundFrame, Route};
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatState};
use super::messages::{
    AccountPayload, AckItem, AlgoOrderPayload, BookPayload, CancelArgs, ChannelArg, OpRequest,
    OrderPayload, PlaceOrderArgs, PositionPayload, TickerPayload,
};
use super::reconcile;
use crate::application::ports::{EventSink, FrameSink, OutboundFrame, TransportError};
use crate::domain::context::GatewayContext;
use crate::domain::events::{GatewayEvent, LogLevel};
use crate::domain::trading::{Order, SubscribeRequest, Tick, now_reporting};
use crate::infrastructure::metrics::{self, RejectKind};

// =============================================================================
// Types
// =============================================================================

/// Which OKX WebSocket a session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Public market data.
    Public,
    /// Private orders, account and positions.
    Private,
    /// Business channel carrying algo orders.
    Business,
}

impl ChannelKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Business => "business",
        }
    }

    /// Whether the channel must log in before subscribing.
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        !matches!(self, Self::Public)
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection.
    Disconnected,
    /// Connection attempt in flight.
    Connecting,
    /// Socket open, nothing sent yet.
    Connected,
    /// Login sent, awaiting the login event.
    Authenticating,
    /// Subscriptions sent; requests accepted.
    Ready,
}

/// Transport failure reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFault {
    /// The connection attempt failed.
    Connect,
    /// Reading from the socket failed.
    Read,
    /// Writing to the socket failed.
    Write,
}

impl TransportFault {
    /// Label used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// What a timer tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    /// Nothing due.
    Idle,
    /// A ping was queued.
    Pinged,
    /// The last ping went unanswered too long; the driver should reconnect.
    Timeout,
}

/// Session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A frame or payload did not decode.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Login failed or could not be signed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The frame sink refused the frame.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The channel cannot accept requests yet.
    #[error("{0} channel is not ready")]
    NotReady(ChannelKind),

    /// A route was bound to a frame of the wrong shape.
    #[error("unexpected frame shape for {0}")]
    UnexpectedFrame(&'static str),
}

type Handler = fn(&mut ChannelSession, InboundFrame) -> Result<(), SessionError>;

// =============================================================================
// Session
// =============================================================================

/// State and dispatch for one WebSocket channel.
pub struct ChannelSession {
    kind: ChannelKind,
    state: SessionState,
    ctx: Arc<GatewayContext>,
    events: Arc<dyn EventSink>,
    signer: Option<RequestSigner>,
    sink: Option<Arc<dyn FrameSink>>,
    heartbeat: HeartbeatState,
    handlers: HashMap<Route, Handler>,
    subscriptions: BTreeMap<String, SubscribeRequest>,
    ticks: HashMap<String, Tick>,
    pending: HashMap<String, Order>,
    next_request_id: u64,
}

impl fmt::Debug for ChannelSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSession")
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("subscriptions", &self.subscriptions.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl ChannelSession {
    /// Public market data session.
    #[must_use]
    pub fn public(
        ctx: Arc<GatewayContext>,
        events: Arc<dyn EventSink>,
        heartbeat: HeartbeatConfig,
    ) -> Self {
        Self::new(ChannelKind::Public, ctx, events, None, heartbeat)
    }

    /// Private session; logs in with `signer`.
    #[must_use]
    pub fn private(
        ctx: Arc<GatewayContext>,
        events: Arc<dyn EventSink>,
        signer: RequestSigner,
        heartbeat: HeartbeatConfig,
    ) -> Self {
        Self::new(ChannelKind::Private, ctx, events, Some(signer), heartbeat)
    }

    /// Business session; logs in with `signer`.
    #[must_use]
    pub fn business(
        ctx: Arc<GatewayContext>,
        events: Arc<dyn EventSink>,
        signer: RequestSigner,
        heartbeat: HeartbeatConfig,
    ) -> Self {
        Self::new(ChannelKind::Business, ctx, events, Some(signer), heartbeat)
    }

    fn new(
        kind: ChannelKind,
        ctx: Arc<GatewayContext>,
        events: Arc<dyn EventSink>,
        signer: Option<RequestSigner>,
        heartbeat: HeartbeatConfig,
    ) -> Self {
        Self {
            kind,
            state: SessionState::Disconnected,
            ctx,
            events,
            signer,
            sink: None,
            heartbeat: HeartbeatState::new(heartbeat),
            handlers: Self::handlers_for(kind),
            subscriptions: BTreeMap::new(),
            ticks: HashMap::new(),
            pending: HashMap::new(),
            next_request_id: 0,
        }
    }

    fn handlers_for(kind: ChannelKind) -> HashMap<Route, Handler> {
        let mut handlers: HashMap<Route, Handler> = HashMap::from([
            (Route::Login, Self::on_login as Handler),
            (Route::Subscribed, Self::on_subscribed as Handler),
            (Route::Error, Self::on_error_event as Handler),
            (Route::Pong, Self::on_pong as Handler),
        ]);

        let specific: &[(Route, Handler)] = match kind {
            ChannelKind::Public => &[
                (Route::Tickers, Self::on_tickers),
                (Route::Books5, Self::on_books5),
            ],
            ChannelKind::Private => &[
                (Route::OrderAck, Self::on_order_ack),
                (Route::CancelAck, Self::on_cancel_ack),
                (Route::BatchCancelAck, Self::on_cancel_ack),
                (Route::Orders, Self::on_orders),
                (Route::Account, Self::on_account),
                (Route::Positions, Self::on_positions),
            ],
            ChannelKind::Business => &[(Route::OrdersAlgo, Self::on_orders_algo)],
        };
        handlers.extend(specific.iter().copied());
        handlers
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Channel this session drives.
    #[must_use]
    pub const fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether requests can be sent.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Cached market data subscriptions, ordered by `vt_symbol`.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<SubscribeRequest> {
        self.subscriptions.values().cloned().collect()
    }

    /// Latest tick for `symbol`.
    #[must_use]
    pub fn tick(&self, symbol: &str) -> Option<Tick> {
        self.ticks.get(symbol).cloned()
    }

    /// Whether a ping is awaiting its pong.
    #[must_use]
    pub const fn is_awaiting_pong(&self) -> bool {
        self.heartbeat.is_waiting_for_pong()
    }

    /// Order requests sent but not yet acknowledged.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    // -------------------------------------------------------------------------
    // Transport callbacks
    // -------------------------------------------------------------------------

    /// The driver started a connection attempt.
    pub fn on_connecting(&mut self) {
        self.state = SessionState::Connecting;
    }

    /// The socket opened; frames written to `sink` reach the venue.
    ///
    /// Public sessions become ready at once; the others send their login.
    ///
    /// # Errors
    ///
    /// Returns an error if the login or subscriptions cannot be sent.
    pub fn on_connected(&mut self, sink: Arc<dyn FrameSink>) -> Result<(), SessionError> {
        self.sink = Some(sink);
        self.heartbeat.reset();
        self.state = SessionState::Connected;
        tracing::info!(channel = %self.kind, "WebSocket connected");

        let Some(signer) = self.signer.as_ref().filter(|_| self.kind.requires_login()) else {
            return self.enter_ready();
        };

        let login = signer
            .login_request(Utc::now())?
            .to_json()
            .map_err(CodecError::from)?;
        self.send_text(login)?;
        self.state = SessionState::Authenticating;
        Ok(())
    }

    /// The socket closed.
    pub fn on_disconnected(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.state = SessionState::Disconnected;
        self.sink = None;
        self.heartbeat.reset();
        metrics::set_session_ready(self.kind.as_str(), false);

        if !self.pending.is_empty() {
            tracing::warn!(
                channel = %self.kind,
                pending = self.pending.len(),
                "Dropping unacknowledged order requests"
            );
            self.pending.clear();
        }
        tracing::info!(channel = %self.kind, "WebSocket disconnected");
    }

    /// The transport failed; the session goes back to `Disconnected`.
    pub fn on_error(&mut self, fault: TransportFault, detail: &str) {
        reconcile::write_log(
            self.events.as_ref(),
            self.ctx.gateway_name(),
            LogLevel::Warn,
            format!(
                "{} channel {} error: {detail}",
                self.kind,
                fault.as_str()
            ),
        );
        self.on_disconnected();
    }

    /// Dispatch one inbound text frame.
    pub fn on_frame(&mut self, text: &str) {
        let channel = self.kind.as_str();
        metrics::record_frame_received(channel);

        let frame = match codec::decode_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                metrics::record_frame_dropped(channel);
                tracing::warn!(channel, error = %e, "Dropping undecodable frame");
                return;
            }
        };

        let handler = Route::of(&frame).and_then(|route| self.handlers.get(&route).copied());
        let Some(handler) = handler else {
            metrics::record_frame_dropped(channel);
            tracing::trace!(channel, topic = codec::topic_of(&frame), "Dropping unrouted frame");
            return;
        };

        let topic = codec::topic_of(&frame).to_string();
        if let Err(e) = handler(self, frame) {
            reconcile::write_log(
                self.events.as_ref(),
                self.ctx.gateway_name(),
                LogLevel::Error,
                format!("{channel} channel failed to handle {topic}: {e}"),
            );
        }
    }

    /// Drive the keep-alive at `now`.
    pub fn on_timer(&mut self, now: Instant) -> TimerOutcome {
        if !matches!(
            self.state,
            SessionState::Connected | SessionState::Authenticating | SessionState::Ready
        ) {
            return TimerOutcome::Idle;
        }

        match self.heartbeat.poll(now) {
            None => TimerOutcome::Idle,
            Some(HeartbeatEvent::SendPing) => match self.send_frame(OutboundFrame::Ping) {
                Ok(()) => {
                    self.heartbeat.mark_ping_sent(now);
                    TimerOutcome::Pinged
                }
                Err(e) => {
                    tracing::warn!(channel = %self.kind, error = %e, "Failed to send ping");
                    TimerOutcome::Idle
                }
            },
            Some(HeartbeatEvent::Timeout) => {
                tracing::warn!(channel = %self.kind, "Pong timeout, connection considered dead");
                TimerOutcome::Timeout
            }
        }
    }

    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------

    /// Cache a market data subscription; sent now if ready, else on ready.
    ///
    /// Re-subscribing a cached symbol is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscribe frame cannot be sent.
    pub fn subscribe(&mut self, req: SubscribeRequest) -> Result<(), SessionError> {
        let key = req.vt_symbol();
        if self.subscriptions.contains_key(&key) {
            return Ok(());
        }

        self.ticks.insert(
            req.symbol.clone(),
            Tick::new(
                req.symbol.clone(),
                req.exchange,
                now_reporting(),
                self.ctx.gateway_name(),
            ),
        );
        let args = market_data_args(&req.symbol);
        self.subscriptions.insert(key, req);

        if self.is_ready() {
            self.send_subscribe(args)?;
        }
        Ok(())
    }

    /// Send an `order` op; `order` is rejected if the envelope fails.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotReady` before login completes.
    pub fn send_order(&mut self, order: Order, args: PlaceOrderArgs) -> Result<String, SessionError> {
        self.ensure_ready()?;
        let id = self.send_op("order", vec![args])?;
        self.pending.insert(id.clone(), order);
        Ok(id)
    }

    /// Send a `cancel-order` op.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotReady` before login completes.
    pub fn cancel(&mut self, args: CancelArgs) -> Result<String, SessionError> {
        self.ensure_ready()?;
        self.send_op("cancel-order", vec![args])
    }

    /// Send one `batch-cancel-orders` op.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotReady` before login completes.
    pub fn cancel_batch(&mut self, args: Vec<CancelArgs>) -> Result<String, SessionError> {
        self.ensure_ready()?;
        self.send_op("batch-cancel-orders", args)
    }

    fn ensure_ready(&self) -> Result<(), SessionError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(SessionError::NotReady(self.kind))
        }
    }

    fn send_op<A: Serialize>(
        &mut self,
        op: &'static str,
        args: Vec<A>,
    ) -> Result<String, SessionError> {
        self.next_request_id += 1;
        let id = self.next_request_id.to_string();
        let text = OpRequest::with_id(id.clone(), op, args)
            .to_json()
            .map_err(CodecError::from)?;
        self.send_text(text)?;
        Ok(id)
    }

    fn send_subscribe(&self, args: Vec<ChannelArg>) -> Result<(), SessionError> {
        let text = OpRequest::new("subscribe", args)
            .to_json()
            .map_err(CodecError::from)?;
        self.send_text(text)
    }

    fn send_text(&self, text: String) -> Result<(), SessionError> {
        self.send_frame(OutboundFrame::Text(text))
    }

    fn send_frame(&self, frame: OutboundFrame) -> Result<(), SessionError> {
        let sink = self.sink.as_ref().ok_or(TransportError::NotConnected)?;
        sink.send_frame(frame)?;
        Ok(())
    }

    fn enter_ready(&mut self) -> Result<(), SessionError> {
        self.state = SessionState::Ready;
        metrics::set_session_ready(self.kind.as_str(), true);

        let args: Vec<ChannelArg> = match self.kind {
            ChannelKind::Public => self
                .subscriptions
                .values()
                .flat_map(|req| market_data_args(&req.symbol))
                .collect(),
            ChannelKind::Private => vec![
                ChannelArg::with_inst_type("orders", "ANY"),
                ChannelArg::channel("account"),
                ChannelArg::with_inst_type("positions", "ANY"),
            ],
            ChannelKind::Business => vec![ChannelArg::with_inst_type("orders-algo", "ANY")],
        };

        if args.is_empty() {
            return Ok(());
        }
        tracing::info!(channel = %self.kind, topics = args.len(), "Subscribing");
        self.send_subscribe(args)
    }

    fn log(&self, level: LogLevel, msg: String) {
        reconcile::write_log(self.events.as_ref(), self.ctx.gateway_name(), level, msg);
    }

    /// Decode every item of a push, logging and skipping bad ones.
    fn decode_items<T: DeserializeOwned>(&self, data: Vec<serde_json::Value>) -> Vec<T> {
        data.into_iter()
            .filter_map(|value| match serde_json::from_value(value) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!(channel = %self.kind, error = %e, "Skipping malformed item");
                    None
                }
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Control handlers
    // -------------------------------------------------------------------------

    fn on_login(&mut self, frame: InboundFrame) -> Result<(), SessionError> {
        let InboundFrame::Event(event) = frame else {
            return Err(SessionError::UnexpectedFrame("login"));
        };

        if let Err(e) = auth::check_login(event.code.as_ref(), &event.msg) {
            self.state = SessionState::Connected;
            return Err(e.into());
        }

        self.log(LogLevel::Info, format!("{} channel login succeeded", self.kind));
        self.enter_ready()
    }

    fn on_subscribed(&mut self, frame: InboundFrame) -> Result<(), SessionError> {
        if let InboundFrame::Event(event) = frame {
            tracing::debug!(
                channel = %self.kind,
                topic = event.arg.as_ref().map_or("", |arg| arg.channel.as_str()),
                "Subscription confirmed"
            );
        }
        Ok(())
    }

    fn on_error_event(&mut self, frame: InboundFrame) -> Result<(), SessionError> {
        let InboundFrame::Event(event) = frame else {
            return Err(SessionError::UnexpectedFrame("error"));
        };
        let code = event.code.as_ref().map(ToString::to_string).unwrap_or_default();
        self.log(
            LogLevel::Error,
            format!(
                "{} channel request failed, code: {code}, message: {}",
                self.kind, event.msg
            ),
        );
        Ok(())
    }

    fn on_pong(&mut self, _frame: InboundFrame) -> Result<(), SessionError> {
        self.heartbeat.record_pong(Instant::now());
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Private handlers
    // -------------------------------------------------------------------------

    fn on_order_ack(&mut self, frame: InboundFrame) -> Result<(), SessionError> {
        let InboundFrame::Reply(reply) = frame else {
            return Err(SessionError::UnexpectedFrame("order"));
        };
        let pending = self.pending.remove(&reply.id);

        if !reply.is_success() && reply.data.is_empty() {
            let code = reply.code.as_ref().map(ToString::to_string).unwrap_or_default();
            self.log(
                LogLevel::Error,
                format!("Order request failed, code: {code}, message: {}", reply.msg),
            );
            if let Some(order) = pending {
                reconcile::reject_order(&self.ctx, self.events.as_ref(), order, RejectKind::Envelope);
            }
            return Ok(());
        }

        let items: Vec<AckItem> = self.decode_items(reply.data);
        reconcile::apply_place_acks(&self.ctx, self.events.as_ref(), &items, false);
        Ok(())
    }

    fn on_cancel_ack(&mut self, frame: InboundFrame) -> Result<(), SessionError> {
        let InboundFrame::Reply(reply) = frame else {
            return Err(SessionError::UnexpectedFrame("cancel-order"));
        };

        if !reply.is_success() {
            let code = reply.code.as_ref().map(ToString::to_string).unwrap_or_default();
            self.log(
                LogLevel::Error,
                format!("Cancel request failed, code: {code}, message: {}", reply.msg),
            );
        }

        let items: Vec<AckItem> = self.decode_items(reply.data);
        reconcile::log_cancel_acks(&self.ctx, self.events.as_ref(), &items);
        Ok(())
    }

    fn on_orders(&mut self, frame: InboundFrame) -> Result<(), SessionError> {
        let InboundFrame::Push(push) = frame else {
            return Err(SessionError::UnexpectedFrame("orders"));
        };

        for payload in self.decode_items::<OrderPayload>(push.data) {
            if let Err(e) = reconcile::apply_order_update(&self.ctx, self.events.as_ref(), &payload)
            {
                self.log(
                    LogLevel::Warn,
                    format!("Skipping order update {}: {e}", payload.ord_id),
                );
            }
        }
        Ok(())
    }

    fn on_account(&mut self, frame: InboundFrame) -> Result<(), SessionError> {
        let InboundFrame::Push(push) = frame else {
            return Err(SessionError::UnexpectedFrame("account"));
        };

        for payload in self.decode_items::<AccountPayload>(push.data) {
            for detail in &payload.details {
                match codec::decode_balance(detail, self.ctx.gateway_name()) {
                    Ok(account) => self.events.emit(GatewayEvent::Account(account)),
                    Err(e) => self.log(
                        LogLevel::Warn,
                        format!("Skipping balance {}: {e}", detail.ccy),
                    ),
                }
            }
        }
        Ok(())
    }

    fn on_positions(&mut self, frame: InboundFrame) -> Result<(), SessionError> {
        let InboundFrame::Push(push) = frame else {
            return Err(SessionError::UnexpectedFrame("positions"));
        };

        for payload in self.decode_items::<PositionPayload>(push.data) {
            match codec::decode_position(&payload, self.ctx.gateway_name()) {
                Ok(position) => self.events.emit(GatewayEvent::Position(position)),
                Err(e) => self.log(
                    LogLevel::Warn,
                    format!("Skipping position {}: {e}", payload.inst_id),
                ),
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Business handlers
    // -------------------------------------------------------------------------

    fn on_orders_algo(&mut self, frame: InboundFrame) -> Result<(), SessionError> {
        let InboundFrame::Push(push) = frame else {
            return Err(SessionError::UnexpectedFrame("orders-algo"));
        };

        for payload in self.decode_items::<AlgoOrderPayload>(push.data) {
            if let Err(e) = reconcile::apply_algo_update(&self.ctx, self.events.as_ref(), &payload)
            {
                self.log(
                    LogLevel::Warn,
                    format!("Skipping algo order update {}: {e}", payload.algo_id),
                );
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Public handlers
    // -------------------------------------------------------------------------

    fn on_tickers(&mut self, frame: InboundFrame) -> Result<(), SessionError> {
        let InboundFrame::Push(push) = frame else {
            return Err(SessionError::UnexpectedFrame("tickers"));
        };

        for payload in self.decode_items::<TickerPayload>(push.data) {
            let symbol = push.arg.inst_id.as_deref().unwrap_or(&payload.inst_id);
            if let Some(tick) = self.ticks.get_mut(symbol) {
                codec::apply_ticker(tick, &payload)?;
            }
        }
        Ok(())
    }

    fn on_books5(&mut self, frame: InboundFrame) -> Result<(), SessionError> {
        let InboundFrame::Push(push) = frame else {
            return Err(SessionError::UnexpectedFrame("books5"));
        };

        for payload in self.decode_items::<BookPayload>(push.data) {
            let symbol = push.arg.inst_id.as_deref().unwrap_or(&payload.inst_id);
            let Some(tick) = self.ticks.get_mut(symbol) else {
                continue;
            };
            codec::apply_book(tick, &payload)?;
            self.events.emit(GatewayEvent::Tick(Box::new(tick.clone())));
        }
        Ok(())
    }
}

fn market_data_args(symbol: &str) -> Vec<ChannelArg> {
    vec![
        ChannelArg::with_inst_id("tickers", symbol),
        ChannelArg::with_inst_id("books5", symbol),
    ]
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::time::Duration;

    use parking_lot::Mutex;
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::trading::{
        Direction, Exchange, OrderRequest, OrderType, Status,
    };
    use crate::infrastructure::okx::auth::Credentials;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<GatewayEvent>>);

    impl EventSink for RecordingSink {
        fn emit(&self, event: GatewayEvent) {
            self.0.lock().push(event);
        }
    }

    impl RecordingSink {
        fn events(&self) -> Vec<GatewayEvent> {
            self.0.lock().clone()
        }
    }

    #[derive(Default)]
    struct RecordingFrames(Mutex<Vec<OutboundFrame>>);

    impl FrameSink for RecordingFrames {
        fn send_frame(&self, frame: OutboundFrame) -> Result<(), TransportError> {
            self.0.lock().push(frame);
            Ok(())
        }
    }

    impl RecordingFrames {
        fn texts(&self) -> Vec<serde_json::Value> {
            self.0
                .lock()
                .iter()
                .filter_map(|frame| match frame {
                    OutboundFrame::Text(text) => serde_json::from_str(text).ok(),
                    OutboundFrame::Ping => None,
                })
                .collect()
        }

        fn pings(&self) -> usize {
            self.0
                .lock()
                .iter()
                .filter(|frame| **frame == OutboundFrame::Ping)
                .count()
        }
    }

    fn signer() -> RequestSigner {
        RequestSigner::new(Credentials::new("key", "secret", "pass").unwrap(), false)
    }

    fn setup(kind: ChannelKind) -> (ChannelSession, Arc<RecordingSink>, Arc<RecordingFrames>) {
        let ctx = Arc::new(GatewayContext::new("OKX", now_reporting()));
        let events = Arc::new(RecordingSink::default());
        let frames = Arc::new(RecordingFrames::default());
        let hb = HeartbeatConfig::default();
        let session = match kind {
            ChannelKind::Public => ChannelSession::public(ctx, events.clone(), hb),
            ChannelKind::Private => ChannelSession::private(ctx, events.clone(), signer(), hb),
            ChannelKind::Business => ChannelSession::business(ctx, events.clone(), signer(), hb),
        };
        (session, events, frames)
    }

    fn login_ok(session: &mut ChannelSession) {
        session.on_frame(r#"{"event":"login","code":"0","msg":""}"#);
    }

    #[test]
    fn public_session_is_ready_on_connect() {
        let (mut session, _, frames) = setup(ChannelKind::Public);
        session.on_connected(frames.clone()).unwrap();

        assert_eq!(session.state(), SessionState::Ready);
        assert!(frames.texts().is_empty());
    }

    #[test]
    fn public_session_replays_subscriptions_on_every_connect() {
        let (mut session, _, frames) = setup(ChannelKind::Public);
        session.subscribe(SubscribeRequest::new("ETH-USDT", Exchange::Okx)).unwrap();
        session.subscribe(SubscribeRequest::new("BTC-USDT", Exchange::Okx)).unwrap();
        session.subscribe(SubscribeRequest::new("BTC-USDT", Exchange::Okx)).unwrap();
        assert!(frames.texts().is_empty());

        session.on_connected(frames.clone()).unwrap();
        session.on_disconnected();
        session.on_connected(frames.clone()).unwrap();

        let sent = frames.texts();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
        let args = sent[0]["args"].as_array().unwrap();
        assert_eq!(args.len(), 4);
        assert_eq!(args[0]["channel"], "tickers");
        assert_eq!(args[0]["instId"], "BTC-USDT");
        assert_eq!(args[3]["channel"], "books5");
        assert_eq!(args[3]["instId"], "ETH-USDT");
    }

    #[test]
    fn subscribe_while_ready_sends_immediately() {
        let (mut session, _, frames) = setup(ChannelKind::Public);
        session.on_connected(frames.clone()).unwrap();
        session.subscribe(SubscribeRequest::new("BTC-USDT", Exchange::Okx)).unwrap();

        let sent = frames.texts();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["op"], "subscribe");
        let channels: Vec<_> = sent[0]["args"]
            .as_array()
            .unwrap()
            .iter()
            .map(|arg| (arg["channel"].as_str().unwrap(), arg["instId"].as_str().unwrap()))
            .collect();
        assert_eq!(channels, vec![("tickers", "BTC-USDT"), ("books5", "BTC-USDT")]);
        assert!(session.tick("BTC-USDT").is_some());
    }

    #[test]
    fn private_session_logs_in_then_subscribes() {
        let (mut session, _, frames) = setup(ChannelKind::Private);
        session.on_connected(frames.clone()).unwrap();

        assert_eq!(session.state(), SessionState::Authenticating);
        assert_eq!(frames.texts()[0]["op"], "login");

        login_ok(&mut session);

        assert!(session.is_ready());
        let sub = &frames.texts()[1];
        assert_eq!(sub["op"], "subscribe");
        assert_eq!(
            sub["args"],
            serde_json::json!([
                {"channel": "orders", "instType": "ANY"},
                {"channel": "account"},
                {"channel": "positions", "instType": "ANY"}
            ])
        );
    }

    #[test]
    fn business_session_subscribes_algo_orders() {
        let (mut session, _, frames) = setup(ChannelKind::Business);
        session.on_connected(frames.clone()).unwrap();
        login_ok(&mut session);

        assert_eq!(
            frames.texts()[1]["args"],
            serde_json::json!([{"channel": "orders-algo", "instType": "ANY"}])
        );
    }

    #[test]
    fn failed_login_is_logged_and_not_ready() {
        let (mut session, events, frames) = setup(ChannelKind::Private);
        session.on_connected(frames.clone()).unwrap();
        session.on_frame(r#"{"event":"login","code":60009,"msg":"Login failed."}"#);

        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(frames.texts().len(), 1);
        assert!(matches!(
            events.events().last(),
            Some(GatewayEvent::Log(record)) if record.level == LogLevel::Error
        ));
    }

    #[test]
    fn requests_require_ready() {
        let (mut session, _, frames) = setup(ChannelKind::Private);
        session.on_connected(frames).unwrap();

        let result = session.cancel(CancelArgs {
            inst_id: "BTC-USDT".to_string(),
            cl_ord_id: Some("L1".to_string()),
            ord_id: None,
        });
        assert!(matches!(result, Err(SessionError::NotReady(ChannelKind::Private))));
    }

    #[test]
    fn keepalive_pings_on_cadence_and_clears_on_bare_pong() {
        let (mut session, _, frames) = setup(ChannelKind::Public);
        let start = Instant::now();
        assert_eq!(session.on_timer(start), TimerOutcome::Idle);

        session.on_connected(frames.clone()).unwrap();
        assert_eq!(session.on_timer(start), TimerOutcome::Pinged);
        assert!(session.is_awaiting_pong());
        assert_eq!(session.on_timer(start + Duration::from_secs(5)), TimerOutcome::Idle);

        session.on_frame("pong");
        assert!(!session.is_awaiting_pong());
        assert_eq!(
            session.on_timer(start + Duration::from_secs(10)),
            TimerOutcome::Pinged
        );
        assert_eq!(frames.pings(), 2);
    }

    #[test]
    fn unanswered_pings_time_out() {
        let (mut session, _, frames) = setup(ChannelKind::Public);
        let start = Instant::now();
        session.on_connected(frames).unwrap();
        session.on_timer(start);

        assert_eq!(
            session.on_timer(start + Duration::from_secs(31)),
            TimerOutcome::Timeout
        );
    }

    #[test]
    fn envelope_rejection_rejects_pending_order() {
        let (mut session, events, frames) = setup(ChannelKind::Private);
        session.on_connected(frames).unwrap();
        login_ok(&mut session);

        let req = OrderRequest {
            symbol: "BTC-USDT".to_string(),
            exchange: Exchange::Okx,
            direction: Direction::Long,
            order_type: OrderType::Limit,
            volume: Decimal::ONE,
            price: Decimal::from_str("30000").unwrap(),
            offset: None,
            reference: String::new(),
        };
        let order = req.create_order("L1", "OKX", now_reporting());
        let args = codec::encode_place_order(&req, "L1", crate::domain::contracts::TradeMode::Cash)
            .unwrap();
        let id = session.send_order(order, args).unwrap();
        assert_eq!(session.pending_requests(), 1);

        session.on_frame(&format!(
            r#"{{"id":"{id}","op":"order","code":"60013","msg":"Invalid args","data":[]}}"#
        ));

        assert_eq!(session.pending_requests(), 0);
        let rejected: Vec<_> = events
            .events()
            .iter()
            .filter_map(GatewayEvent::as_order)
            .cloned()
            .collect();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].order_id, "L1");
        assert_eq!(rejected[0].status, Status::Rejected);
    }

    #[test]
    fn books5_push_emits_tick_copy() {
        let (mut session, events, frames) = setup(ChannelKind::Public);
        session.subscribe(SubscribeRequest::new("BTC-USDT", Exchange::Okx)).unwrap();
        session.on_connected(frames).unwrap();

        session.on_frame(
            r#"{"arg":{"channel":"tickers","instId":"BTC-USDT"},
                "data":[{"instId":"BTC-USDT","last":"100","open24h":"90","high24h":"110","low24h":"80","vol24h":"5"}]}"#,
        );
        assert!(events.events().is_empty());

        session.on_frame(
            r#"{"arg":{"channel":"books5","instId":"BTC-USDT"},
                "data":[{"bids":[["99","1","0","1"]],"asks":[["101","2","0","1"]],"ts":"1697610000000"}]}"#,
        );

        let ticks: Vec<_> = events
            .events()
            .into_iter()
            .filter_map(|event| match event {
                GatewayEvent::Tick(tick) => Some(*tick),
                _ => None,
            })
            .collect();
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].last_price, Decimal::from(100));
        assert_eq!(ticks[0].bids[0].price, Decimal::from(99));
        assert_eq!(ticks[0].asks[0].volume, Decimal::from(2));
    }

    #[test]
    fn unrouted_frames_are_dropped_quietly() {
        let (mut session, events, frames) = setup(ChannelKind::Public);
        session.on_connected(frames).unwrap();

        session.on_frame(r#"{"arg":{"channel":"orders","instType":"ANY"},"data":[]}"#);
        session.on_frame(r#"{"arg":{"channel":"funding-rate"},"data":[]}"#);
        session.on_frame("garbage");

        assert!(events.events().is_empty());
    }

    #[test]
    fn account_push_emits_per_currency() {
        let (mut session, events, frames) = setup(ChannelKind::Private);
        session.on_connected(frames).unwrap();
        login_ok(&mut session);

        session.on_frame(
            r#"{"arg":{"channel":"account"},"data":[{"details":[
                {"ccy":"USDT","eq":"100","availEq":"60"},{"ccy":"BTC","eq":"1","availEq":""}]}]}"#,
        );

        let accounts: Vec<_> = events
            .events()
            .into_iter()
            .filter_map(|event| match event {
                GatewayEvent::Account(account) => Some(account),
                _ => None,
            })
            .collect();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].frozen, Decimal::from(40));
    }

    #[test]
    fn malformed_balance_is_skipped_and_logged() {
        let (mut session, events, frames) = setup(ChannelKind::Private);
        session.on_connected(frames).unwrap();
        login_ok(&mut session);

        session.on_frame(
            r#"{"arg":{"channel":"account"},"data":[{"details":[
                {"ccy":"USDT","eq":"100","availEq":"60"},
                {"ccy":"BTC","eq":"n/a","availEq":"1"},
                {"ccy":"ETH","eq":"3","availEq":"3"}]}]}"#,
        );

        let events = events.events();
        let currencies: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                GatewayEvent::Account(account) => Some(account.account_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(currencies, vec!["USDT", "ETH"]);
        assert!(events.iter().any(|event| matches!(
            event,
            GatewayEvent::Log(record) if record.level == LogLevel::Warn && record.msg.contains("BTC")
        )));
    }

    #[test]
    fn malformed_position_is_skipped_and_logged() {
        let (mut session, events, frames) = setup(ChannelKind::Private);
        session.on_connected(frames).unwrap();
        login_ok(&mut session);

        session.on_frame(
            r#"{"arg":{"channel":"positions","instType":"ANY"},"data":[
                {"instId":"BTC-USDT-SWAP","pos":"bad","avgPx":"30000","upl":"0"},
                {"instId":"ETH-USDT-SWAP","pos":"-2","avgPx":"2000","upl":"1.5"}]}"#,
        );

        let events = events.events();
        let positions: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                GatewayEvent::Position(position) => Some(position),
                _ => None,
            })
            .collect();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].symbol, "ETH-USDT-SWAP");
        assert_eq!(positions[0].volume, Decimal::from(-2));
        assert!(events.iter().any(|event| matches!(
            event,
            GatewayEvent::Log(record) if record.level == LogLevel::Warn
                && record.msg.contains("BTC-USDT-SWAP")
        )));
    }

    #[test]
    fn disconnect_blocks_sends() {
        let (mut session, _, frames) = setup(ChannelKind::Private);
        session.on_connected(frames).unwrap();
        login_ok(&mut session);
        session.on_error(TransportFault::Read, "connection reset");

        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(
            session.cancel_batch(vec![]),
            Err(SessionError::NotReady(_))
        ));
    }
}
