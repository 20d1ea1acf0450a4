//! OKX Gateway
//!
//! Facade the trading engine talks to. Owns the shared context, the three
//! channel sessions and their drivers, the order router, the history fetcher
//! and the reference-data bootstrap.
//!
//! # Channels
//!
//! | Session | Carries |
//! |---------|---------|
//! | public | `tickers`, `books5` |
//! | private | `orders`, `account`, `positions`, order and cancel ops |
//! | business | `orders-algo` |
//!
//! The gateway does not run its own clock: the host calls
//! [`OkxGateway::on_timer`] about once a second to drive the keep-alive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::bootstrap::ReferenceBootstrap;
use super::history::HistoryFetcher;
use super::rest_worker::RestWorker;
use super::router::OrderRouter;
use crate::application::ports::{EventSink, RestTransport};
use crate::domain::context::GatewayContext;
use crate::domain::events::LogLevel;
use crate::domain::trading::{
    Bar, CancelRequest, HistoryRequest, OrderRequest, SubscribeRequest, now_reporting,
};
use crate::error::GatewayError;
use crate::infrastructure::config::{GatewayConfig, Server};
use crate::infrastructure::okx::{
    ChannelKind, ChannelSession, HeartbeatConfig, OkxRestClient, ReconnectConfig, RequestSigner,
    TimerOutcome, WsChannelDriver, reconcile,
};

/// WebSocket URLs of the three channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEndpoints {
    /// Public channel.
    pub public: String,
    /// Private channel.
    pub private: String,
    /// Business channel.
    pub business: String,
}

impl ChannelEndpoints {
    /// Endpoints of `server`.
    #[must_use]
    pub fn for_server(server: Server) -> Self {
        Self {
            public: server.public_ws_url().to_string(),
            private: server.private_ws_url().to_string(),
            business: server.business_ws_url().to_string(),
        }
    }

    fn url(&self, kind: ChannelKind) -> &str {
        match kind {
            ChannelKind::Public => &self.public,
            ChannelKind::Private => &self.private,
            ChannelKind::Business => &self.business,
        }
    }
}

/// OKX market access gateway.
pub struct OkxGateway {
    ctx: Arc<GatewayContext>,
    events: Arc<dyn EventSink>,
    public: Arc<Mutex<ChannelSession>>,
    private: Arc<Mutex<ChannelSession>>,
    business: Arc<Mutex<ChannelSession>>,
    router: OrderRouter,
    history: HistoryFetcher,
    bootstrap: Arc<ReferenceBootstrap>,
    worker: RestWorker,
    endpoints: ChannelEndpoints,
    reconnect: ReconnectConfig,
    drivers: Mutex<HashMap<ChannelKind, Arc<WsChannelDriver>>>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl OkxGateway {
    /// Build a gateway over `rest`. Nothing connects until
    /// [`connect`](Self::connect).
    #[must_use]
    pub fn new(
        config: &GatewayConfig,
        rest: Arc<dyn RestTransport>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let ctx = Arc::new(GatewayContext::new(
            config.gateway_name.clone(),
            now_reporting(),
        ));
        let signer = RequestSigner::new(config.credentials.clone(), config.server.is_simulated());
        let heartbeat = HeartbeatConfig::from_websocket_settings(&config.websocket);

        let public = Arc::new(Mutex::new(ChannelSession::public(
            Arc::clone(&ctx),
            Arc::clone(&events),
            heartbeat,
        )));
        let private = Arc::new(Mutex::new(ChannelSession::private(
            Arc::clone(&ctx),
            Arc::clone(&events),
            signer.clone(),
            heartbeat,
        )));
        let business = Arc::new(Mutex::new(ChannelSession::business(
            Arc::clone(&ctx),
            Arc::clone(&events),
            signer,
            heartbeat,
        )));

        let worker = RestWorker::new(config.rest.concurrency);
        let router = OrderRouter::new(
            Arc::clone(&ctx),
            Arc::clone(&events),
            Arc::clone(&private),
            Arc::clone(&rest),
            worker.clone(),
        );
        let history = HistoryFetcher::new(
            config.gateway_name.clone(),
            Arc::clone(&events),
            Arc::clone(&rest),
        );
        let bootstrap = Arc::new(ReferenceBootstrap::new(
            Arc::clone(&ctx),
            Arc::clone(&events),
            rest,
        ));

        Self {
            ctx,
            events,
            public,
            private,
            business,
            router,
            history,
            bootstrap,
            worker,
            endpoints: ChannelEndpoints::for_server(config.server),
            reconnect: ReconnectConfig::from_websocket_settings(&config.websocket),
            drivers: Mutex::new(HashMap::new()),
            tasks: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Build a gateway with the `reqwest` REST client.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::RestClient` if the HTTP client cannot be built.
    pub fn from_config(
        config: &GatewayConfig,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, GatewayError> {
        let rest = Arc::new(OkxRestClient::from_config(config)?);
        Ok(Self::new(config, rest, events))
    }

    /// Shared identifier, order and contract state.
    #[must_use]
    pub fn context(&self) -> Arc<GatewayContext> {
        Arc::clone(&self.ctx)
    }

    /// Session of one channel.
    #[must_use]
    pub fn session(&self, kind: ChannelKind) -> Arc<Mutex<ChannelSession>> {
        Arc::clone(match kind {
            ChannelKind::Public => &self.public,
            ChannelKind::Private => &self.private,
            ChannelKind::Business => &self.business,
        })
    }

    /// WebSocket endpoints in use.
    #[must_use]
    pub const fn endpoints(&self) -> &ChannelEndpoints {
        &self.endpoints
    }

    fn log(&self, level: LogLevel, msg: String) {
        reconcile::write_log(self.events.as_ref(), self.ctx.gateway_name(), level, msg);
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Start the three channel drivers and load reference data.
    ///
    /// Must be called inside a Tokio runtime. A second call is ignored.
    pub fn connect(&self) {
        let mut drivers = self.drivers.lock();
        if !drivers.is_empty() {
            tracing::warn!("Gateway already connected");
            return;
        }

        self.ctx.allocator.set_connect_time(now_reporting());

        for kind in [ChannelKind::Public, ChannelKind::Private, ChannelKind::Business] {
            let driver = Arc::new(WsChannelDriver::new(
                self.endpoints.url(kind).to_string(),
                self.session(kind),
                self.reconnect.clone(),
                self.cancel.child_token(),
            ));
            let runner = Arc::clone(&driver);
            self.tasks.spawn(async move {
                if let Err(e) = runner.run().await {
                    tracing::error!(channel = %kind, error = %e, "Channel driver stopped");
                }
            });
            drivers.insert(kind, driver);
        }
        drop(drivers);

        let bootstrap = Arc::clone(&self.bootstrap);
        self.worker.spawn(async move {
            bootstrap.run().await;
        });

        self.log(LogLevel::Info, "Gateway connecting".to_string());
    }

    /// Ping every live channel; reconnect channels whose pong is overdue.
    pub fn on_timer(&self, now: Instant) {
        for kind in [ChannelKind::Public, ChannelKind::Private, ChannelKind::Business] {
            let outcome = self.session(kind).lock().on_timer(now);
            if outcome == TimerOutcome::Timeout
                && let Some(driver) = self.drivers.lock().get(&kind)
            {
                driver.request_reconnect();
            }
        }
    }

    /// Stop the drivers and wait for outstanding REST work.
    pub async fn close(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        self.worker.shutdown().await;
        self.drivers.lock().clear();
        self.log(LogLevel::Info, "Gateway closed".to_string());
    }

    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------

    /// Subscribe tickers and five-level depth for a symbol.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Session` if the subscribe frame cannot be sent.
    pub fn subscribe(&self, req: SubscribeRequest) -> Result<(), GatewayError> {
        self.public.lock().subscribe(req)?;
        Ok(())
    }

    /// Submit an order and return its `gateway.local_id`.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Router` for unknown contracts or unmappable
    /// requests.
    pub fn send_order(&self, req: &OrderRequest) -> Result<String, GatewayError> {
        Ok(self.router.submit(req)?)
    }

    /// Cancel one order.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Router` if the cancel frame cannot be sent.
    pub fn cancel_order(&self, req: &CancelRequest) -> Result<(), GatewayError> {
        Ok(self.router.cancel(req)?)
    }

    /// Cancel several orders.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Router` if a batch frame cannot be sent.
    pub fn cancel_orders(&self, reqs: &[CancelRequest]) -> Result<(), GatewayError> {
        Ok(self.router.cancel_batch(reqs)?)
    }

    /// Fetch candle history.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::History` if the interval cannot be expressed.
    pub async fn query_history(&self, req: &HistoryRequest) -> Result<Vec<Bar>, GatewayError> {
        Ok(self.history.query_history(req).await?)
    }
}
