//! Reference Data Bootstrap
//!
//! REST queries run once per connect:
//!
//! | Step | Endpoint | Effect |
//! |------|----------|--------|
//! | clock | `GET /api/v5/public/time` | logs server and local time |
//! | contracts | `GET /api/v5/public/instruments?instType=` | caches and emits contracts |
//! | working orders | `GET /api/v5/trade/orders-pending` | binds ids, caches and emits orders |
//!
//! Contracts load before working orders so snapshot rows find their contract.
//! Snapshot rows never emit trades; their last fill was already reported. A
//! failed step is logged and the next one still runs.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::application::ports::{EventSink, HttpMethod, RestTransport};
use crate::domain::context::GatewayContext;
use crate::domain::events::{GatewayEvent, LogLevel};
use crate::domain::trading::{Product, now_reporting};
use crate::infrastructure::okx::codec;
use crate::infrastructure::okx::messages::{
    InstrumentPayload, OrderPayload, RestEnvelope, ServerTimePayload,
};
use crate::infrastructure::okx::reconcile;

/// Server clock.
pub const TIME_PATH: &str = "/api/v5/public/time";

/// Instrument metadata.
pub const INSTRUMENTS_PATH: &str = "/api/v5/public/instruments";

/// Working orders.
pub const ORDERS_PENDING_PATH: &str = "/api/v5/trade/orders-pending";

/// Counts from one bootstrap run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Contracts cached.
    pub contracts: usize,
    /// Working orders reconciled.
    pub orders: usize,
}

/// Loads reference data after connecting.
pub struct ReferenceBootstrap {
    ctx: Arc<GatewayContext>,
    events: Arc<dyn EventSink>,
    rest: Arc<dyn RestTransport>,
}

impl ReferenceBootstrap {
    /// Create a bootstrap over `rest`.
    #[must_use]
    pub fn new(
        ctx: Arc<GatewayContext>,
        events: Arc<dyn EventSink>,
        rest: Arc<dyn RestTransport>,
    ) -> Self {
        Self { ctx, events, rest }
    }

    fn log(&self, level: LogLevel, msg: String) {
        reconcile::write_log(self.events.as_ref(), self.ctx.gateway_name(), level, msg);
    }

    /// Run every step.
    pub async fn run(&self) -> BootstrapReport {
        self.query_time().await;
        let contracts = self.query_contracts().await;
        let orders = self.query_orders().await;

        tracing::info!(contracts, orders, "Reference data loaded");
        BootstrapReport { contracts, orders }
    }

    /// Log the server clock next to the local one.
    pub async fn query_time(&self) {
        let Some(envelope) = self.get::<ServerTimePayload>(TIME_PATH, &[]).await else {
            return;
        };
        let Some(item) = envelope.data.first() else {
            self.log(LogLevel::Warn, "Server time response was empty".to_string());
            return;
        };
        match codec::parse_timestamp(&item.ts) {
            Ok(server) => self.log(
                LogLevel::Info,
                format!("Server time: {server}, local time: {}", now_reporting()),
            ),
            Err(e) => self.log(LogLevel::Warn, format!("Server time malformed: {e}")),
        }
    }

    /// Cache and emit every instrument, one request per product type.
    pub async fn query_contracts(&self) -> usize {
        let mut total = 0;

        for product in Product::all() {
            let Ok(inst_type) = codec::product_to_vendor(*product) else {
                continue;
            };
            let params = [("instType".to_string(), inst_type.to_string())];
            let Some(envelope) = self
                .get::<InstrumentPayload>(INSTRUMENTS_PATH, &params)
                .await
            else {
                continue;
            };

            let mut loaded = 0;
            for payload in &envelope.data {
                match codec::decode_instrument(payload, self.ctx.gateway_name()) {
                    Ok(decoded) => {
                        if decoded.margin_spot {
                            self.ctx.contracts.mark_margin_spot(&decoded.contract.symbol);
                        }
                        self.ctx.contracts.insert(decoded.contract.clone());
                        self.events
                            .emit(GatewayEvent::Contract(Box::new(decoded.contract)));
                        loaded += 1;
                    }
                    Err(e) => {
                        tracing::warn!(inst_id = %payload.inst_id, error = %e, "Skipping instrument");
                    }
                }
            }

            self.log(
                LogLevel::Info,
                format!("{inst_type} contracts loaded: {loaded}"),
            );
            total += loaded;
        }

        total
    }

    /// Reconcile the working-order snapshot.
    pub async fn query_orders(&self) -> usize {
        let Some(envelope) = self
            .get::<OrderPayload>(ORDERS_PENDING_PATH, &[])
            .await
        else {
            return 0;
        };

        let mut applied = 0;
        for payload in &envelope.data {
            match reconcile::apply_order_snapshot(&self.ctx, self.events.as_ref(), payload) {
                Ok(()) => applied += 1,
                Err(e) => self.log(
                    LogLevel::Error,
                    format!("Working order {} skipped: {e}", payload.ord_id),
                ),
            }
        }

        self.log(LogLevel::Info, format!("Working orders loaded: {applied}"));
        applied
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Option<RestEnvelope<T>> {
        let resp = match self
            .rest
            .send_signed_request(HttpMethod::Get, path, params, None)
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                self.log(LogLevel::Error, format!("Query {path} failed: {e}"));
                return None;
            }
        };

        if !resp.is_success() {
            self.log(
                LogLevel::Error,
                format!(
                    "Query {path} failed, status: {}, body: {}",
                    resp.status, resp.body
                ),
            );
            return None;
        }

        let envelope = match resp.json::<RestEnvelope<T>>() {
            Ok(envelope) => envelope,
            Err(e) => {
                self.log(LogLevel::Error, format!("Query {path} malformed: {e}"));
                return None;
            }
        };

        if !envelope.code.is_success() {
            self.log(
                LogLevel::Error,
                format!(
                    "Query {path} refused, code: {}, msg: {}",
                    envelope.code.as_str(),
                    envelope.msg
                ),
            );
            return None;
        }

        Some(envelope)
    }
}
