//! Order Router
//!
//! Picks the channel that carries each order and cancel.
//!
//! | Request | Carrier |
//! |---------|---------|
//! | regular order | private WebSocket `order` op |
//! | stop order | REST `POST /api/v5/trade/order-algo` |
//! | regular cancel | private WebSocket `cancel-order` / `batch-cancel-orders` |
//! | stop cancel | REST `POST /api/v5/trade/cancel-algos` |
//!
//! Every submit records a `Submitting` order and returns its
//! `gateway.local_id` at once; the venue's verdict arrives later through the
//! channel handlers or the REST acknowledgement.

use std::sync::Arc;

use parking_lot::Mutex;

use super::rest_worker::RestWorker;
use crate::application::ports::{EventSink, HttpMethod, RestResponse, RestTransport};
use crate::domain::context::GatewayContext;
use crate::domain::events::LogLevel;
use crate::domain::identifiers::IdSpace;
use crate::domain::trading::{CancelRequest, Order, OrderRequest, OrderType, now_reporting};
use crate::infrastructure::metrics::{self, OrderRoute, RejectKind};
use crate::infrastructure::okx::codec::{self, CodecError};
use crate::infrastructure::okx::messages::{
    AckItem, AlgoOrderArgs, CancelAlgoArgs, CancelArgs, RestEnvelope,
};
use crate::infrastructure::okx::reconcile;
use crate::infrastructure::okx::session::{ChannelSession, SessionError};

/// Most cancels carried by one `batch-cancel-orders` frame.
pub const BATCH_CANCEL_LIMIT: usize = 15;

/// Conditional order placement.
pub const ORDER_ALGO_PATH: &str = "/api/v5/trade/order-algo";

/// Conditional order cancellation.
pub const CANCEL_ALGOS_PATH: &str = "/api/v5/trade/cancel-algos";

/// Router errors.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// No contract is cached for the symbol.
    #[error("symbol not found: {0}")]
    UnknownContract(String),

    /// The request cannot be expressed on the wire.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The private channel refused the frame.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Routes orders and cancels to the WebSocket or REST carrier.
pub struct OrderRouter {
    ctx: Arc<GatewayContext>,
    events: Arc<dyn EventSink>,
    private: Arc<Mutex<ChannelSession>>,
    rest: Arc<dyn RestTransport>,
    worker: RestWorker,
}

impl OrderRouter {
    /// Create a router over the private session and the REST transport.
    #[must_use]
    pub fn new(
        ctx: Arc<GatewayContext>,
        events: Arc<dyn EventSink>,
        private: Arc<Mutex<ChannelSession>>,
        rest: Arc<dyn RestTransport>,
        worker: RestWorker,
    ) -> Self {
        Self {
            ctx,
            events,
            private,
            rest,
            worker,
        }
    }

    /// Worker running this router's REST calls.
    #[must_use]
    pub const fn worker(&self) -> &RestWorker {
        &self.worker
    }

    fn log(&self, level: LogLevel, msg: String) {
        reconcile::write_log(self.events.as_ref(), self.ctx.gateway_name(), level, msg);
    }

    // -------------------------------------------------------------------------
    // Submit
    // -------------------------------------------------------------------------

    /// Submit an order and return its `gateway.local_id`.
    ///
    /// A send failure after the id is minted is reported as a `Rejected`
    /// order, not as an error.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::UnknownContract` for uncached symbols and
    /// `RouterError::Codec` for directions or types the venue cannot take.
    pub fn submit(&self, req: &OrderRequest) -> Result<String, RouterError> {
        let (Some(contract), Some(mode)) = (
            self.ctx.contracts.get(&req.symbol),
            self.ctx.contracts.trade_mode(&req.symbol),
        ) else {
            self.log(
                LogLevel::Error,
                format!("Order failed, symbol not found: {}", req.symbol),
            );
            return Err(RouterError::UnknownContract(req.symbol.clone()));
        };

        let local = self.ctx.allocator.allocate();
        let order = req.create_order(&local, self.ctx.gateway_name(), now_reporting());
        let vt_orderid = order.vt_orderid();

        if req.order_type == OrderType::Stop {
            let args = codec::encode_algo_order(req, &local, mode, contract.product)?;
            self.ctx.registry.mark_local_origin(&local);
            let submitted = reconcile::publish_order(&self.ctx, self.events.as_ref(), order);
            metrics::record_order_submitted(OrderRoute::RestAlgo);
            self.spawn_algo_order(submitted, args);
            return Ok(vt_orderid);
        }

        let args = codec::encode_place_order(req, &local, mode)?;
        self.ctx.registry.mark_local_origin(&local);
        let submitted = reconcile::publish_order(&self.ctx, self.events.as_ref(), order);
        metrics::record_order_submitted(OrderRoute::WebSocket);

        let sent = self.private.lock().send_order(submitted.clone(), args);
        if let Err(e) = sent {
            self.log(LogLevel::Error, format!("Order {local} not sent: {e}"));
            reconcile::reject_order(&self.ctx, self.events.as_ref(), submitted, RejectKind::Local);
        }
        Ok(vt_orderid)
    }

    fn spawn_algo_order(&self, order: Order, args: AlgoOrderArgs) {
        let ctx = Arc::clone(&self.ctx);
        let events = Arc::clone(&self.events);
        let rest = Arc::clone(&self.rest);

        self.worker.spawn(async move {
            let body = match serde_json::to_value(&args) {
                Ok(body) => body,
                Err(e) => {
                    reject_locally(&ctx, events.as_ref(), order, &e.to_string());
                    return;
                }
            };

            match rest
                .send_signed_request(HttpMethod::Post, ORDER_ALGO_PATH, &[], Some(body))
                .await
            {
                Ok(resp) => apply_algo_ack(&ctx, events.as_ref(), order, &resp),
                Err(e) => reject_locally(&ctx, events.as_ref(), order, &e.to_string()),
            }
        });
    }

    // -------------------------------------------------------------------------
    // Cancel
    // -------------------------------------------------------------------------

    /// Cancel one order.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Session` if the private channel is not ready.
    pub fn cancel(&self, req: &CancelRequest) -> Result<(), RouterError> {
        if self.is_stop(&req.order_id) {
            self.cancel_stop(req);
            return Ok(());
        }

        let args = self.cancel_args(req);
        let sent = self.private.lock().cancel(args);
        if let Err(e) = sent {
            self.log(
                LogLevel::Error,
                format!("Cancel of {} not sent: {e}", req.order_id),
            );
            return Err(e.into());
        }
        Ok(())
    }

    /// Cancel several orders; regular cancels go out in batches of at most
    /// [`BATCH_CANCEL_LIMIT`], in input order.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Session` on the first batch the private channel
    /// refuses.
    pub fn cancel_batch(&self, reqs: &[CancelRequest]) -> Result<(), RouterError> {
        let mut regular = Vec::with_capacity(reqs.len());
        for req in reqs {
            if self.is_stop(&req.order_id) {
                self.cancel_stop(req);
            } else {
                regular.push(self.cancel_args(req));
            }
        }

        for chunk in chunk_cancel_args(regular) {
            let sent = self.private.lock().cancel_batch(chunk);
            if let Err(e) = sent {
                self.log(LogLevel::Error, format!("Batch cancel not sent: {e}"));
                return Err(e.into());
            }
        }
        Ok(())
    }

    fn is_stop(&self, order_id: &str) -> bool {
        self.ctx
            .orders
            .get(order_id)
            .is_some_and(|order| order.is_stop())
    }

    fn cancel_args(&self, req: &CancelRequest) -> CancelArgs {
        if self.ctx.registry.is_local_origin(&req.order_id) {
            return CancelArgs {
                inst_id: req.symbol.clone(),
                cl_ord_id: Some(req.order_id.clone()),
                ord_id: None,
            };
        }

        let ord_id = self
            .ctx
            .registry
            .resolve_remote(&req.order_id, IdSpace::Regular)
            .unwrap_or_else(|| req.order_id.clone());
        CancelArgs {
            inst_id: req.symbol.clone(),
            cl_ord_id: None,
            ord_id: Some(ord_id),
        }
    }

    fn cancel_stop(&self, req: &CancelRequest) {
        let Some(algo_id) = self
            .ctx
            .registry
            .resolve_remote(&req.order_id, IdSpace::Stop)
        else {
            self.log(
                LogLevel::Warn,
                format!("Stop order {} has no venue id yet, cancel ignored", req.order_id),
            );
            return;
        };

        let body = match serde_json::to_value(vec![CancelAlgoArgs {
            inst_id: req.symbol.clone(),
            algo_id,
        }]) {
            Ok(body) => body,
            Err(e) => {
                self.log(LogLevel::Error, format!("Stop cancel not encoded: {e}"));
                return;
            }
        };

        let ctx = Arc::clone(&self.ctx);
        let events = Arc::clone(&self.events);
        let rest = Arc::clone(&self.rest);
        let order_id = req.order_id.clone();

        self.worker.spawn(async move {
            let result = rest
                .send_signed_request(HttpMethod::Post, CANCEL_ALGOS_PATH, &[], Some(body))
                .await;
            let failure = match result {
                Ok(resp) => cancel_failure(&resp),
                Err(e) => Some(e.to_string()),
            };
            if let Some(reason) = failure {
                reconcile::write_log(
                    events.as_ref(),
                    ctx.gateway_name(),
                    LogLevel::Error,
                    format!("Stop cancel of {order_id} failed: {reason}"),
                );
            }
        });
    }
}

/// Split cancels into `batch-cancel-orders` frames, keeping input order.
#[must_use]
pub fn chunk_cancel_args(args: Vec<CancelArgs>) -> Vec<Vec<CancelArgs>> {
    args.chunks(BATCH_CANCEL_LIMIT).map(<[_]>::to_vec).collect()
}

fn reject_locally(ctx: &GatewayContext, events: &dyn EventSink, order: Order, reason: &str) {
    reconcile::write_log(
        events,
        ctx.gateway_name(),
        LogLevel::Error,
        format!("Stop order {} not sent: {reason}", order.order_id),
    );
    reconcile::reject_order(ctx, events, order, RejectKind::Local);
}

/// Apply the response of an `order-algo` request.
fn apply_algo_ack(ctx: &GatewayContext, events: &dyn EventSink, order: Order, resp: &RestResponse) {
    let envelope = match resp.json::<RestEnvelope<AckItem>>() {
        Ok(envelope) => envelope,
        Err(e) => {
            reconcile::write_log(
                events,
                ctx.gateway_name(),
                LogLevel::Error,
                format!(
                    "Stop order request failed, status: {}, error: {e}",
                    resp.status
                ),
            );
            reconcile::reject_order(ctx, events, order, RejectKind::Envelope);
            return;
        }
    };

    if !envelope.code.is_success() && envelope.data.is_empty() {
        reconcile::write_log(
            events,
            ctx.gateway_name(),
            LogLevel::Error,
            format!(
                "Stop order request failed, code: {}, message: {}",
                envelope.code, envelope.msg
            ),
        );
        reconcile::reject_order(ctx, events, order, RejectKind::Envelope);
        return;
    }

    reconcile::apply_place_acks(ctx, events, &envelope.data, true);
}

fn cancel_failure(resp: &RestResponse) -> Option<String> {
    match resp.json::<RestEnvelope<AckItem>>() {
        Ok(envelope) if envelope.code.is_success() => None,
        Ok(envelope) => {
            let detail = envelope
                .data
                .iter()
                .find(|item| !item.s_code.is_success())
                .map_or(envelope.msg.as_str(), |item| item.s_msg.as_str());
            Some(format!("code: {}, message: {detail}", envelope.code))
        }
        Err(e) => Some(format!("status: {}, error: {e}", resp.status)),
    }
}
