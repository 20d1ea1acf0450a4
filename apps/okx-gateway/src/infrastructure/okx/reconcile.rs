//! Order Reconciliation
//!
//! Merges order reports from the private channel, the business channel and
//! REST responses into the shared identifier registry and order cache, then
//! emits the merged result.
//!
//! # Local Id Resolution
//!
//! | Report | Local id | Binding |
//! |--------|----------|---------|
//! | regular order with `clOrdId` | `clOrdId` | `clOrdId → ordId`, local origin |
//! | regular order without `clOrdId` | `ordId` | `ordId → ordId` |
//! | child of a triggered algo | local id bound to `algoId` | none |
//! | algo order with `algoClOrdId` | `algoClOrdId` | `algoClOrdId → algoId` (stop), local origin |
//! | algo order without `algoClOrdId` | `algoId` | `algoId → algoId` (stop) |
//!
//! Bindings are recorded only once a report decodes. Working-order snapshots
//! go through [`apply_order_snapshot`], which never emits a trade.

use super::codec::{self, CodecError};
use super::messages::{AckItem, AlgoOrderPayload, OrderPayload};
use crate::application::ports::EventSink;
use crate::domain::context::GatewayContext;
use crate::domain::events::{GatewayEvent, LogLevel, LogRecord};
use crate::domain::identifiers::IdSpace;
use crate::domain::trading::{Order, Status};
use crate::infrastructure::metrics::{self, RejectKind};

/// Algo state reported once the trigger fires; the child order carries on.
const ALGO_EFFECTIVE: &str = "effective";

/// Record a gateway diagnostic in the trace log and on the event stream.
pub fn write_log(events: &dyn EventSink, gateway_name: &str, level: LogLevel, msg: String) {
    match level {
        LogLevel::Info => tracing::info!(gateway = gateway_name, "{msg}"),
        LogLevel::Warn => tracing::warn!(gateway = gateway_name, "{msg}"),
        LogLevel::Error => tracing::error!(gateway = gateway_name, "{msg}"),
    }
    events.emit(GatewayEvent::Log(LogRecord {
        level,
        msg,
        gateway_name: gateway_name.to_string(),
    }));
}

/// Bind `local ↔ remote`, logging instead of failing on a conflicting pair.
pub fn bind_ids(ctx: &GatewayContext, local: &str, remote: &str, space: IdSpace) {
    if let Err(e) = ctx.registry.bind(local, remote, space) {
        tracing::warn!(error = %e, "Ignoring conflicting order id binding");
    }
}

/// Upsert `order` into the cache and emit the merged copy.
pub fn publish_order(ctx: &GatewayContext, events: &dyn EventSink, order: Order) -> Order {
    let merged = ctx.orders.upsert(order);
    events.emit(GatewayEvent::Order(Box::new(merged.clone())));
    merged
}

/// Mark `order` rejected, upsert it and emit a copy.
pub fn reject_order(
    ctx: &GatewayContext,
    events: &dyn EventSink,
    mut order: Order,
    kind: RejectKind,
) -> Order {
    metrics::record_order_rejected(kind);
    order.status = Status::Rejected;
    publish_order(ctx, events, order)
}

/// Local id of a regular order report and the binding it implies.
///
/// Nothing touches the registry until [`commit`](Self::commit), so a report
/// that fails to decode leaves no trace.
struct ResolvedId {
    local: String,
    remote: Option<String>,
    local_origin: bool,
}

impl ResolvedId {
    fn commit(&self, ctx: &GatewayContext) {
        if self.local_origin {
            ctx.registry.mark_local_origin(&self.local);
        }
        if let Some(remote) = &self.remote {
            bind_ids(ctx, &self.local, remote, IdSpace::Regular);
        }
    }
}

fn resolve_order_id(ctx: &GatewayContext, payload: &OrderPayload) -> ResolvedId {
    if !payload.algo_id.is_empty() {
        if let Some(local) = ctx.registry.resolve_local(&payload.algo_id, IdSpace::Stop) {
            return ResolvedId {
                local,
                remote: None,
                local_origin: false,
            };
        }
        tracing::warn!(
            algo_id = %payload.algo_id,
            ord_id = %payload.ord_id,
            "Triggered order has no bound algo id, reporting under its venue id"
        );
        return ResolvedId {
            local: payload.ord_id.clone(),
            remote: None,
            local_origin: false,
        };
    }

    if payload.cl_ord_id.is_empty() {
        return ResolvedId {
            local: payload.ord_id.clone(),
            remote: Some(payload.ord_id.clone()),
            local_origin: false,
        };
    }

    ResolvedId {
        local: payload.cl_ord_id.clone(),
        remote: Some(payload.ord_id.clone()),
        local_origin: true,
    }
}

/// Apply one regular order report: bind, upsert, emit, and emit its fill.
///
/// # Errors
///
/// Returns `CodecError` if the payload does not decode; nothing is bound or
/// emitted.
pub fn apply_order_update(
    ctx: &GatewayContext,
    events: &dyn EventSink,
    payload: &OrderPayload,
) -> Result<(), CodecError> {
    let resolved = resolve_order_id(ctx, payload);
    let order = codec::decode_order(payload, &resolved.local, ctx.gateway_name())?;
    let fill = codec::decode_fill(payload, &order)?;

    resolved.commit(ctx);
    let merged = publish_order(ctx, events, order);

    if let Some(mut trade) = fill {
        trade.offset = merged.offset;
        trade.volume = ctx.contracts.round_volume(&trade.symbol, trade.volume);
        events.emit(GatewayEvent::Trade(Box::new(trade)));
    }
    Ok(())
}

/// Apply one row of a working-order snapshot: bind, upsert and emit.
///
/// The row's latest fill was already reported when it happened, so no trade
/// is emitted.
///
/// # Errors
///
/// Returns `CodecError` if the payload does not decode; nothing is bound or
/// emitted.
pub fn apply_order_snapshot(
    ctx: &GatewayContext,
    events: &dyn EventSink,
    payload: &OrderPayload,
) -> Result<(), CodecError> {
    let resolved = resolve_order_id(ctx, payload);
    let order = codec::decode_order(payload, &resolved.local, ctx.gateway_name())?;

    resolved.commit(ctx);
    publish_order(ctx, events, order);
    Ok(())
}

/// Apply one algo order report.
///
/// Returns the merged order, or `None` when the report is suppressed
/// (`effective` state or a non-conditional algo type).
///
/// # Errors
///
/// Returns `CodecError` if the payload does not decode.
pub fn apply_algo_update(
    ctx: &GatewayContext,
    events: &dyn EventSink,
    payload: &AlgoOrderPayload,
) -> Result<Option<Order>, CodecError> {
    if payload.state == ALGO_EFFECTIVE {
        tracing::debug!(algo_id = %payload.algo_id, "Algo order triggered");
        return Ok(None);
    }

    let local = if payload.algo_cl_ord_id.is_empty() {
        &payload.algo_id
    } else {
        &payload.algo_cl_ord_id
    };

    let Some(order) = codec::decode_stop_order(payload, local, ctx.gateway_name())? else {
        tracing::debug!(ord_type = %payload.ord_type, "Ignoring non-conditional algo order");
        return Ok(None);
    };

    if !payload.algo_cl_ord_id.is_empty() {
        ctx.registry.mark_local_origin(local);
    }
    bind_ids(ctx, local, &payload.algo_id, IdSpace::Stop);
    Ok(Some(publish_order(ctx, events, order)))
}

/// Handle the per-item results of a place-order request.
///
/// `stop` selects the algo fields and the stop identifier space.
pub fn apply_place_acks(
    ctx: &GatewayContext,
    events: &dyn EventSink,
    items: &[AckItem],
    stop: bool,
) {
    for item in items {
        let (local, remote, space) = if stop {
            (&item.algo_cl_ord_id, &item.algo_id, IdSpace::Stop)
        } else {
            (&item.cl_ord_id, &item.ord_id, IdSpace::Regular)
        };

        if !local.is_empty() && !remote.is_empty() {
            bind_ids(ctx, local, remote, space);
        }

        if item.s_code.is_success() {
            continue;
        }

        write_log(
            events,
            ctx.gateway_name(),
            LogLevel::Error,
            format!(
                "Order rejected, code: {}, message: {}",
                item.s_code, item.s_msg
            ),
        );

        if let Some(order) = ctx.orders.get(local) {
            reject_order(ctx, events, order, RejectKind::Item);
        }
    }
}

/// Log the failed items of a cancel request.
pub fn log_cancel_acks(ctx: &GatewayContext, events: &dyn EventSink, items: &[AckItem]) {
    for item in items.iter().filter(|item| !item.s_code.is_success()) {
        write_log(
            events,
            ctx.gateway_name(),
            LogLevel::Error,
            format!(
                "Cancel failed, code: {}, message: {}",
                item.s_code, item.s_msg
            ),
        );
    }
}
