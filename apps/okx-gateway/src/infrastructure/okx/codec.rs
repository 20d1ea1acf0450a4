//! OKX Wire Codec
//!
//! Classifies inbound frames, maps vendor enums through fixed bidirectional
//! tables, and converts payloads to and from the normalized trading objects.
//!
//! # Frame Classification
//!
//! A frame is classified by the first key present, in priority order:
//!
//! 1. `event`: control event (`login`, `subscribe`, `error`)
//! 2. `op`: reply to a request (`order`, `cancel-order`, ...)
//! 3. `arg`: channel push
//!
//! The bare text `pong` is a keep-alive reply and classifies exactly like
//! `{"op":"pong"}`.
//!
//! # Vendor Enums
//!
//! Unknown vendor values are decode errors, never defaults.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;

use super::messages::{
    AccountDetail, AlgoOrderArgs, AlgoOrderPayload, BookPayload, EventFrame, InstrumentPayload,
    OrderPayload, PlaceOrderArgs, PositionPayload, PushFrame, ReplyFrame, TickerPayload,
};
use crate::domain::contracts::TradeMode;
use crate::domain::trading::{
    Account, Bar, Contract, DEPTH_LEVELS, DepthLevel, Direction, Exchange, HistoryRequest,
    Interval, Order, OrderRequest, OrderType, Position, Product, Status, Tick, Trade,
    reporting_offset,
};

// =============================================================================
// Errors
// =============================================================================

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// A vendor enum value has no internal mapping.
    #[error("unknown {field} value: {value:?}")]
    UnknownEnum {
        /// Field name.
        field: &'static str,
        /// Raw vendor value.
        value: String,
    },

    /// An internal value has no vendor mapping.
    #[error("{field} value {value} cannot be sent to the venue")]
    Unmapped {
        /// Field name.
        field: &'static str,
        /// Internal value.
        value: String,
    },

    /// A numeric field did not parse.
    #[error("invalid number in {field}: {value:?}")]
    InvalidNumber {
        /// Field name.
        field: &'static str,
        /// Raw value.
        value: String,
    },

    /// A millisecond timestamp did not parse.
    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    /// The frame matched no known shape.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

// =============================================================================
// Vendor Enum Tables
// =============================================================================

const ORDER_TYPE_TABLE: &[(&str, OrderType)] = &[
    ("limit", OrderType::Limit),
    ("market", OrderType::Market),
    ("stop", OrderType::Stop),
    ("fok", OrderType::Fok),
    ("ioc", OrderType::Fak),
];

const DIRECTION_TABLE: &[(&str, Direction)] =
    &[("buy", Direction::Long), ("sell", Direction::Short)];

const STATUS_TABLE: &[(&str, Status)] = &[
    ("live", Status::NotTraded),
    ("partially_filled", Status::PartTraded),
    ("filled", Status::AllTraded),
    ("canceled", Status::Cancelled),
];

const PRODUCT_TABLE: &[(&str, Product)] = &[
    ("SPOT", Product::Spot),
    ("SWAP", Product::Swap),
    ("FUTURES", Product::Futures),
];

const INTERVAL_TABLE: &[(&str, Interval)] = &[
    ("1m", Interval::Minute),
    ("1H", Interval::Hour),
    ("1D", Interval::Daily),
];

fn from_vendor<T: Copy>(
    table: &[(&'static str, T)],
    field: &'static str,
    value: &str,
) -> Result<T, CodecError> {
    table
        .iter()
        .find(|(code, _)| *code == value)
        .map(|(_, internal)| *internal)
        .ok_or_else(|| CodecError::UnknownEnum {
            field,
            value: value.to_string(),
        })
}

fn to_vendor<T: Copy + PartialEq + fmt::Debug>(
    table: &[(&'static str, T)],
    field: &'static str,
    value: T,
) -> Result<&'static str, CodecError> {
    table
        .iter()
        .find(|(_, internal)| *internal == value)
        .map(|(code, _)| *code)
        .ok_or_else(|| CodecError::Unmapped {
            field,
            value: format!("{value:?}"),
        })
}

/// Vendor `ordType` → order type.
///
/// # Errors
///
/// Returns `CodecError::UnknownEnum` for unmapped values.
pub fn order_type_from_vendor(value: &str) -> Result<OrderType, CodecError> {
    from_vendor(ORDER_TYPE_TABLE, "ordType", value)
}

/// Order type → vendor `ordType`.
///
/// # Errors
///
/// Returns `CodecError::Unmapped` if the type has no vendor code.
pub fn order_type_to_vendor(value: OrderType) -> Result<&'static str, CodecError> {
    to_vendor(ORDER_TYPE_TABLE, "ordType", value)
}

/// Vendor `side` → direction.
///
/// # Errors
///
/// Returns `CodecError::UnknownEnum` for unmapped values.
pub fn direction_from_vendor(value: &str) -> Result<Direction, CodecError> {
    from_vendor(DIRECTION_TABLE, "side", value)
}

/// Direction → vendor `side`.
///
/// # Errors
///
/// Returns `CodecError::Unmapped` for [`Direction::Net`].
pub fn direction_to_vendor(value: Direction) -> Result<&'static str, CodecError> {
    to_vendor(DIRECTION_TABLE, "side", value)
}

/// Vendor order `state` → status.
///
/// # Errors
///
/// Returns `CodecError::UnknownEnum` for unmapped values.
pub fn status_from_vendor(value: &str) -> Result<Status, CodecError> {
    from_vendor(STATUS_TABLE, "state", value)
}

/// Status → vendor order `state`.
///
/// # Errors
///
/// Returns `CodecError::Unmapped` for statuses the venue never reports.
pub fn status_to_vendor(value: Status) -> Result<&'static str, CodecError> {
    to_vendor(STATUS_TABLE, "state", value)
}

/// Vendor `instType` → product.
///
/// # Errors
///
/// Returns `CodecError::UnknownEnum` for unmapped values.
pub fn product_from_vendor(value: &str) -> Result<Product, CodecError> {
    from_vendor(PRODUCT_TABLE, "instType", value)
}

/// Product → vendor `instType`.
///
/// # Errors
///
/// Returns `CodecError::Unmapped` if the product has no vendor code.
pub fn product_to_vendor(value: Product) -> Result<&'static str, CodecError> {
    to_vendor(PRODUCT_TABLE, "instType", value)
}

/// Interval → vendor `bar`.
///
/// # Errors
///
/// Returns `CodecError::Unmapped` if the interval has no vendor code.
pub fn interval_to_vendor(value: Interval) -> Result<&'static str, CodecError> {
    to_vendor(INTERVAL_TABLE, "bar", value)
}

/// Vendor `bar` → interval.
///
/// # Errors
///
/// Returns `CodecError::UnknownEnum` for unmapped values.
pub fn interval_from_vendor(value: &str) -> Result<Interval, CodecError> {
    from_vendor(INTERVAL_TABLE, "bar", value)
}

/// Algo order `state` → status.
///
/// Conditional orders only distinguish working and cancelled; any other
/// terminal state is reported as rejected.
#[must_use]
pub fn stop_status_from_vendor(value: &str) -> Status {
    match value {
        "live" => Status::NotTraded,
        "canceled" => Status::Cancelled,
        _ => Status::Rejected,
    }
}

// =============================================================================
// Scalars
// =============================================================================

/// Parse a decimal field.
///
/// # Errors
///
/// Returns `CodecError::InvalidNumber` if the value does not parse.
pub fn parse_decimal(field: &'static str, raw: &str) -> Result<Decimal, CodecError> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| CodecError::InvalidNumber {
            field,
            value: raw.to_string(),
        })
}

/// Parse a decimal field, treating an empty value as zero.
///
/// # Errors
///
/// Returns `CodecError::InvalidNumber` if a non-empty value does not parse.
pub fn parse_decimal_or_zero(field: &'static str, raw: &str) -> Result<Decimal, CodecError> {
    if raw.is_empty() {
        return Ok(Decimal::ZERO);
    }
    parse_decimal(field, raw)
}

/// Parse a millisecond epoch timestamp into the reporting timezone.
///
/// # Errors
///
/// Returns `CodecError::InvalidTimestamp` if the value is not a valid epoch.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<FixedOffset>, CodecError> {
    raw.parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|dt| dt.with_timezone(&reporting_offset()))
        .ok_or_else(|| CodecError::InvalidTimestamp(raw.to_string()))
}

/// Format a decimal for the wire without trailing zeros.
#[must_use]
pub fn format_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

// =============================================================================
// Frame Classification
// =============================================================================

/// Keep-alive request text.
pub const PING_TEXT: &str = "ping";

/// Keep-alive reply text.
pub const PONG_TEXT: &str = "pong";

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Control event.
    Event(EventFrame),
    /// Reply to a request.
    Reply(ReplyFrame),
    /// Channel push.
    Push(PushFrame),
}

/// Classify one text frame.
///
/// # Errors
///
/// Returns an error if the text is not JSON or matches no frame shape.
pub fn decode_frame(text: &str) -> Result<InboundFrame, CodecError> {
    let trimmed = text.trim();
    if trimmed == PONG_TEXT {
        return Ok(InboundFrame::Reply(ReplyFrame::pong()));
    }

    let value: serde_json::Value = serde_json::from_str(trimmed)?;
    let Some(object) = value.as_object() else {
        let preview: String = trimmed.chars().take(50).collect();
        return Err(CodecError::InvalidFrame(format!(
            "expected JSON object, got: {preview}..."
        )));
    };

    if object.contains_key("event") {
        Ok(InboundFrame::Event(serde_json::from_value(value)?))
    } else if object.contains_key("op") {
        Ok(InboundFrame::Reply(serde_json::from_value(value)?))
    } else if object.contains_key("arg") {
        Ok(InboundFrame::Push(serde_json::from_value(value)?))
    } else {
        Err(CodecError::InvalidFrame(
            "frame has no event, op or arg".to_string(),
        ))
    }
}

/// Dispatch key of a classified frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// `event: login`.
    Login,
    /// `event: subscribe`.
    Subscribed,
    /// `event: error`.
    Error,
    /// `op: pong`, or the bare `pong` text.
    Pong,
    /// `op: order`.
    OrderAck,
    /// `op: cancel-order`.
    CancelAck,
    /// `op: batch-cancel-orders`.
    BatchCancelAck,
    /// Channel `orders`.
    Orders,
    /// Channel `orders-algo`.
    OrdersAlgo,
    /// Channel `account`.
    Account,
    /// Channel `positions`.
    Positions,
    /// Channel `tickers`.
    Tickers,
    /// Channel `books5`.
    Books5,
}

impl Route {
    /// Route for `frame`, or `None` for topics this gateway ignores.
    #[must_use]
    pub fn of(frame: &InboundFrame) -> Option<Self> {
        match frame {
            InboundFrame::Event(event) => match event.event.as_str() {
                "login" => Some(Self::Login),
                "subscribe" => Some(Self::Subscribed),
                "error" => Some(Self::Error),
                _ => None,
            },
            InboundFrame::Reply(reply) => match reply.op.as_str() {
                "pong" => Some(Self::Pong),
                "order" => Some(Self::OrderAck),
                "cancel-order" => Some(Self::CancelAck),
                "batch-cancel-orders" => Some(Self::BatchCancelAck),
                _ => None,
            },
            InboundFrame::Push(push) => match push.arg.channel.as_str() {
                "orders" => Some(Self::Orders),
                "orders-algo" => Some(Self::OrdersAlgo),
                "account" => Some(Self::Account),
                "positions" => Some(Self::Positions),
                "tickers" => Some(Self::Tickers),
                "books5" => Some(Self::Books5),
                _ => None,
            },
        }
    }

    /// Topic name as it appears on the wire.
    #[must_use]
    pub const fn topic(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Subscribed => "subscribe",
            Self::Error => "error",
            Self::Pong => "pong",
            Self::OrderAck => "order",
            Self::CancelAck => "cancel-order",
            Self::BatchCancelAck => "batch-cancel-orders",
            Self::Orders => "orders",
            Self::OrdersAlgo => "orders-algo",
            Self::Account => "account",
            Self::Positions => "positions",
            Self::Tickers => "tickers",
            Self::Books5 => "books5",
        }
    }
}

/// Topic key of a frame, whether or not it is routed.
#[must_use]
pub fn topic_of(frame: &InboundFrame) -> &str {
    match frame {
        InboundFrame::Event(event) => &event.event,
        InboundFrame::Reply(reply) => &reply.op,
        InboundFrame::Push(push) => &push.arg.channel,
    }
}

// =============================================================================
// Orders
// =============================================================================

/// Decode a regular order under `order_id`.
///
/// The venue does not report the position effect, so `offset` is `None`.
///
/// # Errors
///
/// Returns an error for unknown enums or malformed numbers.
pub fn decode_order(
    payload: &OrderPayload,
    order_id: &str,
    gateway_name: &str,
) -> Result<Order, CodecError> {
    Ok(Order {
        order_id: order_id.to_string(),
        symbol: payload.inst_id.clone(),
        exchange: Exchange::Okx,
        order_type: order_type_from_vendor(&payload.ord_type)?,
        direction: direction_from_vendor(&payload.side)?,
        offset: None,
        price: parse_decimal_or_zero("px", &payload.px)?,
        volume: parse_decimal("sz", &payload.sz)?,
        traded: parse_decimal_or_zero("accFillSz", &payload.acc_fill_sz)?,
        status: status_from_vendor(&payload.state)?,
        datetime: parse_timestamp(&payload.c_time)?,
        gateway_name: gateway_name.to_string(),
    })
}

/// Decode the fill carried by an order update, if any.
///
/// The volume is the raw fill size; callers round it to the contract.
///
/// # Errors
///
/// Returns an error for malformed fill fields.
pub fn decode_fill(payload: &OrderPayload, order: &Order) -> Result<Option<Trade>, CodecError> {
    let volume = parse_decimal_or_zero("fillSz", &payload.fill_sz)?;
    if volume.is_zero() {
        return Ok(None);
    }

    Ok(Some(Trade {
        symbol: order.symbol.clone(),
        exchange: order.exchange,
        order_id: order.order_id.clone(),
        trade_id: payload.trade_id.clone(),
        direction: order.direction,
        offset: order.offset,
        price: parse_decimal("fillPx", &payload.fill_px)?,
        volume,
        datetime: parse_timestamp(&payload.u_time)?,
        gateway_name: order.gateway_name.clone(),
    }))
}

/// Encode an order back into the vendor payload fields it was decoded from.
///
/// # Errors
///
/// Returns `CodecError::Unmapped` for values the venue never reports.
pub fn encode_order(order: &Order, remote_id: &str) -> Result<OrderPayload, CodecError> {
    Ok(OrderPayload {
        inst_id: order.symbol.clone(),
        ord_id: remote_id.to_string(),
        cl_ord_id: order.order_id.clone(),
        px: format_decimal(order.price),
        sz: format_decimal(order.volume),
        acc_fill_sz: format_decimal(order.traded),
        c_time: order.datetime.timestamp_millis().to_string(),
        ord_type: order_type_to_vendor(order.order_type)?.to_string(),
        side: direction_to_vendor(order.direction)?.to_string(),
        state: status_to_vendor(order.status)?.to_string(),
        ..OrderPayload::default()
    })
}

/// Decode a conditional order under `order_id`.
///
/// Returns `None` for algo types other than `conditional`.
///
/// # Errors
///
/// Returns an error for unknown sides or malformed numbers.
pub fn decode_stop_order(
    payload: &AlgoOrderPayload,
    order_id: &str,
    gateway_name: &str,
) -> Result<Option<Order>, CodecError> {
    if payload.ord_type != "conditional" {
        return Ok(None);
    }

    let trigger = if payload.sl_trigger_px.is_empty() {
        ("tpTriggerPx", &payload.tp_trigger_px)
    } else {
        ("slTriggerPx", &payload.sl_trigger_px)
    };

    Ok(Some(Order {
        order_id: order_id.to_string(),
        symbol: payload.inst_id.clone(),
        exchange: Exchange::Okx,
        order_type: OrderType::Stop,
        direction: direction_from_vendor(&payload.side)?,
        offset: None,
        price: parse_decimal(trigger.0, trigger.1)?,
        volume: parse_decimal("sz", &payload.sz)?,
        traded: Decimal::ZERO,
        status: stop_status_from_vendor(&payload.state),
        datetime: parse_timestamp(&payload.c_time)?,
        gateway_name: gateway_name.to_string(),
    }))
}

/// Arguments of the `order` op for a regular order.
///
/// # Errors
///
/// Returns `CodecError::Unmapped` for unsendable directions or types.
pub fn encode_place_order(
    req: &OrderRequest,
    local_id: &str,
    mode: TradeMode,
) -> Result<PlaceOrderArgs, CodecError> {
    Ok(PlaceOrderArgs {
        inst_id: req.symbol.clone(),
        cl_ord_id: local_id.to_string(),
        side: direction_to_vendor(req.direction)?,
        ord_type: order_type_to_vendor(req.order_type)?,
        px: format_decimal(req.price),
        sz: format_decimal(req.volume),
        td_mode: mode.as_str(),
    })
}

/// Body of `POST /api/v5/trade/order-algo` for a stop order.
///
/// The trigger fires a market order (`slOrdPx = -1`). Spot buys size the
/// order in the base currency.
///
/// # Errors
///
/// Returns `CodecError::Unmapped` for unsendable directions.
pub fn encode_algo_order(
    req: &OrderRequest,
    local_id: &str,
    mode: TradeMode,
    product: Product,
) -> Result<AlgoOrderArgs, CodecError> {
    let tgt_ccy = (product == Product::Spot && req.direction == Direction::Long)
        .then_some("base_ccy");

    Ok(AlgoOrderArgs {
        inst_id: req.symbol.clone(),
        algo_cl_ord_id: local_id.to_string(),
        side: direction_to_vendor(req.direction)?,
        ord_type: "conditional",
        sl_trigger_px: format_decimal(req.price),
        sl_ord_px: "-1",
        sz: format_decimal(req.volume),
        td_mode: mode.as_str(),
        tgt_ccy,
    })
}

// =============================================================================
// Account and Market Data
// =============================================================================

/// Decode one currency's balance from an account push.
///
/// # Errors
///
/// Returns an error for malformed numbers.
pub fn decode_balance(detail: &AccountDetail, gateway_name: &str) -> Result<Account, CodecError> {
    let balance = parse_decimal_or_zero("eq", &detail.eq)?;
    let available = parse_decimal_or_zero("availEq", &detail.avail_eq)?;
    Ok(Account {
        account_id: detail.ccy.clone(),
        balance,
        available,
        frozen: balance - available,
        gateway_name: gateway_name.to_string(),
    })
}

/// Decode a net position.
///
/// # Errors
///
/// Returns an error for malformed numbers.
pub fn decode_position(
    payload: &PositionPayload,
    gateway_name: &str,
) -> Result<Position, CodecError> {
    Ok(Position {
        symbol: payload.inst_id.clone(),
        exchange: Exchange::Okx,
        direction: Direction::Net,
        volume: parse_decimal_or_zero("pos", &payload.pos)?,
        price: parse_decimal_or_zero("avgPx", &payload.avg_px)?,
        pnl: parse_decimal_or_zero("upl", &payload.upl)?,
        gateway_name: gateway_name.to_string(),
    })
}

/// Apply a ticker push to the cached tick.
///
/// # Errors
///
/// Returns an error for malformed numbers; the tick is left unchanged.
pub fn apply_ticker(tick: &mut Tick, payload: &TickerPayload) -> Result<(), CodecError> {
    let last = parse_decimal_or_zero("last", &payload.last)?;
    let open = parse_decimal_or_zero("open24h", &payload.open24h)?;
    let high = parse_decimal_or_zero("high24h", &payload.high24h)?;
    let low = parse_decimal_or_zero("low24h", &payload.low24h)?;
    let volume = parse_decimal_or_zero("vol24h", &payload.vol24h)?;

    tick.last_price = last;
    tick.open_price = open;
    tick.high_price = high;
    tick.low_price = low;
    tick.volume = volume;
    Ok(())
}

fn decode_levels(
    side: &'static str,
    levels: &[Vec<String>],
) -> Result<[DepthLevel; DEPTH_LEVELS], CodecError> {
    let mut out = [DepthLevel::default(); DEPTH_LEVELS];
    for (slot, level) in out.iter_mut().zip(levels.iter()) {
        let [price, volume, ..] = level.as_slice() else {
            return Err(CodecError::InvalidFrame(format!(
                "{side} level has {} fields",
                level.len()
            )));
        };
        *slot = DepthLevel {
            price: parse_decimal(side, price)?,
            volume: parse_decimal(side, volume)?,
        };
    }
    Ok(out)
}

/// Apply a five-level book push to the cached tick.
///
/// Levels beyond the pushed depth are reset to zero.
///
/// # Errors
///
/// Returns an error for malformed levels; the tick is left unchanged.
pub fn apply_book(tick: &mut Tick, payload: &BookPayload) -> Result<(), CodecError> {
    let bids = decode_levels("bids", &payload.bids)?;
    let asks = decode_levels("asks", &payload.asks)?;
    let datetime = parse_timestamp(&payload.ts)?;

    tick.bids = bids;
    tick.asks = asks;
    tick.datetime = datetime;
    Ok(())
}

/// An instrument decoded into a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstrument {
    /// Contract metadata.
    pub contract: Contract,
    /// Spot pair whose maximum leverage exceeds one.
    pub margin_spot: bool,
}

/// Decode instrument metadata.
///
/// Spot contracts have size one; derivatives use `ctMult × ctVal`.
///
/// # Errors
///
/// Returns an error for unknown instrument types or malformed numbers.
pub fn decode_instrument(
    payload: &InstrumentPayload,
    gateway_name: &str,
) -> Result<DecodedInstrument, CodecError> {
    let product = product_from_vendor(&payload.inst_type)?;
    let max_leverage = if payload.lever.is_empty() {
        Decimal::ONE
    } else {
        parse_decimal("lever", &payload.lever)?
    };

    let size = match product {
        Product::Spot => Decimal::ONE,
        Product::Swap | Product::Futures => {
            parse_decimal("ctMult", &payload.ct_mult)? * parse_decimal("ctVal", &payload.ct_val)?
        }
    };

    Ok(DecodedInstrument {
        contract: Contract {
            symbol: payload.inst_id.clone(),
            exchange: Exchange::Okx,
            name: payload.inst_id.clone(),
            product,
            size,
            pricetick: parse_decimal("tickSz", &payload.tick_sz)?,
            min_volume: parse_decimal("minSz", &payload.min_sz)?,
            history_data: true,
            net_position: true,
            stop_supported: true,
            gateway_name: gateway_name.to_string(),
        },
        margin_spot: product == Product::Spot && max_leverage > Decimal::ONE,
    })
}

/// Decode one candle row `[ts, o, h, l, c, vol, ...]`.
///
/// # Errors
///
/// Returns an error for short rows or malformed numbers.
pub fn decode_candle(
    row: &[String],
    req: &HistoryRequest,
    gateway_name: &str,
) -> Result<Bar, CodecError> {
    let [ts, open, high, low, close, volume, ..] = row else {
        return Err(CodecError::InvalidFrame(format!(
            "candle row has {} fields",
            row.len()
        )));
    };

    Ok(Bar {
        symbol: req.symbol.clone(),
        exchange: req.exchange,
        datetime: parse_timestamp(ts)?,
        interval: req.interval,
        volume: parse_decimal("vol", volume)?,
        open_price: parse_decimal("o", open)?,
        high_price: parse_decimal("h", high)?,
        low_price: parse_decimal("l", low)?,
        close_price: parse_decimal("c", close)?,
        gateway_name: gateway_name.to_string(),
    })
}
