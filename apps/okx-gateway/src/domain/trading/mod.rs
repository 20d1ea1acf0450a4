//! Trading Objects
//!
//! The normalized schema every channel decodes into. Orders, trades,
//! contracts and market data carry the `gateway_name` that produced them so
//! a downstream engine can route follow-up requests.
//!
//! # Time
//!
//! Timestamps are reported in UTC+08:00, the exchange's reporting timezone.

use std::fmt;

use chrono::Offset as _;
use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Time Helpers
// =============================================================================

/// Offset of the reporting timezone from UTC, in seconds.
pub const REPORTING_OFFSET_SECS: i32 = 8 * 3600;

/// The fixed UTC+08:00 offset used for every reported timestamp.
#[must_use]
pub fn reporting_offset() -> FixedOffset {
    FixedOffset::east_opt(REPORTING_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Current time in the reporting timezone.
#[must_use]
pub fn now_reporting() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&reporting_offset())
}

// =============================================================================
// Enumerations
// =============================================================================

/// Trading venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Exchange {
    /// OKX unified account.
    #[default]
    Okx,
}

impl Exchange {
    /// Venue code used in `vt_symbol` keys.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Okx => "OKX",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order or position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Buy side.
    Long,
    /// Sell side.
    Short,
    /// Net position (one-way mode).
    Net,
}

/// Position effect of an order.
///
/// Venues in one-way mode never report it, so orders carry it as
/// `Option<Offset>` and the order cache back-fills it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Offset {
    /// Open a position.
    Open,
    /// Close a position.
    Close,
    /// Close today's position.
    CloseToday,
    /// Close yesterday's position.
    CloseYesterday,
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    /// Limit order.
    Limit,
    /// Market order.
    Market,
    /// Conditional (stop) order, tracked in its own identifier space.
    Stop,
    /// Fill-and-kill (immediate or cancel).
    Fak,
    /// Fill-or-kill.
    Fok,
}

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Sent, not yet acknowledged.
    Submitting,
    /// Working, nothing filled.
    NotTraded,
    /// Working, partially filled.
    PartTraded,
    /// Completely filled.
    AllTraded,
    /// Cancelled.
    Cancelled,
    /// Rejected by the venue.
    Rejected,
}

impl Status {
    /// Returns true while the order can still trade or be cancelled.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Submitting | Self::NotTraded | Self::PartTraded)
    }
}

/// Instrument product class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Product {
    /// Spot pair.
    Spot,
    /// Dated futures.
    Futures,
    /// Perpetual swap.
    Swap,
}

impl Product {
    /// Every product the instrument query walks, in query order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Spot, Self::Swap, Self::Futures]
    }
}

/// Bar interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    /// One minute.
    Minute,
    /// One hour.
    Hour,
    /// One day.
    Daily,
}

// =============================================================================
// Orders and Trades
// =============================================================================

/// Last-known state of one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Local order id.
    pub order_id: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Venue.
    pub exchange: Exchange,
    /// Order type.
    pub order_type: OrderType,
    /// Direction.
    pub direction: Direction,
    /// Position effect; `None` when the update did not carry it.
    pub offset: Option<Offset>,
    /// Limit or trigger price.
    pub price: Decimal,
    /// Total quantity.
    pub volume: Decimal,
    /// Filled quantity.
    pub traded: Decimal,
    /// Lifecycle status.
    pub status: Status,
    /// Creation time.
    pub datetime: DateTime<FixedOffset>,
    /// Originating gateway.
    pub gateway_name: String,
}

impl Order {
    /// Whether the order lives in the stop identifier space.
    #[must_use]
    pub fn is_stop(&self) -> bool {
        self.order_type == OrderType::Stop
    }

    /// Whether the order can still trade.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Gateway-qualified order id.
    #[must_use]
    pub fn vt_orderid(&self) -> String {
        format!("{}.{}", self.gateway_name, self.order_id)
    }

    /// Venue-qualified symbol.
    #[must_use]
    pub fn vt_symbol(&self) -> String {
        vt_symbol(&self.symbol, self.exchange)
    }
}

/// A single fill, immutable once emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Instrument symbol.
    pub symbol: String,
    /// Venue.
    pub exchange: Exchange,
    /// Local id of the parent order.
    pub order_id: String,
    /// Venue trade id.
    pub trade_id: String,
    /// Direction.
    pub direction: Direction,
    /// Position effect copied from the parent order.
    pub offset: Option<Offset>,
    /// Fill price.
    pub price: Decimal,
    /// Fill quantity, rounded to the contract's minimum volume.
    pub volume: Decimal,
    /// Fill time.
    pub datetime: DateTime<FixedOffset>,
    /// Originating gateway.
    pub gateway_name: String,
}

impl Trade {
    /// Gateway-qualified trade id.
    #[must_use]
    pub fn vt_tradeid(&self) -> String {
        format!("{}.{}", self.gateway_name, self.trade_id)
    }
}

// =============================================================================
// Reference and Account Data
// =============================================================================

/// Tradable instrument metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// Instrument symbol.
    pub symbol: String,
    /// Venue.
    pub exchange: Exchange,
    /// Display name.
    pub name: String,
    /// Product class.
    pub product: Product,
    /// Contract multiplier.
    pub size: Decimal,
    /// Minimum price increment.
    pub pricetick: Decimal,
    /// Minimum order quantity.
    pub min_volume: Decimal,
    /// Whether candle history can be queried.
    pub history_data: bool,
    /// Whether positions are reported net.
    pub net_position: bool,
    /// Whether stop orders are accepted.
    pub stop_supported: bool,
    /// Originating gateway.
    pub gateway_name: String,
}

impl Contract {
    /// Venue-qualified symbol.
    #[must_use]
    pub fn vt_symbol(&self) -> String {
        vt_symbol(&self.symbol, self.exchange)
    }
}

/// Balance of one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Currency code.
    pub account_id: String,
    /// Total equity.
    pub balance: Decimal,
    /// Available equity.
    pub available: Decimal,
    /// `balance - available`.
    pub frozen: Decimal,
    /// Originating gateway.
    pub gateway_name: String,
}

/// Vendor-reported position, passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Instrument symbol.
    pub symbol: String,
    /// Venue.
    pub exchange: Exchange,
    /// Direction (always net in one-way mode).
    pub direction: Direction,
    /// Position size.
    pub volume: Decimal,
    /// Average open price.
    pub price: Decimal,
    /// Unrealized profit and loss.
    pub pnl: Decimal,
    /// Originating gateway.
    pub gateway_name: String,
}

// =============================================================================
// Market Data
// =============================================================================

/// Number of book levels carried on a tick.
pub const DEPTH_LEVELS: usize = 5;

/// One price level of the order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DepthLevel {
    /// Level price.
    pub price: Decimal,
    /// Level quantity.
    pub volume: Decimal,
}

/// Snapshot of ticker and top-of-book for one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    /// Instrument symbol.
    pub symbol: String,
    /// Venue.
    pub exchange: Exchange,
    /// Display name.
    pub name: String,
    /// Time of the last book update.
    pub datetime: DateTime<FixedOffset>,
    /// Last traded price.
    pub last_price: Decimal,
    /// 24h open.
    pub open_price: Decimal,
    /// 24h high.
    pub high_price: Decimal,
    /// 24h low.
    pub low_price: Decimal,
    /// 24h volume.
    pub volume: Decimal,
    /// Bid levels, best first.
    pub bids: [DepthLevel; DEPTH_LEVELS],
    /// Ask levels, best first.
    pub asks: [DepthLevel; DEPTH_LEVELS],
    /// Originating gateway.
    pub gateway_name: String,
}

impl Tick {
    /// Create an empty tick for a freshly subscribed symbol.
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        exchange: Exchange,
        datetime: DateTime<FixedOffset>,
        gateway_name: impl Into<String>,
    ) -> Self {
        let symbol = symbol.into();
        Self {
            name: symbol.clone(),
            symbol,
            exchange,
            datetime,
            last_price: Decimal::ZERO,
            open_price: Decimal::ZERO,
            high_price: Decimal::ZERO,
            low_price: Decimal::ZERO,
            volume: Decimal::ZERO,
            bids: [DepthLevel::default(); DEPTH_LEVELS],
            asks: [DepthLevel::default(); DEPTH_LEVELS],
            gateway_name: gateway_name.into(),
        }
    }
}

/// One candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Instrument symbol.
    pub symbol: String,
    /// Venue.
    pub exchange: Exchange,
    /// Candle open time.
    pub datetime: DateTime<FixedOffset>,
    /// Candle interval.
    pub interval: Interval,
    /// Traded volume.
    pub volume: Decimal,
    /// Open price.
    pub open_price: Decimal,
    /// High price.
    pub high_price: Decimal,
    /// Low price.
    pub low_price: Decimal,
    /// Close price.
    pub close_price: Decimal,
    /// Originating gateway.
    pub gateway_name: String,
}

// =============================================================================
// Requests
// =============================================================================

/// Request to place an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Instrument symbol.
    pub symbol: String,
    /// Venue.
    pub exchange: Exchange,
    /// Direction.
    pub direction: Direction,
    /// Order type.
    pub order_type: OrderType,
    /// Quantity.
    pub volume: Decimal,
    /// Limit or trigger price.
    pub price: Decimal,
    /// Position effect.
    pub offset: Option<Offset>,
    /// Free-form caller reference.
    pub reference: String,
}

impl OrderRequest {
    /// Venue-qualified symbol.
    #[must_use]
    pub fn vt_symbol(&self) -> String {
        vt_symbol(&self.symbol, self.exchange)
    }

    /// Build the `Submitting` order recorded when this request is sent.
    #[must_use]
    pub fn create_order(
        &self,
        order_id: impl Into<String>,
        gateway_name: impl Into<String>,
        datetime: DateTime<FixedOffset>,
    ) -> Order {
        Order {
            order_id: order_id.into(),
            symbol: self.symbol.clone(),
            exchange: self.exchange,
            order_type: self.order_type,
            direction: self.direction,
            offset: self.offset,
            price: self.price,
            volume: self.volume,
            traded: Decimal::ZERO,
            status: Status::Submitting,
            datetime,
            gateway_name: gateway_name.into(),
        }
    }
}

/// Request to cancel an order by local id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    /// Local order id.
    pub order_id: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Venue.
    pub exchange: Exchange,
}

impl CancelRequest {
    /// Venue-qualified symbol.
    #[must_use]
    pub fn vt_symbol(&self) -> String {
        vt_symbol(&self.symbol, self.exchange)
    }
}

/// Request to stream market data for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Instrument symbol.
    pub symbol: String,
    /// Venue.
    pub exchange: Exchange,
}

impl SubscribeRequest {
    /// Create a subscription request.
    #[must_use]
    pub fn new(symbol: impl Into<String>, exchange: Exchange) -> Self {
        Self {
            symbol: symbol.into(),
            exchange,
        }
    }

    /// Venue-qualified symbol, the subscription cache key.
    #[must_use]
    pub fn vt_symbol(&self) -> String {
        vt_symbol(&self.symbol, self.exchange)
    }
}

/// Request for historical candles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRequest {
    /// Instrument symbol.
    pub symbol: String,
    /// Venue.
    pub exchange: Exchange,
    /// Earliest candle wanted.
    pub start: DateTime<FixedOffset>,
    /// Latest candle wanted.
    pub end: Option<DateTime<FixedOffset>>,
    /// Candle interval.
    pub interval: Interval,
}

impl HistoryRequest {
    /// Venue-qualified symbol.
    #[must_use]
    pub fn vt_symbol(&self) -> String {
        vt_symbol(&self.symbol, self.exchange)
    }
}

/// Join a symbol and venue into the `SYMBOL.VENUE` key.
#[must_use]
pub fn vt_symbol(symbol: &str, exchange: Exchange) -> String {
    format!("{symbol}.{exchange}")
}

/// Round `value` to the nearest multiple of `target`, ties to even.
///
/// A zero target returns the value unchanged.
#[must_use]
pub fn round_to(value: Decimal, target: Decimal) -> Decimal {
    if target.is_zero() {
        return value;
    }
    ((value / target).round() * target).normalize()
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use test_case::test_case;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn reporting_offset_is_utc_plus_eight() {
        assert_eq!(reporting_offset().local_minus_utc(), 8 * 3600);
        assert_eq!(now_reporting().offset().local_minus_utc(), 8 * 3600);
    }

    #[test_case("0.123", "0.01", "0.12" ; "rounds down")]
    #[test_case("0.127", "0.01", "0.13" ; "rounds up")]
    #[test_case("0.125", "0.01", "0.12" ; "ties to even")]
    #[test_case("3", "1", "3" ; "whole lots")]
    #[test_case("1.7", "0", "1.7" ; "zero target")]
    fn round_to_cases(value: &str, target: &str, expected: &str) {
        assert_eq!(round_to(dec(value), dec(target)), dec(expected));
    }

    #[test]
    fn create_order_starts_submitting() {
        let req = OrderRequest {
            symbol: "BTC-USDT".to_string(),
            exchange: Exchange::Okx,
            direction: Direction::Long,
            order_type: OrderType::Limit,
            volume: dec("0.5"),
            price: dec("30000"),
            offset: Some(Offset::Open),
            reference: String::new(),
        };
        let order = req.create_order("231018093000000001", "OKX", now_reporting());

        assert_eq!(order.status, Status::Submitting);
        assert_eq!(order.traded, Decimal::ZERO);
        assert_eq!(order.offset, Some(Offset::Open));
        assert_eq!(order.vt_orderid(), "OKX.231018093000000001");
        assert_eq!(order.vt_symbol(), "BTC-USDT.OKX");
        assert!(order.is_active());
        assert!(!order.is_stop());
    }

    #[test]
    fn status_activity() {
        assert!(Status::Submitting.is_active());
        assert!(Status::PartTraded.is_active());
        assert!(!Status::AllTraded.is_active());
        assert!(!Status::Cancelled.is_active());
        assert!(!Status::Rejected.is_active());
    }

    #[test]
    fn new_tick_has_empty_book() {
        let tick = Tick::new("ETH-USDT", Exchange::Okx, now_reporting(), "OKX");
        assert_eq!(tick.name, "ETH-USDT");
        assert!(tick.bids.iter().all(|level| level.price.is_zero()));
        assert!(tick.asks.iter().all(|level| level.volume.is_zero()));
    }
}
