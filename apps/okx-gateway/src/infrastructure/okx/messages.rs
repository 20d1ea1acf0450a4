//! OKX Wire Message Types
//!
//! Serde types mapping OKX v5 JSON frames and REST envelopes. Numbers
//! arrive as strings on this venue, so payload fields stay `String` and are
//! parsed by the codec where the failure can be attributed to a field.
//!
//! # Frame Shapes
//!
//! - Control event: `{"event":"login","code":"0","msg":""}`
//! - RPC reply: `{"id":"1","op":"order","code":"0","msg":"","data":[...]}`
//! - Channel push: `{"arg":{"channel":"orders","instType":"ANY"},"data":[...]}`
//!
//! # References
//!
//! - [WebSocket API](https://www.okx.com/docs-v5/en/#overview-websocket)
//! - [REST Authentication](https://www.okx.com/docs-v5/en/#overview-rest-authentication)

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// =============================================================================
// Response Code
// =============================================================================

/// Status code of an envelope or per-item result.
///
/// The venue sends codes as strings in most places and as bare numbers in a
/// few. Both forms normalize to the same canonical value; `0` is success.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ResponseCode(String);

impl ResponseCode {
    /// The success sentinel.
    pub const SUCCESS: &'static str = "0";

    /// Normalize a raw code.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<i64>() {
            Ok(n) => Self(n.to_string()),
            Err(_) => Self(trimmed.to_string()),
        }
    }

    /// Whether this is the success sentinel.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.0 == Self::SUCCESS
    }

    /// Canonical text form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for ResponseCode {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

impl From<&str> for ResponseCode {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCode {
    Text(String),
    Int(i64),
}

impl<'de> Deserialize<'de> for ResponseCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawCode::deserialize(deserializer)? {
            RawCode::Text(s) => Self::new(&s),
            RawCode::Int(n) => Self::from(n),
        })
    }
}

impl Serialize for ResponseCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

// =============================================================================
// Inbound Frames
// =============================================================================

/// Channel descriptor carried by pushes and subscribe events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelArg {
    /// Channel name (`orders`, `tickers`, ...).
    pub channel: String,
    /// Instrument id, for per-symbol channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inst_id: Option<String>,
    /// Instrument type filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inst_type: Option<String>,
}

impl ChannelArg {
    /// Channel without filters.
    #[must_use]
    pub fn channel(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            inst_id: None,
            inst_type: None,
        }
    }

    /// Channel filtered by instrument type.
    #[must_use]
    pub fn with_inst_type(channel: &str, inst_type: &str) -> Self {
        Self {
            inst_type: Some(inst_type.to_string()),
            ..Self::channel(channel)
        }
    }

    /// Channel for one instrument.
    #[must_use]
    pub fn with_inst_id(channel: &str, inst_id: &str) -> Self {
        Self {
            inst_id: Some(inst_id.to_string()),
            ..Self::channel(channel)
        }
    }
}

/// Control event (`login`, `subscribe`, `error`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFrame {
    /// Event name.
    pub event: String,
    /// Result code, absent on subscribe acknowledgements.
    #[serde(default)]
    pub code: Option<ResponseCode>,
    /// Result message.
    #[serde(default)]
    pub msg: String,
    /// Channel the event refers to.
    #[serde(default)]
    pub arg: Option<ChannelArg>,
}

/// Reply to an `op` request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyFrame {
    /// Request id echoed back.
    #[serde(default)]
    pub id: String,
    /// Operation name.
    pub op: String,
    /// Envelope code.
    #[serde(default)]
    pub code: Option<ResponseCode>,
    /// Envelope message.
    #[serde(default)]
    pub msg: String,
    /// Per-item results.
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

impl ReplyFrame {
    /// The structured reply a bare `pong` text frame stands for.
    #[must_use]
    pub fn pong() -> Self {
        Self {
            id: String::new(),
            op: "pong".to_string(),
            code: None,
            msg: String::new(),
            data: Vec::new(),
        }
    }

    /// Whether the envelope reports success. A missing code counts as success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code.as_ref().is_none_or(ResponseCode::is_success)
    }
}

/// Data pushed on a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushFrame {
    /// Channel descriptor.
    pub arg: ChannelArg,
    /// Payload items.
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

// =============================================================================
// Payloads
// =============================================================================

/// Regular order, as pushed on `orders` and returned by `orders-pending`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderPayload {
    /// Instrument id.
    pub inst_id: String,
    /// Venue order id.
    pub ord_id: String,
    /// Client order id.
    pub cl_ord_id: String,
    /// Parent algo id when triggered by a conditional order.
    pub algo_id: String,
    /// Price.
    pub px: String,
    /// Size.
    pub sz: String,
    /// Accumulated fill size.
    pub acc_fill_sz: String,
    /// Size of the latest fill.
    pub fill_sz: String,
    /// Price of the latest fill.
    pub fill_px: String,
    /// Trade id of the latest fill.
    pub trade_id: String,
    /// Creation time (ms).
    pub c_time: String,
    /// Update time (ms).
    pub u_time: String,
    /// Order type.
    pub ord_type: String,
    /// Side.
    pub side: String,
    /// Order state.
    pub state: String,
}

/// Conditional order, as pushed on `orders-algo`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlgoOrderPayload {
    /// Instrument id.
    pub inst_id: String,
    /// Venue algo id.
    pub algo_id: String,
    /// Client algo id.
    pub algo_cl_ord_id: String,
    /// Algo order type.
    pub ord_type: String,
    /// Side.
    pub side: String,
    /// Size.
    pub sz: String,
    /// Stop-loss trigger price.
    pub sl_trigger_px: String,
    /// Take-profit trigger price.
    pub tp_trigger_px: String,
    /// Algo state.
    pub state: String,
    /// Creation time (ms).
    pub c_time: String,
}

/// Per-item result of a place or cancel request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AckItem {
    /// Client order id.
    pub cl_ord_id: String,
    /// Venue order id.
    pub ord_id: String,
    /// Client algo id.
    pub algo_cl_ord_id: String,
    /// Venue algo id.
    pub algo_id: String,
    /// Item code.
    pub s_code: ResponseCode,
    /// Item message.
    pub s_msg: String,
}

/// Balance detail of one currency.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountDetail {
    /// Currency.
    pub ccy: String,
    /// Equity.
    pub eq: String,
    /// Available equity.
    pub avail_eq: String,
}

/// Account push.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct AccountPayload {
    /// Per-currency details.
    pub details: Vec<AccountDetail>,
}

/// Position push.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PositionPayload {
    /// Instrument id.
    pub inst_id: String,
    /// Position size.
    pub pos: String,
    /// Average price.
    pub avg_px: String,
    /// Unrealized profit and loss.
    pub upl: String,
}

/// Ticker push.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TickerPayload {
    /// Instrument id.
    pub inst_id: String,
    /// Last price.
    pub last: String,
    /// 24h open.
    pub open24h: String,
    /// 24h high.
    pub high24h: String,
    /// 24h low.
    pub low24h: String,
    /// 24h volume.
    pub vol24h: String,
}

/// Five-level book push. Levels are `[price, size, liquidated, orders]`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookPayload {
    /// Instrument id.
    pub inst_id: String,
    /// Bid levels, best first.
    pub bids: Vec<Vec<String>>,
    /// Ask levels, best first.
    pub asks: Vec<Vec<String>>,
    /// Book time (ms).
    pub ts: String,
}

/// Instrument metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstrumentPayload {
    /// Instrument id.
    pub inst_id: String,
    /// Instrument type.
    pub inst_type: String,
    /// Contract multiplier.
    pub ct_mult: String,
    /// Contract value.
    pub ct_val: String,
    /// Tick size.
    pub tick_sz: String,
    /// Minimum order size.
    pub min_sz: String,
    /// Maximum leverage; empty when not supported.
    pub lever: String,
}

/// Server time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct ServerTimePayload {
    /// Server time (ms).
    pub ts: String,
}

/// Standard REST envelope.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct RestEnvelope<T> {
    /// Envelope code.
    #[serde(default)]
    pub code: ResponseCode,
    /// Envelope message.
    #[serde(default)]
    pub msg: String,
    /// Payload items.
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// Candle rows: `[ts, o, h, l, c, vol, ...]`.
pub type CandleEnvelope = RestEnvelope<Vec<String>>;

// =============================================================================
// Outbound Requests
// =============================================================================

/// Operation request sent over a WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpRequest<A> {
    /// Request id, echoed on the reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Operation name.
    pub op: &'static str,
    /// Arguments.
    pub args: Vec<A>,
}

impl<A: Serialize> OpRequest<A> {
    /// Request without an id.
    #[must_use]
    pub const fn new(op: &'static str, args: Vec<A>) -> Self {
        Self { id: None, op, args }
    }

    /// Request tagged with `id`.
    #[must_use]
    pub const fn with_id(id: String, op: &'static str, args: Vec<A>) -> Self {
        Self {
            id: Some(id),
            op,
            args,
        }
    }

    /// Serialize to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Login arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginArgs {
    /// API key.
    pub api_key: String,
    /// Passphrase.
    pub passphrase: String,
    /// Unix seconds used in the signature.
    pub timestamp: String,
    /// Signature.
    pub sign: String,
}

/// Place-order arguments for the `order` op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderArgs {
    /// Instrument id.
    pub inst_id: String,
    /// Client order id (the local id).
    pub cl_ord_id: String,
    /// Side.
    pub side: &'static str,
    /// Order type.
    pub ord_type: &'static str,
    /// Price.
    pub px: String,
    /// Size.
    pub sz: String,
    /// Margin mode.
    pub td_mode: &'static str,
}

/// Cancel arguments. Exactly one of the ids is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelArgs {
    /// Instrument id.
    pub inst_id: String,
    /// Client order id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cl_ord_id: Option<String>,
    /// Venue order id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ord_id: Option<String>,
}

/// Conditional order body for `POST /api/v5/trade/order-algo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgoOrderArgs {
    /// Instrument id.
    pub inst_id: String,
    /// Client algo id (the local id).
    pub algo_cl_ord_id: String,
    /// Side.
    pub side: &'static str,
    /// Always `conditional`.
    pub ord_type: &'static str,
    /// Stop-loss trigger price.
    pub sl_trigger_px: String,
    /// Stop-loss order price; `-1` means market.
    pub sl_ord_px: &'static str,
    /// Size.
    pub sz: String,
    /// Margin mode.
    pub td_mode: &'static str,
    /// Size currency for spot buys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tgt_ccy: Option<&'static str>,
}

/// Cancel body item for `POST /api/v5/trade/cancel-algos`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAlgoArgs {
    /// Instrument id.
    pub inst_id: String,
    /// Venue algo id.
    pub algo_id: String,
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(r#""0""#, true ; "string zero")]
    #[test_case("0", true ; "numeric zero")]
    #[test_case(r#""51000""#, false ; "string failure")]
    #[test_case("51000", false ; "numeric failure")]
    fn response_code_forms(raw: &str, success: bool) {
        let code: ResponseCode = serde_json::from_str(raw).unwrap();
        assert_eq!(code.is_success(), success);
    }

    #[test]
    fn string_and_numeric_codes_are_equal() {
        let text: ResponseCode = serde_json::from_str(r#""60009""#).unwrap();
        let number: ResponseCode = serde_json::from_str("60009").unwrap();
        assert_eq!(text, number);
        assert_eq!(text.as_str(), "60009");
    }

    #[test]
    fn response_code_serializes_as_string() {
        let json = serde_json::to_string(&ResponseCode::from(0)).unwrap();
        assert_eq!(json, r#""0""#);
    }

    #[test]
    fn reply_without_code_is_success() {
        assert!(ReplyFrame::pong().is_success());
    }

    #[test]
    fn order_payload_defaults_missing_fields() {
        let payload: OrderPayload =
            serde_json::from_str(r#"{"instId":"BTC-USDT","ordId":"1","state":"live"}"#).unwrap();
        assert_eq!(payload.inst_id, "BTC-USDT");
        assert!(payload.cl_ord_id.is_empty());
        assert!(payload.algo_id.is_empty());
    }

    #[test]
    fn op_request_omits_missing_id() {
        let req = OpRequest::new("subscribe", vec![ChannelArg::channel("account")]);
        assert_eq!(
            req.to_json().unwrap(),
            r#"{"op":"subscribe","args":[{"channel":"account"}]}"#
        );
    }

    #[test]
    fn cancel_args_carry_one_id() {
        let args = CancelArgs {
            inst_id: "BTC-USDT".to_string(),
            cl_ord_id: Some("L1".to_string()),
            ord_id: None,
        };
        assert_eq!(
            serde_json::to_string(&args).unwrap(),
            r#"{"instId":"BTC-USDT","clOrdId":"L1"}"#
        );
    }

    #[test]
    fn rest_envelope_with_numeric_code() {
        let env: RestEnvelope<ServerTimePayload> =
            serde_json::from_str(r#"{"code":0,"msg":"","data":[{"ts":"1697610000000"}]}"#)
                .unwrap();
        assert!(env.code.is_success());
        assert_eq!(env.data[0].ts, "1697610000000");
    }
}
