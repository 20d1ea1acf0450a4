//! Order Lifecycle Integration Tests
//!
//! Drives a private channel session and the order router end to end with
//! scripted venue frames: submit, acknowledgement, partial fill, cancel.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use okx_gateway::infrastructure::okx::{ChannelSession, Credentials, HeartbeatConfig, RequestSigner};
use okx_gateway::{
    CancelRequest, Contract, Direction, EventSink, Exchange, FrameSink, GatewayContext,
    GatewayEvent, HttpMethod, IdSpace, OrderRequest, OrderRouter, OrderType, OutboundFrame,
    Product, RestResponse, RestTransport, RestWorker, Status, TransportError,
};

#[derive(Default)]
struct RecordingSink(Mutex<Vec<GatewayEvent>>);

impl EventSink for RecordingSink {
    fn emit(&self, event: GatewayEvent) {
        self.0.lock().push(event);
    }
}

impl RecordingSink {
    fn drain(&self) -> Vec<GatewayEvent> {
        std::mem::take(&mut *self.0.lock())
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
    fn ops(&self, op: &str) -> Vec<serde_json::Value> {
        self.0
            .lock()
            .iter()
            .filter_map(|frame| match frame {
                OutboundFrame::Text(text) => serde_json::from_str::<serde_json::Value>(text).ok(),
                OutboundFrame::Ping => None,
            })
            .filter(|value| value["op"] == op)
            .collect()
    }
}

/// REST transport that must never be reached by regular orders.
struct UnreachableRest;

#[async_trait]
impl RestTransport for UnreachableRest {
    async fn send_signed_request(
        &self,
        _method: HttpMethod,
        path: &str,
        _params: &[(String, String)],
        _body: Option<serde_json::Value>,
    ) -> Result<RestResponse, TransportError> {
        Err(TransportError::Request(format!("unexpected REST call to {path}")))
    }
}

struct Harness {
    ctx: Arc<GatewayContext>,
    events: Arc<RecordingSink>,
    frames: Arc<RecordingFrames>,
    private: Arc<Mutex<ChannelSession>>,
    router: OrderRouter,
}

fn harness() -> Harness {
    let ctx = Arc::new(GatewayContext::new("OKX", okx_gateway::domain::trading::now_reporting()));
    ctx.contracts.insert(Contract {
        symbol: "BTC-USDT".to_string(),
        exchange: Exchange::Okx,
        name: "BTC-USDT".to_string(),
        product: Product::Spot,
        size: Decimal::ONE,
        pricetick: Decimal::new(1, 1),
        min_volume: Decimal::new(1, 5),
        history_data: true,
        net_position: true,
        stop_supported: true,
        gateway_name: "OKX".to_string(),
    });

    let events = Arc::new(RecordingSink::default());
    let frames = Arc::new(RecordingFrames::default());
    let signer = RequestSigner::new(Credentials::new("key", "secret", "pass").unwrap(), false);
    let private = Arc::new(Mutex::new(ChannelSession::private(
        Arc::clone(&ctx),
        Arc::clone(&events) as Arc<dyn EventSink>,
        signer,
        HeartbeatConfig::default(),
    )));

    {
        let mut session = private.lock();
        session
            .on_connected(Arc::clone(&frames) as Arc<dyn FrameSink>)
            .unwrap();
        session.on_frame(r#"{"event":"login","code":"0","msg":""}"#);
        assert!(session.is_ready());
    }

    let router = OrderRouter::new(
        Arc::clone(&ctx),
        Arc::clone(&events) as Arc<dyn EventSink>,
        Arc::clone(&private),
        Arc::new(UnreachableRest),
        RestWorker::new(1),
    );
    events.drain();

    Harness {
        ctx,
        events,
        frames,
        private,
        router,
    }
}

fn order_push(cl_ord_id: &str, state: &str, acc_fill: &str, fill: Option<(&str, &str)>) -> String {
    let (fill_sz, trade_id) = fill.unwrap_or(("0", ""));
    serde_json::json!({
        "arg": {"channel": "orders", "instType": "ANY"},
        "data": [{
            "instId": "BTC-USDT",
            "ordId": "9001",
            "clOrdId": cl_ord_id,
            "side": "buy",
            "ordType": "limit",
            "px": "30000",
            "sz": "0.5",
            "accFillSz": acc_fill,
            "fillSz": fill_sz,
            "fillPx": "30000",
            "tradeId": trade_id,
            "state": state,
            "cTime": "1700000000000",
            "uTime": "1700000001000"
        }]
    })
    .to_string()
}

fn statuses(events: &[GatewayEvent]) -> Vec<Status> {
    events
        .iter()
        .filter_map(GatewayEvent::as_order)
        .map(|order| order.status)
        .collect()
}

#[test]
fn limit_order_runs_from_submit_to_cancel() {
    let h = harness();

    let vt_orderid = h
        .router
        .submit(&OrderRequest {
            symbol: "BTC-USDT".to_string(),
            exchange: Exchange::Okx,
            direction: Direction::Long,
            order_type: OrderType::Limit,
            volume: Decimal::new(5, 1),
            price: Decimal::new(30000, 0),
            offset: None,
            reference: String::new(),
        })
        .unwrap();
    let (gateway, local) = vt_orderid.split_once('.').unwrap();
    assert_eq!(gateway, "OKX");
    assert_eq!(statuses(&h.events.drain()), vec![Status::Submitting]);

    let placed = h.frames.ops("order");
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0]["args"][0]["clOrdId"], local);
    assert_eq!(placed[0]["args"][0]["tdMode"], "cash");
    assert_eq!(h.private.lock().pending_requests(), 1);

    let ack = serde_json::json!({
        "id": placed[0]["id"],
        "op": "order",
        "code": "0",
        "msg": "",
        "data": [{"clOrdId": local, "ordId": "9001", "sCode": "0", "sMsg": ""}]
    });
    h.private.lock().on_frame(&ack.to_string());
    assert_eq!(h.private.lock().pending_requests(), 0);
    assert_eq!(
        h.ctx.registry.resolve_remote(local, IdSpace::Regular),
        Some("9001".to_string())
    );

    h.private
        .lock()
        .on_frame(&order_push(local, "partially_filled", "0.2", Some(("0.2", "t-1"))));
    let events = h.events.drain();
    assert_eq!(statuses(&events), vec![Status::PartTraded]);
    let trade = events.iter().find_map(GatewayEvent::as_trade).unwrap();
    assert_eq!(trade.order_id, local);
    assert_eq!(trade.trade_id, "t-1");
    assert_eq!(trade.volume, Decimal::new(2, 1));

    h.router
        .cancel(&CancelRequest {
            order_id: local.to_string(),
            symbol: "BTC-USDT".to_string(),
            exchange: Exchange::Okx,
        })
        .unwrap();
    let cancels = h.frames.ops("cancel-order");
    assert_eq!(cancels.len(), 1);
    assert_eq!(cancels[0]["args"][0]["clOrdId"], local);
    assert!(cancels[0]["args"][0].get("ordId").is_none());

    h.private
        .lock()
        .on_frame(&order_push(local, "canceled", "0.2", None));
    assert_eq!(statuses(&h.events.drain()), vec![Status::Cancelled]);
    assert!(!h.ctx.orders.get(local).unwrap().is_active());
}

#[test]
fn item_rejection_rejects_the_submitted_order() {
    let h = harness();

    let vt_orderid = h
        .router
        .submit(&OrderRequest {
            symbol: "BTC-USDT".to_string(),
            exchange: Exchange::Okx,
            direction: Direction::Short,
            order_type: OrderType::Market,
            volume: Decimal::ONE,
            price: Decimal::ZERO,
            offset: None,
            reference: String::new(),
        })
        .unwrap();
    let (_, local) = vt_orderid.split_once('.').unwrap();
    let placed = h.frames.ops("order");

    let ack = serde_json::json!({
        "id": placed[0]["id"],
        "op": "order",
        "code": "1",
        "msg": "",
        "data": [{"clOrdId": local, "ordId": "", "sCode": "51008", "sMsg": "Insufficient balance"}]
    });
    h.private.lock().on_frame(&ack.to_string());

    let events = h.events.drain();
    assert_eq!(statuses(&events), vec![Status::Submitting, Status::Rejected]);
    assert_eq!(h.ctx.orders.get(local).unwrap().status, Status::Rejected);
    assert!(events.iter().any(|e| matches!(e, GatewayEvent::Log(_))));
}

#[test]
fn order_placed_elsewhere_is_reported_under_venue_id() {
    let h = harness();

    h.private
        .lock()
        .on_frame(&order_push("", "live", "0", None));

    let order = h.ctx.orders.get("9001").unwrap();
    assert_eq!(order.status, Status::NotTraded);
    assert!(!h.ctx.registry.is_local_origin("9001"));

    h.router
        .cancel(&CancelRequest {
            order_id: "9001".to_string(),
            symbol: "BTC-USDT".to_string(),
            exchange: Exchange::Okx,
        })
        .unwrap();
    let cancels = h.frames.ops("cancel-order");
    assert_eq!(cancels[0]["args"][0]["ordId"], "9001");
}
