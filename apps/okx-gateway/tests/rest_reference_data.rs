//! REST Reference Data Integration Tests
//!
//! Runs candle history and the connect-time bootstrap through the signed
//! `reqwest` client against a local mock venue.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeZone;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use okx_gateway::domain::trading::reporting_offset;
use okx_gateway::infrastructure::okx::{Credentials, OkxRestClient, RequestSigner};
use okx_gateway::{
    EventSink, Exchange, GatewayContext, GatewayEvent, HistoryFetcher, HistoryRequest, Interval,
    LogLevel, Product, ReferenceBootstrap, RestTransport, Status,
};

#[derive(Default)]
struct RecordingSink(Mutex<Vec<GatewayEvent>>);

impl EventSink for RecordingSink {
    fn emit(&self, event: GatewayEvent) {
        self.0.lock().push(event);
    }
}

impl RecordingSink {
    fn errors(&self) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter_map(|event| match event {
                GatewayEvent::Log(record) if record.level == LogLevel::Error => {
                    Some(record.msg.clone())
                }
                _ => None,
            })
            .collect()
    }
}

fn rest_client(server: &MockServer) -> Arc<dyn RestTransport> {
    let signer = RequestSigner::new(Credentials::new("key", "secret", "pass").unwrap(), true);
    Arc::new(OkxRestClient::new(server.uri(), signer, Duration::from_secs(5), None).unwrap())
}

fn ok_body(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(serde_json::json!({"code": "0", "msg": "", "data": data}).to_string())
}

fn candles(rows: &[i64]) -> ResponseTemplate {
    let data: Vec<_> = rows
        .iter()
        .map(|ts| serde_json::json!([ts.to_string(), "100", "110", "90", "105", "7", "0", "0", "1"]))
        .collect();
    ok_body(serde_json::Value::Array(data))
}

// =============================================================================
// History
// =============================================================================

#[tokio::test]
async fn history_walks_pages_until_the_venue_runs_dry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v5/market/candles"))
        .and(query_param("after", "3000"))
        .respond_with(candles(&[3000, 2000]))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v5/market/candles"))
        .and(query_param("after", "2000"))
        .respond_with(candles(&[]))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v5/market/candles"))
        .and(query_param("instId", "BTC-USDT"))
        .and(query_param("bar", "1m"))
        .and(query_param("before", "999"))
        .and(header("x-simulated-trading", "1"))
        .and(header_exists("OK-ACCESS-SIGN"))
        .respond_with(candles(&[5000, 4000, 3000]))
        .expect(1)
        .mount(&server)
        .await;

    let events = Arc::new(RecordingSink::default());
    let fetcher = HistoryFetcher::new(
        "OKX",
        Arc::clone(&events) as Arc<dyn EventSink>,
        rest_client(&server),
    );
    let req = HistoryRequest {
        symbol: "BTC-USDT".to_string(),
        exchange: Exchange::Okx,
        start: reporting_offset().timestamp_millis_opt(1_000).unwrap(),
        end: None,
        interval: Interval::Minute,
    };

    let bars = fetcher.query_history(&req).await.unwrap();

    let stamps: Vec<i64> = bars.iter().map(|bar| bar.datetime.timestamp_millis()).collect();
    assert_eq!(stamps, vec![2000, 3000, 4000, 5000]);
    assert!(bars.iter().all(|bar| bar.close_price == Decimal::new(105, 0)));
    assert!(bars.iter().all(|bar| bar.gateway_name == "OKX"));
    assert!(events.errors().is_empty());
}

#[tokio::test]
async fn history_keeps_bars_fetched_before_a_failed_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v5/market/candles"))
        .and(query_param("after", "4000"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v5/market/candles"))
        .respond_with(candles(&[5000, 4000]))
        .mount(&server)
        .await;

    let events = Arc::new(RecordingSink::default());
    let fetcher = HistoryFetcher::new(
        "OKX",
        Arc::clone(&events) as Arc<dyn EventSink>,
        rest_client(&server),
    );
    let req = HistoryRequest {
        symbol: "ETH-USDT".to_string(),
        exchange: Exchange::Okx,
        start: reporting_offset().timestamp_millis_opt(1_000).unwrap(),
        end: None,
        interval: Interval::Hour,
    };

    let bars = fetcher.query_history(&req).await.unwrap();

    assert_eq!(bars.len(), 2);
    let errors = events.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("500"));
}

// =============================================================================
// Bootstrap
// =============================================================================

#[tokio::test]
async fn bootstrap_loads_contracts_then_working_orders() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v5/public/time"))
        .respond_with(ok_body(serde_json::json!([{"ts": "1700000000000"}])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v5/public/instruments"))
        .and(query_param("instType", "SPOT"))
        .respond_with(ok_body(serde_json::json!([
            {"instId": "BTC-USDT", "instType": "SPOT", "tickSz": "0.1", "minSz": "0.00001", "lever": "10"},
            {"instId": "OKB-USDT", "instType": "SPOT", "tickSz": "0.001", "minSz": "0.1", "lever": ""}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v5/public/instruments"))
        .and(query_param("instType", "SWAP"))
        .respond_with(ok_body(serde_json::json!([
            {"instId": "BTC-USDT-SWAP", "instType": "SWAP", "ctMult": "1", "ctVal": "0.01",
             "tickSz": "0.1", "minSz": "1", "lever": "100"}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v5/public/instruments"))
        .and(query_param("instType", "FUTURES"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"code":"50011","msg":"Rate limit reached","data":[]}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v5/trade/orders-pending"))
        .respond_with(ok_body(serde_json::json!([{
            "instId": "BTC-USDT-SWAP", "ordId": "77", "clOrdId": "", "side": "sell",
            "ordType": "limit", "px": "40000", "sz": "3", "accFillSz": "1", "fillSz": "1", "fillPx": "40000", "tradeId": "12",
            "state": "partially_filled", "cTime": "1700000000000", "uTime": "1700000000000"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = Arc::new(GatewayContext::new("OKX", okx_gateway::domain::trading::now_reporting()));
    let events = Arc::new(RecordingSink::default());
    let bootstrap = ReferenceBootstrap::new(
        Arc::clone(&ctx),
        Arc::clone(&events) as Arc<dyn EventSink>,
        rest_client(&server),
    );

    let report = bootstrap.run().await;

    assert_eq!(report.contracts, 3);
    assert_eq!(report.orders, 1);

    assert!(ctx.contracts.is_margin_spot("BTC-USDT"));
    assert!(!ctx.contracts.is_margin_spot("OKB-USDT"));
    let swap = ctx.contracts.get("BTC-USDT-SWAP").unwrap();
    assert_eq!(swap.product, Product::Swap);
    assert_eq!(swap.size, Decimal::new(1, 2));

    let working = ctx.orders.get("77").unwrap();
    assert_eq!(working.status, Status::PartTraded);
    assert_eq!(working.traded, Decimal::ONE);
    assert!(
        !events
            .0
            .lock()
            .iter()
            .any(|event| matches!(event, GatewayEvent::Trade(_)))
    );

    let errors = events.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("50011"));
}
