//! History Fetcher
//!
//! Pages backwards through `GET /api/v5/market/candles`. The venue returns
//! candles newest first, so every page after the first asks for candles older
//! than the previous page's oldest row.
//!
//! # Cursors
//!
//! - `before = start_ms - 1` on every page, so the candle at `start` is kept
//! - `after` = oldest timestamp of the previous page (or `end`, if given, on
//!   the first page)
//!
//! Bars are keyed by open time; a later page overwrites an earlier one, and
//! the result comes back ascending.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use crate::application::ports::{EventSink, HttpMethod, RestTransport};
use crate::domain::events::LogLevel;
use crate::domain::trading::{Bar, HistoryRequest};
use crate::infrastructure::okx::codec::{self, CodecError};
use crate::infrastructure::okx::messages::CandleEnvelope;
use crate::infrastructure::okx::reconcile;

/// Candle endpoint.
pub const HISTORY_PATH: &str = "/api/v5/market/candles";

/// Candles requested per page.
pub const PAGE_LIMIT: usize = 300;

/// Most pages fetched for one request.
pub const MAX_PAGES: usize = 15;

/// History errors.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// The interval has no vendor bar size.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Backward-paginated candle queries.
pub struct HistoryFetcher {
    gateway_name: String,
    events: Arc<dyn EventSink>,
    rest: Arc<dyn RestTransport>,
}

impl HistoryFetcher {
    /// Create a fetcher over `rest`.
    #[must_use]
    pub fn new(
        gateway_name: impl Into<String>,
        events: Arc<dyn EventSink>,
        rest: Arc<dyn RestTransport>,
    ) -> Self {
        Self {
            gateway_name: gateway_name.into(),
            events,
            rest,
        }
    }

    fn log(&self, level: LogLevel, msg: String) {
        reconcile::write_log(self.events.as_ref(), &self.gateway_name, level, msg);
    }

    /// Fetch candles for `req`, ascending and de-duplicated by open time.
    ///
    /// Stops early on a non-2xx status, a transport failure or an empty
    /// page; whatever was gathered until then is returned.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Codec` if the interval cannot be expressed.
    pub async fn query_history(&self, req: &HistoryRequest) -> Result<Vec<Bar>, HistoryError> {
        let bar = codec::interval_to_vendor(req.interval)?;
        let before = (req.start.timestamp_millis() - 1).to_string();
        let mut after = req.end.map(|end| end.timestamp_millis().to_string());
        let mut buf: BTreeMap<DateTime<FixedOffset>, Bar> = BTreeMap::new();

        for _ in 0..MAX_PAGES {
            let mut params = vec![
                ("instId".to_string(), req.symbol.clone()),
                ("bar".to_string(), bar.to_string()),
                ("limit".to_string(), PAGE_LIMIT.to_string()),
                ("before".to_string(), before.clone()),
            ];
            if let Some(cursor) = &after {
                params.push(("after".to_string(), cursor.clone()));
            }

            let resp = match self
                .rest
                .send_signed_request(HttpMethod::Get, HISTORY_PATH, &params, None)
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    self.log(LogLevel::Error, format!("History request failed: {e}"));
                    break;
                }
            };

            if !resp.is_success() {
                self.log(
                    LogLevel::Error,
                    format!(
                        "History request failed, status: {}, body: {}",
                        resp.status, resp.body
                    ),
                );
                break;
            }

            let envelope = match resp.json::<CandleEnvelope>() {
                Ok(envelope) => envelope,
                Err(e) => {
                    self.log(LogLevel::Error, format!("History response malformed: {e}"));
                    break;
                }
            };

            let (Some(newest), Some(oldest)) = (envelope.data.first(), envelope.data.last())
            else {
                tracing::info!(msg = %envelope.msg, "History page empty");
                break;
            };
            let (Some(newest_ts), Some(oldest_ts)) = (newest.first(), oldest.first()) else {
                self.log(
                    LogLevel::Error,
                    format!("History page has a row without timestamp: {}", resp.body),
                );
                break;
            };
            let (newest_ts, oldest_ts) = (newest_ts.clone(), oldest_ts.clone());

            for row in &envelope.data {
                match codec::decode_candle(row, req, &self.gateway_name) {
                    Ok(bar) => {
                        buf.insert(bar.datetime, bar);
                    }
                    Err(e) => tracing::warn!(error = %e, "Skipping malformed candle"),
                }
            }

            let range = codec::parse_timestamp(&oldest_ts)
                .and_then(|from| Ok((from, codec::parse_timestamp(&newest_ts)?)));
            if let Ok((from, to)) = range {
                self.log(
                    LogLevel::Info,
                    format!("History fetched, {} - {bar}, {from} - {to}", req.symbol),
                );
            }

            after = Some(oldest_ts);
        }

        Ok(buf.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use parking_lot::Mutex;

    use super::*;
    use crate::application::ports::{MockRestTransport, NoOpEventSink, RestResponse};
    use crate::domain::trading::{Exchange, Interval, reporting_offset};

    fn page(rows: &[i64]) -> RestResponse {
        let data: Vec<_> = rows
            .iter()
            .map(|ts| vec![ts.to_string(), "1".into(), "2".into(), "0.5".into(), "1.5".into(), "10".into()])
            .collect();
        RestResponse::new(
            200,
            serde_json::json!({"code": "0", "msg": "", "data": data}).to_string(),
        )
    }

    fn request() -> HistoryRequest {
        HistoryRequest {
            symbol: "BTC-USDT".to_string(),
            exchange: Exchange::Okx,
            start: reporting_offset().timestamp_millis_opt(1_000).unwrap(),
            end: None,
            interval: Interval::Minute,
        }
    }

    fn scripted(
        pages: Vec<RestResponse>,
    ) -> (MockRestTransport, Arc<Mutex<Vec<Vec<(String, String)>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);
        let mut pages = pages.into_iter();
        let mut rest = MockRestTransport::new();
        rest.expect_send_signed_request()
            .returning(move |method, path, params, _| {
                assert_eq!(method, HttpMethod::Get);
                assert_eq!(path, HISTORY_PATH);
                recorded.lock().push(params.to_vec());
                Ok(pages.next().unwrap_or_else(|| page(&[])))
            });
        (rest, seen)
    }

    fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[tokio::test]
    async fn pages_backwards_and_deduplicates() {
        let (rest, seen) = scripted(vec![
            page(&[5_000, 4_000, 3_000]),
            page(&[3_000, 2_000]),
            page(&[1_000]),
        ]);
        let fetcher = HistoryFetcher::new("OKX", Arc::new(NoOpEventSink), Arc::new(rest));

        let bars = fetcher.query_history(&request()).await.unwrap();

        let times: Vec<_> = bars.iter().map(|b| b.datetime.timestamp_millis()).collect();
        assert_eq!(times, vec![1_000, 2_000, 3_000, 4_000, 5_000]);

        let seen = seen.lock();
        assert_eq!(seen.len(), 4);
        assert_eq!(param(&seen[0], "before"), Some("999"));
        assert_eq!(param(&seen[0], "after"), None);
        assert_eq!(param(&seen[0], "bar"), Some("1m"));
        assert_eq!(param(&seen[0], "limit"), Some("300"));
        assert_eq!(param(&seen[1], "after"), Some("3000"));
        assert_eq!(param(&seen[2], "after"), Some("2000"));
        assert_eq!(param(&seen[3], "after"), Some("1000"));
    }

    #[tokio::test]
    async fn stops_at_page_cap() {
        let pages = (0..20).map(|i| page(&[100_000 - i * 10])).collect();
        let (rest, seen) = scripted(pages);
        let fetcher = HistoryFetcher::new("OKX", Arc::new(NoOpEventSink), Arc::new(rest));

        let bars = fetcher.query_history(&request()).await.unwrap();

        assert_eq!(bars.len(), MAX_PAGES);
        assert_eq!(seen.lock().len(), MAX_PAGES);
    }

    #[tokio::test]
    async fn stops_on_error_status_keeping_earlier_pages() {
        let (rest, seen) = scripted(vec![
            page(&[3_000, 2_000]),
            RestResponse::new(429, "Too Many Requests"),
            page(&[1_000]),
        ]);
        let fetcher = HistoryFetcher::new("OKX", Arc::new(NoOpEventSink), Arc::new(rest));

        let bars = fetcher.query_history(&request()).await.unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn row_without_timestamp_ends_paging() {
        let (rest, seen) = scripted(vec![
            page(&[3_000, 2_000]),
            RestResponse::new(200, r#"{"code":"0","msg":"","data":[[]]}"#),
            page(&[1_000]),
        ]);
        let fetcher = HistoryFetcher::new("OKX", Arc::new(NoOpEventSink), Arc::new(rest));

        let bars = fetcher.query_history(&request()).await.unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn lone_empty_row_yields_no_bars() {
        let (rest, _) = scripted(vec![RestResponse::new(
            200,
            r#"{"code":"0","msg":"","data":[[]]}"#,
        )]);
        let fetcher = HistoryFetcher::new("OKX", Arc::new(NoOpEventSink), Arc::new(rest));

        let bars = fetcher.query_history(&request()).await.unwrap();

        assert!(bars.is_empty());
    }

    #[tokio::test]
    async fn end_bounds_the_first_page() {
        let (rest, seen) = scripted(vec![]);
        let fetcher = HistoryFetcher::new("OKX", Arc::new(NoOpEventSink), Arc::new(rest));
        let mut req = request();
        req.end = Some(reporting_offset().timestamp_millis_opt(9_000).unwrap());

        let bars = fetcher.query_history(&req).await.unwrap();

        assert!(bars.is_empty());
        assert_eq!(param(&seen.lock()[0], "after"), Some("9000"));
    }
}
