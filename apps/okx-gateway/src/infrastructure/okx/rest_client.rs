//! REST Client
//!
//! `RestTransport` over `reqwest`. Signs each request at send time and
//! returns the raw response; interpreting envelopes is the caller's job.
//!
//! The query string is encoded once and the same bytes are both signed and
//! sent, as are JSON bodies.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, Proxy};

use super::auth::RequestSigner;
use crate::application::ports::{HttpMethod, RestResponse, RestTransport, TransportError};
use crate::infrastructure::config::{GatewayConfig, ProxySettings};

/// Errors building the client.
#[derive(Debug, thiserror::Error)]
pub enum RestClientError {
    /// `reqwest` rejected the configuration.
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Signed REST client for one OKX host.
#[derive(Debug, Clone)]
pub struct OkxRestClient {
    client: Client,
    host: String,
    signer: RequestSigner,
}

impl OkxRestClient {
    /// Create a client for `host`, optionally through an HTTP proxy.
    ///
    /// # Errors
    ///
    /// Returns `RestClientError::Build` if the proxy URL or TLS setup is invalid.
    pub fn new(
        host: impl Into<String>,
        signer: RequestSigner,
        timeout: Duration,
        proxy: Option<&ProxySettings>,
    ) -> Result<Self, RestClientError> {
        let mut builder = Client::builder().timeout(timeout);
        if let Some(proxy) = proxy {
            builder = builder.proxy(Proxy::all(proxy.url())?);
        }

        Ok(Self {
            client: builder.build()?,
            host: host.into(),
            signer,
        })
    }

    /// Create a client from gateway configuration.
    ///
    /// # Errors
    ///
    /// Returns `RestClientError::Build` if the proxy URL or TLS setup is invalid.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, RestClientError> {
        Self::new(
            config.server.rest_host(),
            RequestSigner::new(config.credentials.clone(), config.server.is_simulated()),
            config.rest.timeout,
            config.proxy.as_ref(),
        )
    }

    /// Host requests are sent to.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }
}

/// `path?query` exactly as it is signed and sent.
#[must_use]
pub fn path_with_query(path: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    format!("{path}?{query}")
}

const fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
    }
}

#[async_trait]
impl RestTransport for OkxRestClient {
    async fn send_signed_request(
        &self,
        method: HttpMethod,
        path: &str,
        params: &[(String, String)],
        body: Option<serde_json::Value>,
    ) -> Result<RestResponse, TransportError> {
        let target = path_with_query(path, params);
        let body_text = body
            .map(|value| serde_json::to_string(&value))
            .transpose()
            .map_err(|e| TransportError::Serialization(e.to_string()))?
            .unwrap_or_default();

        let headers = self
            .signer
            .signed_headers(method, &target, &body_text, Utc::now())
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let mut request = self
            .client
            .request(to_method(method), format!("{}{target}", self.host));
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if !body_text.is_empty() {
            request = request.body(body_text);
        }

        tracing::debug!(method = method.as_str(), path = %target, "Sending REST request");

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if !(200..300).contains(&status) {
            tracing::warn!(status, path = %target, "REST request returned non-success status");
        }

        Ok(RestResponse::new(status, text))
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::infrastructure::okx::auth::Credentials;

    fn client(host: &str, simulated: bool) -> OkxRestClient {
        let signer = RequestSigner::new(
            Credentials::new("key123", "secret456", "phrase789").unwrap(),
            simulated,
        );
        OkxRestClient::new(host, signer, Duration::from_secs(5), None).unwrap()
    }

    #[test]
    fn query_is_appended_in_order() {
        let params = vec![
            ("instId".to_string(), "BTC-USDT".to_string()),
            ("bar".to_string(), "1m".to_string()),
        ];
        assert_eq!(
            path_with_query("/api/v5/market/history-candles", &params),
            "/api/v5/market/history-candles?instId=BTC-USDT&bar=1m"
        );
        assert_eq!(path_with_query("/api/v5/public/time", &[]), "/api/v5/public/time");
    }

    #[tokio::test]
    async fn get_is_signed_with_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v5/public/instruments"))
            .and(query_param("instType", "SPOT"))
            .and(header("OK-ACCESS-KEY", "key123"))
            .and(header("OK-ACCESS-PASSPHRASE", "phrase789"))
            .and(header_exists("OK-ACCESS-SIGN"))
            .and(header_exists("OK-ACCESS-TIMESTAMP"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"code":"0","data":[]}"#))
            .expect(1)
            .mount(&server)
            .await;

        let resp = client(&server.uri(), false)
            .send_signed_request(
                HttpMethod::Get,
                "/api/v5/public/instruments",
                &[("instType".to_string(), "SPOT".to_string())],
                None,
            )
            .await
            .unwrap();

        assert!(resp.is_success());
    }

    #[tokio::test]
    async fn post_sends_json_and_demo_header() {
        let server = MockServer::start().await;
        let body = serde_json::json!([{"instId": "BTC-USDT", "algoId": "9"}]);
        Mock::given(method("POST"))
            .and(path("/api/v5/trade/cancel-algos"))
            .and(header("x-simulated-trading", "1"))
            .and(body_json(body.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"code":"0"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let resp = client(&server.uri(), true)
            .send_signed_request(HttpMethod::Post, "/api/v5/trade/cancel-algos", &[], Some(body))
            .await
            .unwrap();

        assert_eq!(resp.status, 200);
    }

    #[tokio::test]
    async fn non_success_status_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("too many"))
            .mount(&server)
            .await;

        let resp = client(&server.uri(), false)
            .send_signed_request(HttpMethod::Get, "/api/v5/public/time", &[], None)
            .await
            .unwrap();

        assert_eq!(resp.status, 429);
        assert_eq!(resp.body, "too many");
    }
}
