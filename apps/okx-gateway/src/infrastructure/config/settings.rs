//! Gateway Configuration Settings
//!
//! Configuration types for the OKX gateway, loaded from environment variables.

use std::time::Duration;

use crate::infrastructure::okx::auth::{AuthError, Credentials};

/// Venue environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Server {
    /// Production trading.
    #[default]
    Real,
    /// Demo trading (simulated fills).
    Test,
}

impl Server {
    /// Parse the server from a string; anything but `TEST` is `REAL`.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "TEST" => Self::Test,
            _ => Self::Real,
        }
    }

    /// Whether requests go to the demo environment.
    #[must_use]
    pub const fn is_simulated(&self) -> bool {
        matches!(self, Self::Test)
    }

    /// Server name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Real => "REAL",
            Self::Test => "TEST",
        }
    }

    /// REST host. Both servers share it; demo routing uses a header.
    #[must_use]
    pub const fn rest_host(&self) -> &'static str {
        "https://www.okx.com"
    }

    /// Public market data WebSocket URL.
    #[must_use]
    pub const fn public_ws_url(&self) -> &'static str {
        match self {
            Self::Real => "wss://ws.okx.com:8443/ws/v5/public",
            Self::Test => "wss://wspap.okx.com:8443/ws/v5/public?brokerId=9999",
        }
    }

    /// Private account and order WebSocket URL.
    #[must_use]
    pub const fn private_ws_url(&self) -> &'static str {
        match self {
            Self::Real => "wss://ws.okx.com:8443/ws/v5/private",
            Self::Test => "wss://wspap.okx.com:8443/ws/v5/private?brokerId=9999",
        }
    }

    /// Business (algo order) WebSocket URL.
    #[must_use]
    pub const fn business_ws_url(&self) -> &'static str {
        match self {
            Self::Real => "wss://ws.okx.com:8443/ws/v5/business",
            Self::Test => "wss://wspap.okx.com:8443/ws/v5/business?brokerId=9999",
        }
    }
}

/// HTTP proxy for the REST channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    /// Proxy host.
    pub host: String,
    /// Proxy port.
    pub port: u16,
}

impl ProxySettings {
    /// Proxy URL.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// WebSocket connection settings.
#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    /// Keep-alive ping interval.
    pub heartbeat_interval: Duration,
    /// Time without a pong before the connection is considered dead.
    pub heartbeat_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(30),
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0, // Unlimited
        }
    }
}

/// REST channel settings.
#[derive(Debug, Clone)]
pub struct RestSettings {
    /// Concurrent in-flight requests.
    pub concurrency: usize,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for RestSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

/// Relay server addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    /// Request/reply address.
    pub req_address: String,
    /// Publish/subscribe address.
    pub sub_address: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            req_address: "tcp://127.0.0.1:2014".to_string(),
            sub_address: "tcp://127.0.0.1:4102".to_string(),
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Name stamped on every emitted object.
    pub gateway_name: String,
    /// Venue environment.
    pub server: Server,
    /// API credentials.
    pub credentials: Credentials,
    /// Optional REST proxy.
    pub proxy: Option<ProxySettings>,
    /// Server port settings.
    pub ports: ServerSettings,
    /// WebSocket connection settings.
    pub websocket: WebSocketSettings,
    /// REST channel settings.
    pub rest: RestSettings,
    /// Relay server addresses.
    pub relay: RelaySettings,
}

impl GatewayConfig {
    /// Default gateway name.
    pub const DEFAULT_GATEWAY_NAME: &'static str = "OKX";

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = require(&lookup, "OKX_API_KEY")?;
        let secret_key = require(&lookup, "OKX_SECRET_KEY")?;
        let passphrase = require(&lookup, "OKX_PASSPHRASE")?;
        let credentials = Credentials::new(api_key, secret_key, passphrase)?;

        let server = lookup("OKX_SERVER")
            .map(|s| Server::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let gateway_name = lookup("OKX_GATEWAY_NAME")
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| Self::DEFAULT_GATEWAY_NAME.to_string());

        let proxy = match (lookup("OKX_PROXY_HOST"), lookup("OKX_PROXY_PORT")) {
            (Some(host), Some(port)) if !host.is_empty() => {
                port.parse::<u16>().ok().map(|port| ProxySettings { host, port })
            }
            _ => None,
        };

        let ports = ServerSettings {
            metrics_port: parse_u16(&lookup, "OKX_METRICS_PORT", 0),
        };

        let defaults = WebSocketSettings::default();
        let websocket = WebSocketSettings {
            heartbeat_interval: parse_duration_secs(
                &lookup,
                "OKX_PING_INTERVAL_SECS",
                defaults.heartbeat_interval,
            ),
            heartbeat_timeout: parse_duration_secs(
                &lookup,
                "OKX_PONG_TIMEOUT_SECS",
                defaults.heartbeat_timeout,
            ),
            reconnect_delay_initial: parse_duration_millis(
                &lookup,
                "OKX_RECONNECT_DELAY_INITIAL_MS",
                defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_duration_secs(
                &lookup,
                "OKX_RECONNECT_DELAY_MAX_SECS",
                defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_f64(
                &lookup,
                "OKX_RECONNECT_DELAY_MULTIPLIER",
                defaults.reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: parse_u32(
                &lookup,
                "OKX_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
        };

        let rest_defaults = RestSettings::default();
        let rest = RestSettings {
            concurrency: parse_usize(&lookup, "OKX_REST_CONCURRENCY", rest_defaults.concurrency)
                .max(1),
            timeout: parse_duration_secs(&lookup, "OKX_REST_TIMEOUT_SECS", rest_defaults.timeout),
        };

        let relay_defaults = RelaySettings::default();
        let relay = RelaySettings {
            req_address: lookup("RELAY_REQ_ADDRESS").unwrap_or(relay_defaults.req_address),
            sub_address: lookup("RELAY_SUB_ADDRESS").unwrap_or(relay_defaults.sub_address),
        };

        Ok(Self {
            gateway_name,
            server,
            credentials,
            proxy,
            ports,
            websocket,
            rest,
            relay,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Credentials were rejected.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(#[from] AuthError),
}

fn require<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str) -> Result<String, ConfigError> {
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_u16<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: u16) -> u16 {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_u32<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: u32) -> u32 {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_usize<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: usize) -> usize {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_f64<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: f64) -> f64 {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_duration_secs<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
