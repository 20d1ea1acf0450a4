//! Configuration Module
//!
//! Configuration loading for the gateway binary and its adapters.

mod settings;

pub use settings::{
    ConfigError, GatewayConfig, ProxySettings, RelaySettings, RestSettings, Server,
    ServerSettings, WebSocketSettings,
};
