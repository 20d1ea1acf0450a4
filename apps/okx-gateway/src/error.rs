//! Crate Error
//!
//! `GatewayError` wraps the per-layer errors so callers that do not care
//! which layer failed can use one type with `?`.

use crate::application::ports::{RelayError, TransportError};
use crate::application::services::history::HistoryError;
use crate::application::services::router::RouterError;
use crate::domain::identifiers::RegistryError;
use crate::infrastructure::config::ConfigError;
use crate::infrastructure::okx::{
    AuthError, CodecError, RestClientError, SessionError, WsClientError,
};

/// Any gateway failure.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Signing or login failed.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// An identifier pair conflicted.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A channel session refused a request.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// An order or cancel could not be routed.
    #[error("router error: {0}")]
    Router(#[from] RouterError),

    /// A transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A history query failed.
    #[error("history error: {0}")]
    History(#[from] HistoryError),

    /// A relay call failed.
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// The REST client could not be built.
    #[error("REST client error: {0}")]
    RestClient(#[from] RestClientError),

    /// A WebSocket driver stopped.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsClientError),
}
