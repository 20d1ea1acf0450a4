//! OKX Request Signing and Login
//!
//! Every private REST request and WebSocket login is signed with
//! `base64(HMAC-SHA256(secret, prehash))`.
//!
//! # Prehash Strings
//!
//! - REST: `timestamp + METHOD + path[?query] + body`, where `timestamp` is
//!   UTC ISO-8601 with milliseconds and a trailing `Z`
//! - WebSocket login: `unix_seconds + "GET" + "/users/self/verify"`
//!
//! # Login Flow (private and business channels)
//!
//! 1. Connect to the WebSocket endpoint
//! 2. Send `{"op":"login","args":[{"apiKey","passphrase","timestamp","sign"}]}`
//! 3. Receive `{"event":"login","code":"0"}` or `{"event":"error",...}`
//!
//! # References
//!
//! - [REST Authentication](https://www.okx.com/docs-v5/en/#overview-rest-authentication)
//! - [WebSocket Login](https://www.okx.com/docs-v5/en/#overview-websocket-login)

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use super::messages::{LoginArgs, OpRequest, ResponseCode};
use crate::application::ports::HttpMethod;

type HmacSha256 = Hmac<Sha256>;

// =============================================================================
// Constants
// =============================================================================

/// Path signed by the WebSocket login.
pub const LOGIN_VERIFY_PATH: &str = "/users/self/verify";

/// Header carrying the API key.
pub const HEADER_ACCESS_KEY: &str = "OK-ACCESS-KEY";
/// Header carrying the signature.
pub const HEADER_ACCESS_SIGN: &str = "OK-ACCESS-SIGN";
/// Header carrying the signed timestamp.
pub const HEADER_ACCESS_TIMESTAMP: &str = "OK-ACCESS-TIMESTAMP";
/// Header carrying the passphrase.
pub const HEADER_ACCESS_PASSPHRASE: &str = "OK-ACCESS-PASSPHRASE";
/// Header that routes requests to the demo environment.
pub const HEADER_SIMULATED_TRADING: &str = "x-simulated-trading";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while signing or logging in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// A credential field was empty.
    #[error("credential {0} cannot be empty")]
    EmptyCredential(&'static str),

    /// The secret could not key the HMAC.
    #[error("invalid signing key")]
    InvalidKey,

    /// The venue rejected the login.
    #[error("login rejected ({code}): {message}")]
    LoginRejected {
        /// Venue error code.
        code: String,
        /// Venue error message.
        message: String,
    },
}

// =============================================================================
// Credentials
// =============================================================================

/// OKX API credentials.
///
/// The `Debug` implementation redacts every field for safe logging.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    secret_key: String,
    passphrase: String,
}

impl Credentials {
    /// Create new credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if any field is empty.
    pub fn new(
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let api_key = api_key.into();
        let secret_key = secret_key.into();
        let passphrase = passphrase.into();

        if api_key.is_empty() {
            return Err(AuthError::EmptyCredential("api_key"));
        }
        if secret_key.is_empty() {
            return Err(AuthError::EmptyCredential("secret_key"));
        }
        if passphrase.is_empty() {
            return Err(AuthError::EmptyCredential("passphrase"));
        }

        Ok(Self {
            api_key,
            secret_key,
            passphrase,
        })
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Get the passphrase.
    #[must_use]
    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }

    /// Sign `prehash` with the secret key.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidKey` if the HMAC cannot be keyed.
    pub fn sign(&self, prehash: &str) -> Result<String, AuthError> {
        sign(&self.secret_key, prehash)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("secret_key", &"[REDACTED]")
            .field("passphrase", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Signing
// =============================================================================

/// `base64(HMAC-SHA256(secret, prehash))`.
///
/// # Errors
///
/// Returns `AuthError::InvalidKey` if the HMAC cannot be keyed.
pub fn sign(secret: &str, prehash: &str) -> Result<String, AuthError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidKey)?;
    mac.update(prehash.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// REST timestamp: UTC ISO-8601 with milliseconds and a literal `Z`.
#[must_use]
pub fn rest_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// REST prehash string.
#[must_use]
pub fn rest_prehash(
    timestamp: &str,
    method: HttpMethod,
    path_with_query: &str,
    body: &str,
) -> String {
    format!("{timestamp}{}{path_with_query}{body}", method.as_str())
}

/// Signs REST requests and builds WebSocket logins.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials: Credentials,
    simulated: bool,
}

impl RequestSigner {
    /// Create a signer. `simulated` adds the demo-trading header.
    #[must_use]
    pub const fn new(credentials: Credentials, simulated: bool) -> Self {
        Self {
            credentials,
            simulated,
        }
    }

    /// Whether requests are routed to the demo environment.
    #[must_use]
    pub const fn is_simulated(&self) -> bool {
        self.simulated
    }

    /// Headers for one signed REST request.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidKey` if signing fails.
    pub fn signed_headers(
        &self,
        method: HttpMethod,
        path_with_query: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<(&'static str, String)>, AuthError> {
        let timestamp = rest_timestamp(now);
        let prehash = rest_prehash(&timestamp, method, path_with_query, body);
        let signature = self.credentials.sign(&prehash)?;

        let mut headers = vec![
            (HEADER_ACCESS_KEY, self.credentials.api_key().to_string()),
            (HEADER_ACCESS_SIGN, signature),
            (HEADER_ACCESS_TIMESTAMP, timestamp),
            (
                HEADER_ACCESS_PASSPHRASE,
                self.credentials.passphrase().to_string(),
            ),
            ("Content-Type", "application/json".to_string()),
        ];

        if self.simulated {
            headers.push((HEADER_SIMULATED_TRADING, "1".to_string()));
        }

        Ok(headers)
    }

    /// WebSocket login request signed at `now`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidKey` if signing fails.
    pub fn login_request(&self, now: DateTime<Utc>) -> Result<OpRequest<LoginArgs>, AuthError> {
        let timestamp = now.timestamp().to_string();
        let prehash = format!("{timestamp}GET{LOGIN_VERIFY_PATH}");
        let sign = self.credentials.sign(&prehash)?;

        Ok(OpRequest::new(
            "login",
            vec![LoginArgs {
                api_key: self.credentials.api_key().to_string(),
                passphrase: self.credentials.passphrase().to_string(),
                timestamp,
                sign,
            }],
        ))
    }
}

/// Interpret a login event.
///
/// # Errors
///
/// Returns `AuthError::LoginRejected` unless `code` is the success sentinel.
pub fn check_login(code: Option<&ResponseCode>, msg: &str) -> Result<(), AuthError> {
    match code {
        Some(code) if code.is_success() => Ok(()),
        Some(code) => Err(AuthError::LoginRejected {
            code: code.to_string(),
            message: msg.to_string(),
        }),
        None => Err(AuthError::LoginRejected {
            code: String::new(),
            message: msg.to_string(),
        }),
    }
}
