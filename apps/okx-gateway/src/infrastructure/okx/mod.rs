//! OKX Adapter
//!
//! Everything venue-specific: wire types, the codec and vocabulary tables,
//! request signing, order reconciliation, the per-channel sessions and the
//! WebSocket and REST transports.
//!
//! # Channels
//!
//! | Channel | Login | Carries |
//! |---------|-------|---------|
//! | public | no | `tickers`, `books5` |
//! | private | yes | `orders`, `account`, `positions`, order and cancel acks |
//! | business | yes | `orders-algo` |

pub mod auth;
pub mod codec;
pub mod heartbeat;
pub mod messages;
pub mod reconcile;
pub mod reconnect;
pub mod rest_client;
pub mod session;
pub mod ws_client;

pub use auth::{AuthError, Credentials, RequestSigner};
pub use codec::{CodecError, InboundFrame, Route};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatState};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use rest_client::{OkxRestClient, RestClientError};
pub use session::{ChannelKind, ChannelSession, SessionError, SessionState, TimerOutcome};
pub use ws_client::{QueuedFrameSink, WsChannelDriver, WsClientError};
