//! Application Services
//!
//! Use cases built on the ports: order routing, candle history, reference
//! data bootstrap, the relay variant and the `OkxGateway` facade that wires
//! them to the three channel sessions.

pub mod bootstrap;
pub mod gateway;
pub mod history;
pub mod relay;
pub mod rest_worker;
pub mod router;

pub use bootstrap::{BootstrapReport, ReferenceBootstrap};
pub use gateway::{ChannelEndpoints, OkxGateway};
pub use history::{HistoryError, HistoryFetcher};
pub use relay::RelayGateway;
pub use rest_worker::RestWorker;
pub use router::{OrderRouter, RouterError};
