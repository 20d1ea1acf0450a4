//! Gateway Events
//!
//! Everything the gateway reports to the trading engine flows through one
//! enum so a single consumer can fan it out.

use serde::{Deserialize, Serialize};

use crate::domain::trading::{Account, Contract, Order, Position, Tick, Trade};

/// Severity of a gateway log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// Informational.
    Info,
    /// Recoverable problem.
    Warn,
    /// Failed request or rejected order.
    Error,
}

/// Human-readable gateway diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Severity.
    pub level: LogLevel,
    /// Message text.
    pub msg: String,
    /// Originating gateway.
    pub gateway_name: String,
}

/// A normalized object emitted to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayEvent {
    /// Order state change.
    Order(Box<Order>),
    /// New fill.
    Trade(Box<Trade>),
    /// Instrument metadata.
    Contract(Box<Contract>),
    /// Balance update.
    Account(Account),
    /// Position update.
    Position(Position),
    /// Market data snapshot.
    Tick(Box<Tick>),
    /// Diagnostic.
    Log(LogRecord),
}

impl GatewayEvent {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Order(_) => "order",
            Self::Trade(_) => "trade",
            Self::Contract(_) => "contract",
            Self::Account(_) => "account",
            Self::Position(_) => "position",
            Self::Tick(_) => "tick",
            Self::Log(_) => "log",
        }
    }

    /// Order payload, if this is an order event.
    #[must_use]
    pub fn as_order(&self) -> Option<&Order> {
        match self {
            Self::Order(order) => Some(order),
            _ => None,
        }
    }

    /// Trade payload, if this is a trade event.
    #[must_use]
    pub fn as_trade(&self) -> Option<&Trade> {
        match self {
            Self::Trade(trade) => Some(trade),
            _ => None,
        }
    }

    /// Re-stamp the originating gateway on the payload.
    pub fn set_gateway_name(&mut self, gateway_name: &str) {
        let name = gateway_name.to_string();
        match self {
            Self::Order(order) => order.gateway_name = name,
            Self::Trade(trade) => trade.gateway_name = name,
            Self::Contract(contract) => contract.gateway_name = name,
            Self::Account(account) => account.gateway_name = name,
            Self::Position(position) => position.gateway_name = name,
            Self::Tick(tick) => tick.gateway_name = name,
            Self::Log(record) => record.gateway_name = name,
        }
    }
}
