//! Relay Gateway
//!
//! Fronts a relay server that multiplexes several downstream gateways. The
//! relay learns which downstream gateway owns each `vt_symbol` from the
//! contract list and routes every request there; everything it publishes
//! carries the relay's own gateway name.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::application::ports::{EventSink, RelayClientPort, RelayError};
use crate::domain::events::{GatewayEvent, LogLevel};
use crate::domain::trading::{Bar, CancelRequest, HistoryRequest, OrderRequest, SubscribeRequest};
use crate::infrastructure::okx::reconcile;

/// Gateway that relays requests to downstream gateways.
pub struct RelayGateway {
    gateway_name: String,
    client: Arc<dyn RelayClientPort>,
    events: Arc<dyn EventSink>,
    symbol_gateways: RwLock<HashMap<String, String>>,
}

impl RelayGateway {
    /// Default relay gateway name.
    pub const DEFAULT_GATEWAY_NAME: &'static str = "RPC";

    /// Create a relay over `client`.
    #[must_use]
    pub fn new(
        gateway_name: impl Into<String>,
        client: Arc<dyn RelayClientPort>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            gateway_name: gateway_name.into(),
            client,
            events,
            symbol_gateways: RwLock::new(HashMap::new()),
        }
    }

    /// Name stamped on relayed objects.
    #[must_use]
    pub fn gateway_name(&self) -> &str {
        &self.gateway_name
    }

    /// Downstream gateway owning `vt_symbol`.
    #[must_use]
    pub fn downstream_for(&self, vt_symbol: &str) -> Option<String> {
        self.symbol_gateways.read().get(vt_symbol).cloned()
    }

    fn log(&self, level: LogLevel, msg: String) {
        reconcile::write_log(self.events.as_ref(), &self.gateway_name, level, msg);
    }

    fn route(&self, vt_symbol: &str) -> Result<String, RelayError> {
        self.downstream_for(vt_symbol).ok_or_else(|| {
            self.log(
                LogLevel::Warn,
                format!("No downstream gateway for {vt_symbol}"),
            );
            RelayError::UnknownSymbol(vt_symbol.to_string())
        })
    }

    /// Load reference data from the relay server.
    pub async fn connect(&self) {
        self.log(
            LogLevel::Info,
            "Relay server connected, loading reference data".to_string(),
        );
        self.query_all().await;
    }

    /// Subscribe market data on the owning downstream gateway.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::UnknownSymbol` if no contract maps the symbol, or
    /// `RelayError::Rpc` if the call fails.
    pub async fn subscribe(&self, req: SubscribeRequest) -> Result<(), RelayError> {
        let downstream = self.route(&req.vt_symbol())?;
        self.client.subscribe(req, &downstream).await
    }

    /// Place an order and return its id under the relay's gateway name.
    ///
    /// An empty id from the downstream gateway is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::UnknownSymbol` or `RelayError::Rpc`.
    pub async fn send_order(&self, req: OrderRequest) -> Result<String, RelayError> {
        let downstream = self.route(&req.vt_symbol())?;
        let vt_orderid = self.client.send_order(req, &downstream).await?;
        Ok(self.restamp_order_id(&vt_orderid))
    }

    fn restamp_order_id(&self, vt_orderid: &str) -> String {
        if vt_orderid.is_empty() {
            return String::new();
        }
        let order_id = vt_orderid
            .split_once('.')
            .map_or(vt_orderid, |(_, id)| id);
        format!("{}.{order_id}", self.gateway_name)
    }

    /// Cancel one order on the owning downstream gateway.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::UnknownSymbol` or `RelayError::Rpc`.
    pub async fn cancel_order(&self, req: CancelRequest) -> Result<(), RelayError> {
        let downstream = self.route(&req.vt_symbol())?;
        self.client.cancel_order(req, &downstream).await
    }

    /// Cancel several orders, one call per downstream gateway.
    ///
    /// Groups keep the order in which each gateway was first seen. Unroutable
    /// requests are logged and dropped; the remaining groups are still sent.
    ///
    /// # Errors
    ///
    /// Returns the first `RelayError::Rpc` after every group was attempted.
    pub async fn cancel_orders(&self, reqs: Vec<CancelRequest>) -> Result<(), RelayError> {
        let mut groups: Vec<(String, Vec<CancelRequest>)> = Vec::new();
        for req in reqs {
            let Ok(downstream) = self.route(&req.vt_symbol()) else {
                continue;
            };
            match groups.iter_mut().find(|(name, _)| *name == downstream) {
                Some((_, group)) => group.push(req),
                None => groups.push((downstream, vec![req])),
            }
        }

        let mut first_error = None;
        for (downstream, group) in groups {
            if let Err(e) = self.client.cancel_orders(group, &downstream).await {
                self.log(
                    LogLevel::Error,
                    format!("Cancel on {downstream} failed: {e}"),
                );
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Fetch candle history from the owning downstream gateway.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::UnknownSymbol` or `RelayError::Rpc`.
    pub async fn query_history(&self, req: HistoryRequest) -> Result<Vec<Bar>, RelayError> {
        let downstream = self.route(&req.vt_symbol())?;
        let mut bars = self.client.query_history(req, &downstream).await?;
        for bar in &mut bars {
            bar.gateway_name.clone_from(&self.gateway_name);
        }
        Ok(bars)
    }

    /// Re-emit the relay server's contracts, accounts, positions, orders and
    /// trades under the relay's name. A failed query is logged and skipped.
    pub async fn query_all(&self) {
        match self.client.get_all_contracts().await {
            Ok(contracts) => {
                {
                    let mut map = self.symbol_gateways.write();
                    for contract in &contracts {
                        map.insert(contract.vt_symbol(), contract.gateway_name.clone());
                    }
                }
                for contract in contracts {
                    self.on_event(GatewayEvent::Contract(Box::new(contract)));
                }
                self.log(LogLevel::Info, "Contracts loaded".to_string());
            }
            Err(e) => self.log(LogLevel::Error, format!("Contract query failed: {e}")),
        }

        match self.client.get_all_accounts().await {
            Ok(accounts) => {
                for account in accounts {
                    self.on_event(GatewayEvent::Account(account));
                }
                self.log(LogLevel::Info, "Accounts loaded".to_string());
            }
            Err(e) => self.log(LogLevel::Error, format!("Account query failed: {e}")),
        }

        match self.client.get_all_positions().await {
            Ok(positions) => {
                for position in positions {
                    self.on_event(GatewayEvent::Position(position));
                }
                self.log(LogLevel::Info, "Positions loaded".to_string());
            }
            Err(e) => self.log(LogLevel::Error, format!("Position query failed: {e}")),
        }

        match self.client.get_all_orders().await {
            Ok(orders) => {
                for order in orders {
                    self.on_event(GatewayEvent::Order(Box::new(order)));
                }
                self.log(LogLevel::Info, "Orders loaded".to_string());
            }
            Err(e) => self.log(LogLevel::Error, format!("Order query failed: {e}")),
        }

        match self.client.get_all_trades().await {
            Ok(trades) => {
                for trade in trades {
                    self.on_event(GatewayEvent::Trade(Box::new(trade)));
                }
                self.log(LogLevel::Info, "Trades loaded".to_string());
            }
            Err(e) => self.log(LogLevel::Error, format!("Trade query failed: {e}")),
        }
    }

    /// Publish an object pushed by the relay server under the relay's name.
    pub fn on_event(&self, mut event: GatewayEvent) {
        event.set_gateway_name(&self.gateway_name);
        self.events.emit(event);
    }
}
