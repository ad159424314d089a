//! Broker Engine (C5): order submission, pending/settled bookkeeping, and
//! fill simulation (backtest) or external reconciliation (live).

pub mod backtest;
pub mod commission;
pub mod live;

pub use backtest::BacktestBroker;
pub use commission::Commission;
pub use live::LiveBroker;

use crate::errors::EngineError;
use crate::money::Money;
use crate::order::Order;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Pending/settled order bookkeeping shared by both broker variants. Every
/// known order id is in exactly one of the two maps, never both, never
/// neither.
#[derive(Debug, Clone, Default)]
pub struct OrderRegister {
    pending: HashMap<String, Order>,
    settled: HashMap<String, (Order, DateTime<Utc>)>,
}

impl OrderRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly submitted order into the pending register. Fails
    /// if the broker ref id was already used by a settled order.
    pub fn insert_pending(&mut self, order: Order) -> Result<(), EngineError> {
        let broker_ref_id = order
            .broker_ref_id
            .clone()
            .ok_or(EngineError::MissingOrderAttribute {
                client_ref_id: order.client_ref_id.to_string(),
                attribute: "broker_ref_id",
            })?;
        if self.settled.contains_key(&broker_ref_id) {
            return Err(EngineError::PendingOrderNotInPendingList { broker_ref_id });
        }
        self.pending.insert(broker_ref_id, order);
        Ok(())
    }

    pub fn get_pending(&self, broker_ref_id: &str) -> Option<&Order> {
        self.pending.get(broker_ref_id)
    }

    pub fn get_pending_mut(&mut self, broker_ref_id: &str) -> Option<&mut Order> {
        self.pending.get_mut(broker_ref_id)
    }

    pub fn pending_orders(&self) -> impl Iterator<Item = &Order> {
        self.pending.values()
    }

    /// Move an order from pending to settled. Fails if it was not
    /// previously pending — settling an unregistered order is an error,
    /// keeping the two registers linearizable.
    pub fn settle(&mut self, broker_ref_id: &str, order: Order, at: DateTime<Utc>) -> Result<(), EngineError> {
        if self.pending.remove(broker_ref_id).is_none() {
            return Err(EngineError::PendingOrderNotInPendingList {
                broker_ref_id: broker_ref_id.to_string(),
            });
        }
        self.settled.insert(broker_ref_id.to_string(), (order, at));
        Ok(())
    }

    /// Purge settled orders older than `hours_ago`, measured against `now`.
    pub fn remove_settled(&mut self, hours_ago: i64, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::hours(hours_ago);
        self.settled.retain(|_, (_, settled_at)| *settled_at >= cutoff);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn settled_count(&self) -> usize {
        self.settled.len()
    }
}

/// Shared public operations of a Broker, identical in signature for the
/// backtest and live variants. The live implementation performs real
/// network I/O; the backtest implementation resolves synchronously inside
/// the async fn bodies — one trait, two speeds.
#[async_trait::async_trait]
pub trait Broker: Send + Sync {
    /// Resolve `ticker_id` (live: external lookup; back: identity) and
    /// build an empty Position.
    async fn initialize(&mut self, symbol: crate::bar::Symbol, currency: &str) -> Result<(), EngineError>;

    async fn market_buy(&mut self, order: Order) -> Result<Order, EngineError>;
    async fn market_sell(&mut self, order: Order) -> Result<Order, EngineError>;
    async fn limit_buy(&mut self, order: Order) -> Result<Order, EngineError>;
    async fn limit_sell(&mut self, order: Order) -> Result<Order, EngineError>;
    async fn stop_limit_buy(&mut self, order: Order) -> Result<Order, EngineError>;
    async fn stop_limit_sell(&mut self, order: Order) -> Result<Order, EngineError>;
    async fn stop_loss(&mut self, order: Order) -> Result<Order, EngineError>;
    async fn take_profit(&mut self, order: Order) -> Result<Order, EngineError>;

    async fn cancel_order(&mut self, broker_ref_id: &str) -> Result<Order, EngineError>;
    async fn update_order(&mut self, broker_ref_id: &str, ref_price: Option<Money>) -> Result<Order, EngineError>;
    async fn update_pending_orders(&mut self, ref_price: Option<Money>) -> Result<Vec<Order>, EngineError>;

    fn position(&self) -> &crate::position::Position;
    fn remove_settled(&mut self, hours_ago: i64);
    fn is_live(&self) -> bool;
}

/// Validate that a pending-order operation targets an order whose tagged
/// kind matches what the method expects (e.g. `stop_loss` only accepts a
/// non-limit stop order).
pub(crate) fn require_kind(order: &Order, expected_stop: bool, expected_limit: bool) -> Result<(), EngineError> {
    let ok = match (&order.kind, expected_stop) {
        (crate::order::OrderKind::Stop { is_stop_limit, .. }, true) => *is_stop_limit == expected_limit,
        (crate::order::OrderKind::Regular { is_limit, .. }, false) => *is_limit == expected_limit,
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(EngineError::OrderTypeError {
            client_ref_id: order.client_ref_id.to_string(),
            expected: if expected_stop { "stop" } else { "regular" },
            actual: order.kind.label(),
        })
    }
}
