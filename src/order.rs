//! Order state machine and the tagged Regular/Stop order model (C1).

use crate::bar::Symbol;
use crate::errors::EngineError;
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically increasing client-minted idempotency key.
pub type ClientRefId = u64;

static CLIENT_REF_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Mint the next client ref id. Lock-free, safe to call from any thread.
pub fn next_client_ref_id() -> ClientRefId {
    CLIENT_REF_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Order status domain. Terminal ("settled") = `{Filled, Canceled, Rejected,
/// Expired}`. Deactivated (settled but unfilled) = `{Canceled, Rejected,
/// Expired}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Created,
    Submitted,
    Accepted,
    PartiallyFilled,
    Filled,
    Canceled,
    Expired,
    Rejected,
    New,
    Pending,
    Other,
}

impl OrderStatus {
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }

    pub fn is_deactivated(&self) -> bool {
        matches!(self, OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired)
    }

    /// Translate a broker-native status string to the internal enum, per
    /// the live-broker status mapping: `submitted→Submitted,
    /// posted→Filled, cancelled→Canceled, expired→Expired, new→New,
    /// cancelling→Pending, anything else→Other`.
    pub fn from_broker_status(raw: &str) -> Self {
        match raw {
            "submitted" => OrderStatus::Submitted,
            "posted" => OrderStatus::Filled,
            "cancelled" => OrderStatus::Canceled,
            "expired" => OrderStatus::Expired,
            "new" => OrderStatus::New,
            "cancelling" => OrderStatus::Pending,
            _ => OrderStatus::Other,
        }
    }
}

/// The tag distinguishing a plain (market/limit) order from a stop order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderKind {
    Regular { is_limit: bool, limit_price: Option<Money> },
    Stop {
        is_stop_limit: bool,
        stop_price: Money,
        limit_price: Option<Money>,
    },
}

impl OrderKind {
    pub fn label(&self) -> &'static str {
        match self {
            OrderKind::Regular { is_limit: false, .. } => "market",
            OrderKind::Regular { is_limit: true, .. } => "limit",
            OrderKind::Stop { is_stop_limit: false, .. } => "stop",
            OrderKind::Stop { is_stop_limit: true, .. } => "stop_limit",
        }
    }
}

/// An order, created by the Strategy and exclusively mutated by the Broker
/// once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub client_ref_id: ClientRefId,
    pub broker_ref_id: Option<String>,
    pub symbol: Symbol,
    pub ticker_id: Option<String>,
    pub size: u64,
    pub is_buy: bool,
    pub ref_price: Money,
    pub status: OrderStatus,
    pub kind: OrderKind,
    pub created_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
    pub filled_price: Option<Money>,
    pub fill_quantity: Option<u64>,
    pub transaction_value: Option<Money>,
    pub commission_fee: Option<Money>,
    pub is_broker_settled: bool,
}

impl Order {
    pub fn new_regular(
        symbol: Symbol,
        is_buy: bool,
        size: u64,
        ref_price: Money,
        is_limit: bool,
        limit_price: Option<Money>,
    ) -> Self {
        Self {
            client_ref_id: next_client_ref_id(),
            broker_ref_id: None,
            symbol,
            ticker_id: None,
            size,
            is_buy,
            ref_price,
            status: OrderStatus::Created,
            kind: OrderKind::Regular { is_limit, limit_price },
            created_at: Utc::now(),
            filled_at: None,
            filled_price: None,
            fill_quantity: None,
            transaction_value: None,
            commission_fee: None,
            is_broker_settled: false,
        }
    }

    pub fn new_stop(
        symbol: Symbol,
        is_buy: bool,
        size: u64,
        ref_price: Money,
        is_stop_limit: bool,
        stop_price: Money,
        limit_price: Option<Money>,
    ) -> Self {
        Self {
            client_ref_id: next_client_ref_id(),
            broker_ref_id: None,
            symbol,
            ticker_id: None,
            size,
            is_buy,
            ref_price,
            status: OrderStatus::Created,
            kind: OrderKind::Stop {
                is_stop_limit,
                stop_price,
                limit_price,
            },
            created_at: Utc::now(),
            filled_at: None,
            filled_price: None,
            fill_quantity: None,
            transaction_value: None,
            commission_fee: None,
            is_broker_settled: false,
        }
    }

    pub fn is_market_order(&self) -> bool {
        matches!(self.kind, OrderKind::Regular { is_limit: false, .. })
    }

    pub fn is_limit_order(&self) -> bool {
        matches!(self.kind, OrderKind::Regular { is_limit: true, .. })
    }

    pub fn is_stop_order(&self) -> bool {
        matches!(self.kind, OrderKind::Stop { .. })
    }

    pub fn is_stop_limit_order(&self) -> bool {
        matches!(self.kind, OrderKind::Stop { is_stop_limit: true, .. })
    }

    pub fn limit_price(&self) -> Option<Money> {
        match &self.kind {
            OrderKind::Regular { limit_price, .. } => *limit_price,
            OrderKind::Stop { limit_price, .. } => *limit_price,
        }
    }

    /// The stop price of a Stop order. Returns `None` for a Regular order.
    ///
    /// Deliberately returns the stop price, not the limit price — one
    /// revision of the original source swapped these.
    pub fn stop_price(&self) -> Option<Money> {
        match &self.kind {
            OrderKind::Stop { stop_price, .. } => Some(*stop_price),
            OrderKind::Regular { .. } => None,
        }
    }

    /// For a Stop order, whether `ref_price` would trigger it: a sell stop
    /// triggers when `ref_price <= stop_price`; a buy stop triggers when
    /// `ref_price >= stop_price`.
    pub fn is_possibly_triggered(&self, ref_price: Money) -> Result<bool, EngineError> {
        let stop_price = self.stop_price().ok_or(EngineError::OrderTypeError {
            client_ref_id: self.client_ref_id.to_string(),
            expected: "stop",
            actual: "regular",
        })?;
        Ok(if self.is_buy {
            ref_price >= stop_price
        } else {
            ref_price <= stop_price
        })
    }

    pub fn mark_submitted(&mut self, broker_ref_id: String, created_at: DateTime<Utc>) {
        self.broker_ref_id = Some(broker_ref_id);
        self.created_at = created_at;
        self.status = OrderStatus::Submitted;
    }

    pub fn mark_filled(
        &mut self,
        filled_price: Money,
        fill_quantity: u64,
        commission_fee: Money,
        filled_at: DateTime<Utc>,
    ) {
        self.filled_price = Some(filled_price);
        self.fill_quantity = Some(fill_quantity);
        self.transaction_value = Some(filled_price.times(fill_quantity));
        self.commission_fee = Some(commission_fee);
        self.filled_at = Some(filled_at);
        self.status = OrderStatus::Filled;
        self.is_broker_settled = true;
    }

    pub fn mark_canceled(&mut self) {
        self.status = OrderStatus::Canceled;
        self.is_broker_settled = true;
    }

    pub fn mark_rejected(&mut self) {
        self.status = OrderStatus::Rejected;
        self.is_broker_settled = true;
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Order(client_ref_id={}, broker_ref_id={:?}, symbol={}, kind={}, is_buy={}, size={}, status={:?}, filled_price={:?})",
            self.client_ref_id,
            self.broker_ref_id,
            self.symbol,
            self.kind.label(),
            self.is_buy,
            self.size,
            self.status,
            self.filled_price,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym() -> Symbol {
        Symbol::new("AAPL")
    }

    fn m(v: f64) -> Money {
        Money::from_f64(v)
    }

    #[test]
    fn sell_stop_triggers_when_ref_price_at_or_below_stop() {
        let order = Order::new_stop(sym(), false, 10, m(100.0), false, m(95.0), None);
        assert!(order.is_possibly_triggered(m(95.0)).unwrap());
        assert!(order.is_possibly_triggered(m(94.0)).unwrap());
        assert!(!order.is_possibly_triggered(m(95.01)).unwrap());
    }

    #[test]
    fn buy_stop_triggers_when_ref_price_at_or_above_stop() {
        let order = Order::new_stop(sym(), true, 10, m(100.0), false, m(105.0), None);
        assert!(order.is_possibly_triggered(m(105.0)).unwrap());
        assert!(order.is_possibly_triggered(m(106.0)).unwrap());
        assert!(!order.is_possibly_triggered(m(104.99)).unwrap());
    }

    #[test]
    fn regular_order_has_no_stop_price() {
        let order = Order::new_regular(sym(), true, 10, m(100.0), true, Some(m(99.0)));
        assert_eq!(order.stop_price(), None);
        assert!(order.is_possibly_triggered(m(100.0)).is_err());
    }

    #[test]
    fn status_settled_and_deactivated_sets() {
        assert!(OrderStatus::Filled.is_settled());
        assert!(!OrderStatus::Filled.is_deactivated());
        assert!(OrderStatus::Canceled.is_settled());
        assert!(OrderStatus::Canceled.is_deactivated());
        assert!(!OrderStatus::Submitted.is_settled());
    }

    #[test]
    fn broker_status_translation() {
        assert_eq!(OrderStatus::from_broker_status("submitted"), OrderStatus::Submitted);
        assert_eq!(OrderStatus::from_broker_status("posted"), OrderStatus::Filled);
        assert_eq!(OrderStatus::from_broker_status("cancelled"), OrderStatus::Canceled);
        assert_eq!(OrderStatus::from_broker_status("expired"), OrderStatus::Expired);
        assert_eq!(OrderStatus::from_broker_status("new"), OrderStatus::New);
        assert_eq!(OrderStatus::from_broker_status("cancelling"), OrderStatus::Pending);
        assert_eq!(OrderStatus::from_broker_status("weird"), OrderStatus::Other);
    }
}
