//! Simulated fill engine for backtesting (the heart of C5).
//!
//! Grounded on `BackBroker._decide_if_lmt_get_filled` /
//! `_randomize_market_price` in the original source: market orders fill at
//! a randomized price within the half-spread; limit orders fill
//! deterministically once price clears the limit, or probabilistically
//! when price sits exactly at the limit; stop orders convert to
//! market/limit once triggered. Randomness is injected via a seedable RNG
//! so scenarios are reproducible, per the design note that the original's
//! direct use of the process RNG should be replaced.

use super::{commission::Commission, require_kind, Broker, OrderRegister};
use crate::bar::Symbol;
use crate::errors::EngineError;
use crate::money::Money;
use crate::order::{Order, OrderKind};
use crate::position::Position;
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

static BACKTEST_REF_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Construction-time spread/fill-probability parameters for the simulator.
#[derive(Debug, Clone, Copy)]
pub struct FillModelConfig {
    pub ask_bid_spread_floor: f64,
    pub ask_bid_spread_ceiling: f64,
    pub lmt_fill_possibility: f64,
    pub slo_fill_possibility: f64,
}

impl Default for FillModelConfig {
    fn default() -> Self {
        Self {
            ask_bid_spread_floor: 0.0022,
            ask_bid_spread_ceiling: 0.0062,
            lmt_fill_possibility: 0.85,
            slo_fill_possibility: 0.95,
        }
    }
}

pub struct BacktestBroker {
    symbol: Option<Symbol>,
    register: OrderRegister,
    position: Position,
    commission: Commission,
    fill_model: FillModelConfig,
    rng: Mutex<StdRng>,
}

impl BacktestBroker {
    pub fn new(commission: Commission, fill_model: FillModelConfig, seed: u64) -> Self {
        Self {
            symbol: None,
            register: OrderRegister::new(),
            position: Position::new(Symbol::new(""), "USD"),
            commission,
            fill_model,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn half_spread_floor(&self) -> f64 {
        self.fill_model.ask_bid_spread_floor / 2.0
    }

    fn half_spread_ceiling(&self) -> f64 {
        self.fill_model.ask_bid_spread_ceiling / 2.0
    }

    /// `ref_price * (1 +/- U[half_floor, half_ceiling])` — `+` for buys
    /// (ask side), `-` for sells (bid side).
    fn randomize_market_price(&self, ref_price: Money, is_buy: bool) -> Money {
        let mut rng = self.rng.lock().expect("rng mutex poisoned");
        let offset = rng.gen_range(self.half_spread_floor()..=self.half_spread_ceiling());
        if is_buy {
            ref_price.scale(1.0 + offset)
        } else {
            ref_price.scale(1.0 - offset)
        }
    }

    fn roll(&self, possibility: f64) -> bool {
        let mut rng = self.rng.lock().expect("rng mutex poisoned");
        rng.gen_bool(possibility.clamp(0.0, 1.0))
    }

    fn next_broker_ref_id(&self) -> String {
        format!("bt-order-{}", BACKTEST_REF_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    fn submit(&mut self, mut order: Order) -> Result<Order, EngineError> {
        if let Some(symbol) = &self.symbol {
            if *symbol != order.symbol {
                return Err(EngineError::UnmatchedTickerError {
                    order_symbol: order.symbol.0.clone(),
                    broker_symbol: symbol.0.clone(),
                });
            }
        }
        let broker_ref_id = self.next_broker_ref_id();
        order.mark_submitted(broker_ref_id, Utc::now());
        self.register.insert_pending(order.clone())?;
        Ok(order)
    }

    /// Determine whether a limit-type order fills against `ref_price`,
    /// returning `Some(fill_price)` when it does. Sell: `ref_price >
    /// limit_price` fills deterministically at `limit_price`; `ref_price
    /// == limit_price` fills with probability `possibility`. Buy is the
    /// mirror image.
    fn decide_if_limit_gets_filled(&self, order: &Order, ref_price: Money, possibility: f64) -> Option<Money> {
        let limit_price = order.limit_price()?;
        if order.is_buy {
            if ref_price < limit_price {
                Some(limit_price)
            } else if ref_price == limit_price && self.roll(possibility) {
                Some(limit_price)
            } else {
                None
            }
        } else if ref_price > limit_price {
            Some(limit_price)
        } else if ref_price == limit_price && self.roll(possibility) {
            Some(limit_price)
        } else {
            None
        }
    }

    /// Attempt to fill one pending order against `ref_price`. Returns the
    /// updated order (filled or still pending) without mutating the
    /// register; callers stamp the result back via `apply_fill`.
    fn try_fill(&self, order: &Order, ref_price: Money) -> Option<Money> {
        match &order.kind {
            OrderKind::Regular { is_limit: false, .. } => Some(self.randomize_market_price(ref_price, order.is_buy)),
            OrderKind::Regular { is_limit: true, .. } => {
                self.decide_if_limit_gets_filled(order, ref_price, self.fill_model.lmt_fill_possibility)
            }
            OrderKind::Stop { is_stop_limit: false, .. } => {
                if order.is_possibly_triggered(ref_price).ok()? {
                    Some(self.randomize_market_price(ref_price, order.is_buy))
                } else {
                    None
                }
            }
            OrderKind::Stop { is_stop_limit: true, .. } => {
                if order.is_possibly_triggered(ref_price).ok()? {
                    self.decide_if_limit_gets_filled(order, ref_price, self.fill_model.slo_fill_possibility)
                } else {
                    None
                }
            }
        }
    }

    fn apply_fill(&mut self, broker_ref_id: &str, filled_price: Money) -> Result<Order, EngineError> {
        let mut order = self
            .register
            .get_pending(broker_ref_id)
            .cloned()
            .ok_or_else(|| EngineError::PendingOrderNotInPendingList {
                broker_ref_id: broker_ref_id.to_string(),
            })?;
        let transaction_value = filled_price.times(order.size);
        let commission_fee = self.commission.fee_for(transaction_value);
        order.mark_filled(filled_price, order.size, commission_fee, Utc::now());
        self.register.settle(broker_ref_id, order.clone(), Utc::now())?;
        self.position.update(order.is_buy, order.size, filled_price);
        Ok(order)
    }
}

#[async_trait]
impl Broker for BacktestBroker {
    async fn initialize(&mut self, symbol: Symbol, currency: &str) -> Result<(), EngineError> {
        self.symbol = Some(symbol.clone());
        self.position = Position::new(symbol, currency);
        Ok(())
    }

    async fn market_buy(&mut self, mut order: Order) -> Result<Order, EngineError> {
        require_kind(&order, false, false)?;
        order.is_buy = true;
        self.submit(order)
    }

    async fn market_sell(&mut self, mut order: Order) -> Result<Order, EngineError> {
        require_kind(&order, false, false)?;
        order.is_buy = false;
        self.submit(order)
    }

    async fn limit_buy(&mut self, mut order: Order) -> Result<Order, EngineError> {
        require_kind(&order, false, true)?;
        order.is_buy = true;
        self.submit(order)
    }

    async fn limit_sell(&mut self, mut order: Order) -> Result<Order, EngineError> {
        require_kind(&order, false, true)?;
        order.is_buy = false;
        self.submit(order)
    }

    async fn stop_limit_buy(&mut self, mut order: Order) -> Result<Order, EngineError> {
        require_kind(&order, true, true)?;
        order.is_buy = true;
        self.submit(order)
    }

    async fn stop_limit_sell(&mut self, mut order: Order) -> Result<Order, EngineError> {
        require_kind(&order, true, true)?;
        order.is_buy = false;
        self.submit(order)
    }

    async fn stop_loss(&mut self, mut order: Order) -> Result<Order, EngineError> {
        require_kind(&order, true, false)?;
        order.is_buy = false;
        self.submit(order)
    }

    async fn take_profit(&mut self, mut order: Order) -> Result<Order, EngineError> {
        require_kind(&order, false, true)?;
        order.is_buy = false;
        self.submit(order)
    }

    async fn cancel_order(&mut self, broker_ref_id: &str) -> Result<Order, EngineError> {
        let mut order = self
            .register
            .get_pending(broker_ref_id)
            .cloned()
            .ok_or_else(|| EngineError::PendingOrderNotInPendingList {
                broker_ref_id: broker_ref_id.to_string(),
            })?;
        order.mark_canceled();
        self.register.settle(broker_ref_id, order.clone(), Utc::now())?;
        Ok(order)
    }

    async fn update_order(&mut self, broker_ref_id: &str, ref_price: Option<Money>) -> Result<Order, EngineError> {
        let order = self
            .register
            .get_pending(broker_ref_id)
            .cloned()
            .ok_or_else(|| EngineError::PendingOrderNotInPendingList {
                broker_ref_id: broker_ref_id.to_string(),
            })?;
        let Some(ref_price) = ref_price else {
            return Err(EngineError::MissingPrice { price_type: "ref_price" });
        };
        match self.try_fill(&order, ref_price) {
            Some(filled_price) => self.apply_fill(broker_ref_id, filled_price),
            None => Ok(order),
        }
    }

    async fn update_pending_orders(&mut self, ref_price: Option<Money>) -> Result<Vec<Order>, EngineError> {
        let broker_ref_ids: Vec<String> = self
            .register
            .pending_orders()
            .filter_map(|o| o.broker_ref_id.clone())
            .collect();
        let mut results = Vec::with_capacity(broker_ref_ids.len());
        for broker_ref_id in broker_ref_ids {
            results.push(self.update_order(&broker_ref_id, ref_price).await?);
        }
        Ok(results)
    }

    fn position(&self) -> &Position {
        &self.position
    }

    fn remove_settled(&mut self, hours_ago: i64) {
        self.register.remove_settled(hours_ago, Utc::now());
    }

    fn is_live(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Order;

    fn m(v: f64) -> Money {
        Money::from_f64(v)
    }

    fn broker() -> BacktestBroker {
        BacktestBroker::new(Commission::Fixed(m(1.0)), FillModelConfig::default(), 42)
    }

    #[tokio::test]
    async fn market_buy_fills_within_half_spread_bounds() {
        let mut b = broker();
        b.initialize(Symbol::new("AAPL"), "USD").await.unwrap();
        let order = Order::new_regular(Symbol::new("AAPL"), true, 10, m(100.0), false, None);
        let submitted = b.market_buy(order).await.unwrap();
        let filled = b
            .update_order(submitted.broker_ref_id.as_deref().unwrap(), Some(m(100.0)))
            .await
            .unwrap();
        let price = filled.filled_price.unwrap();
        assert!(price >= m(100.0 * 1.0011) && price <= m(100.0 * 1.0031));
        assert_eq!(b.position().size(), 10);
    }

    #[tokio::test]
    async fn stop_sell_triggers_on_next_bar_close() {
        let mut b = broker();
        b.initialize(Symbol::new("AAPL"), "USD").await.unwrap();
        b.position = Position::new(Symbol::new("AAPL"), "USD");
        b.position.open(10, m(100.0));

        let order = Order::new_stop(Symbol::new("AAPL"), false, 10, m(95.0), false, m(95.0), None);
        let submitted = b.stop_loss(order).await.unwrap();
        let filled = b
            .update_order(submitted.broker_ref_id.as_deref().unwrap(), Some(m(94.0)))
            .await
            .unwrap();
        assert_eq!(filled.status, crate::order::OrderStatus::Filled);
        assert_eq!(b.position().size(), 0);
    }

    #[tokio::test]
    async fn limit_sell_fills_deterministically_beyond_limit() {
        let mut b = broker();
        b.initialize(Symbol::new("AAPL"), "USD").await.unwrap();
        let order = Order::new_regular(Symbol::new("AAPL"), false, 10, m(100.0), true, Some(m(100.0)));
        let submitted = b.limit_sell(order).await.unwrap();
        let filled = b
            .update_order(submitted.broker_ref_id.as_deref().unwrap(), Some(m(101.0)))
            .await
            .unwrap();
        assert_eq!(filled.filled_price, Some(m(100.0)));
    }

    #[tokio::test]
    async fn every_order_is_in_exactly_one_register() {
        let mut b = broker();
        b.initialize(Symbol::new("AAPL"), "USD").await.unwrap();
        let order = Order::new_regular(Symbol::new("AAPL"), true, 10, m(100.0), false, None);
        let submitted = b.market_buy(order).await.unwrap();
        assert_eq!(b.register.pending_count(), 1);
        assert_eq!(b.register.settled_count(), 0);
        b.update_order(submitted.broker_ref_id.as_deref().unwrap(), Some(m(100.0)))
            .await
            .unwrap();
        assert_eq!(b.register.pending_count(), 0);
        assert_eq!(b.register.settled_count(), 1);
    }
}
