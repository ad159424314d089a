//! Live broker boundary.
//!
//! The transport (HTTP client, authentication, OAuth refresh) is an
//! external collaborator per scope — this module only defines the shape a
//! live implementation takes: an authenticated session plus the same
//! `CircuitBreaker`/`RateLimiter` fault-tolerance stack every outbound
//! call in this crate is expected to be wrapped in.

use super::{Broker, OrderRegister};
use crate::bar::Symbol;
use crate::common::{CircuitBreaker, CircuitBreakerConfig, RateLimiter};
use crate::errors::EngineError;
use crate::money::Money;
use crate::order::Order;
use crate::position::Position;
use async_trait::async_trait;
use std::sync::Mutex;

/// Extra surface a live broker exposes beyond the shared `Broker` trait:
/// trading-account binding, buying power, and a pending-orders query
/// filtered by side.
#[async_trait]
pub trait LiveBrokerExt: Broker {
    async fn set_trading_account(&mut self, account_id: &str) -> Result<(), EngineError>;
    async fn buying_power(&self) -> Result<Money, EngineError>;
    async fn get_pending_orders(&self, is_buy: Option<bool>) -> Result<Vec<Order>, EngineError>;
}

/// Skeleton live broker: owns the circuit-breaker/rate-limiter pair every
/// transport call should go through, and the pending/settled registers,
/// but has no concrete HTTP client wired in — that client is supplied by
/// the embedding application.
pub struct LiveBroker {
    symbol: Option<Symbol>,
    trading_account_id: Option<String>,
    register: OrderRegister,
    position: Position,
    circuit_breaker: Mutex<CircuitBreaker>,
    rate_limiter: RateLimiter,
}

impl LiveBroker {
    pub fn new(circuit_breaker_config: CircuitBreakerConfig, rate_limiter: RateLimiter) -> Self {
        Self {
            symbol: None,
            trading_account_id: None,
            register: OrderRegister::new(),
            position: Position::new(Symbol::new(""), "USD"),
            circuit_breaker: Mutex::new(CircuitBreaker::new(circuit_breaker_config)),
            rate_limiter,
        }
    }

    /// Gate a transport call behind the rate limiter and circuit breaker,
    /// matching the pattern `coindcx::Client` uses around its HTTP calls.
    async fn guarded<F, Fut, T>(&self, call: F) -> Result<T, EngineError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, EngineError>>,
    {
        {
            let mut cb = self.circuit_breaker.lock().expect("circuit breaker mutex poisoned");
            if !cb.can_attempt() {
                return Err(EngineError::OrderPlacingError {
                    reason: "circuit breaker open".to_string(),
                });
            }
        }
        self.rate_limiter.acquire().await;
        let result = call().await;
        let mut cb = self.circuit_breaker.lock().expect("circuit breaker mutex poisoned");
        match &result {
            Ok(_) => cb.record_success(),
            Err(_) => cb.record_failure(),
        }
        result
    }

    fn unimplemented_transport(&self, op: &'static str) -> EngineError {
        EngineError::OrderPlacingError {
            reason: format!("live transport for `{op}` is an external collaborator, not implemented here"),
        }
    }
}

#[async_trait]
impl Broker for LiveBroker {
    async fn initialize(&mut self, symbol: Symbol, currency: &str) -> Result<(), EngineError> {
        self.symbol = Some(symbol.clone());
        self.position = Position::new(symbol, currency);
        Ok(())
    }

    async fn market_buy(&mut self, _order: Order) -> Result<Order, EngineError> {
        Err(self.unimplemented_transport("market_buy"))
    }

    async fn market_sell(&mut self, _order: Order) -> Result<Order, EngineError> {
        Err(self.unimplemented_transport("market_sell"))
    }

    async fn limit_buy(&mut self, _order: Order) -> Result<Order, EngineError> {
        Err(self.unimplemented_transport("limit_buy"))
    }

    async fn limit_sell(&mut self, _order: Order) -> Result<Order, EngineError> {
        Err(self.unimplemented_transport("limit_sell"))
    }

    async fn stop_limit_buy(&mut self, _order: Order) -> Result<Order, EngineError> {
        Err(self.unimplemented_transport("stop_limit_buy"))
    }

    async fn stop_limit_sell(&mut self, _order: Order) -> Result<Order, EngineError> {
        Err(self.unimplemented_transport("stop_limit_sell"))
    }

    async fn stop_loss(&mut self, _order: Order) -> Result<Order, EngineError> {
        Err(self.unimplemented_transport("stop_loss"))
    }

    async fn take_profit(&mut self, _order: Order) -> Result<Order, EngineError> {
        Err(self.unimplemented_transport("take_profit"))
    }

    async fn cancel_order(&mut self, _broker_ref_id: &str) -> Result<Order, EngineError> {
        Err(self.unimplemented_transport("cancel_order"))
    }

    async fn update_order(&mut self, broker_ref_id: &str, _ref_price: Option<Money>) -> Result<Order, EngineError> {
        self.register
            .get_pending(broker_ref_id)
            .cloned()
            .ok_or_else(|| EngineError::PendingOrderNotInPendingList {
                broker_ref_id: broker_ref_id.to_string(),
            })
    }

    async fn update_pending_orders(&mut self, _ref_price: Option<Money>) -> Result<Vec<Order>, EngineError> {
        Ok(self.register.pending_orders().cloned().collect())
    }

    fn position(&self) -> &Position {
        &self.position
    }

    fn remove_settled(&mut self, hours_ago: i64) {
        self.register.remove_settled(hours_ago, chrono::Utc::now());
    }

    fn is_live(&self) -> bool {
        true
    }
}

#[async_trait]
impl LiveBrokerExt for LiveBroker {
    async fn set_trading_account(&mut self, account_id: &str) -> Result<(), EngineError> {
        self.trading_account_id = Some(account_id.to_string());
        Ok(())
    }

    async fn buying_power(&self) -> Result<Money, EngineError> {
        Err(self.unimplemented_transport("buying_power"))
    }

    async fn get_pending_orders(&self, is_buy: Option<bool>) -> Result<Vec<Order>, EngineError> {
        Ok(self
            .register
            .pending_orders()
            .filter(|o| is_buy.map_or(true, |want| o.is_buy == want))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_trading_account_stores_id() {
        let mut broker = LiveBroker::new(CircuitBreakerConfig::default(), RateLimiter::with_defaults());
        broker.set_trading_account("acct-1").await.unwrap();
        assert_eq!(broker.trading_account_id.as_deref(), Some("acct-1"));
    }

    #[tokio::test]
    async fn is_live_is_true() {
        let broker = LiveBroker::new(CircuitBreakerConfig::default(), RateLimiter::with_defaults());
        assert!(broker.is_live());
    }
}
