//! Single weighted-average-cost position per symbol (C1).

use crate::bar::Symbol;
use crate::money::Money;
use serde::{Deserialize, Serialize};

/// One position per trading symbol, owned and exclusively mutated by the
/// Broker. Invariants: `size >= 0`; `size == 0 <=> average_buy_price ==
/// 0`; buys update a weighted average; sells leave the average unchanged
/// and clamp the removed quantity to the held size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub ticker_id: Option<String>,
    pub currency: String,
    size: u64,
    average_buy_price: Money,
}

impl Position {
    pub fn new(symbol: Symbol, currency: impl Into<String>) -> Self {
        Self {
            symbol,
            ticker_id: None,
            currency: currency.into(),
            size: 0,
            average_buy_price: Money::ZERO,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn average_buy_price(&self) -> Money {
        self.average_buy_price
    }

    pub fn has_position(&self) -> bool {
        self.size > 0
    }

    /// Seed a fresh position. Panics if called while a position is already
    /// open — callers should check `has_position()` first, matching the
    /// `ItemAlreadyExistError` the original source raises here.
    pub fn open(&mut self, quantity: u64, buy_price: Money) {
        debug_assert!(!self.has_position(), "position already open");
        self.size = quantity;
        self.average_buy_price = buy_price;
    }

    pub fn close(&mut self) {
        self.size = 0;
        self.average_buy_price = Money::ZERO;
    }

    /// Apply a fill: buys extend the weighted-average cost basis, sells
    /// reduce size leaving the average untouched. Sell quantities exceeding
    /// the current size are clamped rather than driving the position
    /// negative.
    pub fn update(&mut self, is_buy: bool, quantity: u64, price: Money) {
        if is_buy {
            self.add(quantity, price);
        } else {
            self.remove(quantity);
        }
    }

    fn add(&mut self, quantity: u64, price: Money) {
        if quantity == 0 {
            return;
        }
        let new_size = self.size + quantity;
        let weighted = self.average_buy_price.times(self.size) + price.times(quantity);
        self.average_buy_price = weighted.div_by(new_size).round_dp(2);
        self.size = new_size;
    }

    fn remove(&mut self, quantity: u64) {
        let clamped = quantity.min(self.size);
        self.size -= clamped;
        if self.size == 0 {
            self.average_buy_price = Money::ZERO;
        }
    }
}
