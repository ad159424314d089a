//! Realized/unrealized P&L tracker with average-cost accounting (C2).

use crate::money::Money;
use serde::{Deserialize, Serialize};

/// Running cost-basis and realized/unrealized P&L for one symbol's
/// position. All arithmetic is exact `Money` (decimal) internally; results
/// are rounded to 2 decimals only at the API surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GainLossTracker {
    holding_volume: u64,
    total_sale_volume: u64,
    holding_value: Money,
    total_cost_of_sale: Money,
    total_commission: Money,
    total_sale: Money,
    purchase_count: u64,
    sale_count: u64,
}

impl GainLossTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holding_volume(&self) -> u64 {
        self.holding_volume
    }

    pub fn holding_value(&self) -> Money {
        self.holding_value
    }

    pub fn purchase_count(&self) -> u64 {
        self.purchase_count
    }

    pub fn sale_count(&self) -> u64 {
        self.sale_count
    }

    /// Record a buy: adds to the cost basis and holding volume.
    pub fn add_holding(&mut self, purchase_value: Money, purchase_volume: u64, commission: Money) {
        self.holding_value += purchase_value;
        self.holding_volume += purchase_volume;
        self.total_commission += commission;
        self.purchase_count += 1;
    }

    /// Record a sell using weighted-average cost: the cost-of-sale chunk is
    /// `sale_volume * (holding_value / holding_volume)`, deducted from the
    /// holding value and volume.
    pub fn make_sale(&mut self, sale_value: Money, sale_volume: u64, commission: Money) {
        let cost_of_sale_chunk = if self.holding_volume > 0 {
            self.holding_value.div_by(self.holding_volume).times(sale_volume)
        } else {
            Money::ZERO
        };

        self.holding_value -= cost_of_sale_chunk;
        self.holding_volume = self.holding_volume.saturating_sub(sale_volume);
        self.total_cost_of_sale += cost_of_sale_chunk;
        self.total_sale_volume += sale_volume;
        self.total_sale += sale_value;
        self.total_commission += commission;
        self.sale_count += 1;
    }

    /// `realized = total_sale - total_cost_of_sale - total_commission`,
    /// exactly, rounded to 2 decimals.
    pub fn realized_gain_loss(&self) -> Money {
        (self.total_sale - self.total_cost_of_sale - self.total_commission).round_dp(2)
    }

    /// Zero if no holdings remain, else `holding_volume * market_price -
    /// holding_value`, rounded to 2 decimals.
    pub fn estimate_unrealized(&self, market_price: Money) -> Money {
        if self.holding_volume == 0 {
            Money::ZERO
        } else {
            (market_price.times(self.holding_volume) - self.holding_value).round_dp(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(v: f64) -> Money {
        Money::from_f64(v)
    }

    #[test]
    fn realized_matches_invariant_exactly() {
        let mut t = GainLossTracker::new();
        t.add_holding(m(1000.0), 10, m(1.0));
        t.make_sale(m(1200.0), 10, m(1.5));
        assert_eq!(t.realized_gain_loss(), (m(1200.0) - m(1000.0) - m(2.5)).round_dp(2));
    }

    #[test]
    fn partial_sale_uses_weighted_average_chunk() {
        let mut t = GainLossTracker::new();
        t.add_holding(m(1000.0), 10, Money::ZERO); // cost basis 100/share
        t.make_sale(m(600.0), 5, Money::ZERO); // sells half the holding
        assert_eq!(t.holding_volume(), 5);
        assert_eq!(t.holding_value(), m(500.0));
    }

    #[test]
    fn unrealized_zero_when_no_holdings() {
        let t = GainLossTracker::new();
        assert_eq!(t.estimate_unrealized(m(123.0)), Money::ZERO);
    }

    #[test]
    fn unrealized_reflects_market_price() {
        let mut t = GainLossTracker::new();
        t.add_holding(m(1000.0), 10, Money::ZERO);
        assert_eq!(t.estimate_unrealized(m(110.0)), m(100.0));
    }
}
