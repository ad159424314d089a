//! Commission model: fixed amount, or percent-of-transaction with optional
//! floor/ceiling clamping.

use crate::money::Money;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Commission {
    Fixed(Money),
    Percent {
        rate: f64,
        floor: Option<Money>,
        ceiling: Option<Money>,
    },
}

impl Commission {
    pub fn fee_for(&self, transaction_value: Money) -> Money {
        match self {
            Commission::Fixed(amount) => *amount,
            Commission::Percent { rate, floor, ceiling } => {
                let mut fee = transaction_value.abs().scale(*rate);
                if let Some(floor) = floor {
                    fee = fee.max(*floor);
                }
                if let Some(ceiling) = ceiling {
                    fee = fee.min(*ceiling);
                }
                fee
            }
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
    fn fixed_commission_ignores_transaction_value() {
        let c = Commission::Fixed(m(5.0));
        assert_eq!(c.fee_for(m(10_000.0)), m(5.0));
        assert_eq!(c.fee_for(m(1.0)), m(5.0));
    }

    #[test]
    fn percent_commission_clamps_to_floor_and_ceiling() {
        let c = Commission::Percent {
            rate: 0.001,
            floor: Some(m(1.0)),
            ceiling: Some(m(50.0)),
        };
        assert_eq!(c.fee_for(m(100.0)), m(1.0)); // below floor
        assert_eq!(c.fee_for(m(100_000.0)), m(50.0)); // above ceiling
        assert_eq!(c.fee_for(m(10_000.0)), m(10.0)); // within bounds
    }
}
