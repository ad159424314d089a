//! Order sizing by fixed share count or by notional amount (C6 helper).

use crate::errors::EngineError;
use crate::money::Money;
use serde::{Deserialize, Serialize};

/// Resolves an order's share count either from a fixed size or from a
/// notional amount divided by the reference price, clamped by a buy-power
/// ratio. Exactly one of `size`/`amount` is configured; attempting to read
/// the other raises `InputParameterConflict`, matching the mutually
/// exclusive construction guard in the original `Sizer`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Sizer {
    BySize(u64),
    ByAmount(Money),
}

impl Sizer {
    pub fn size(&self) -> Result<u64, EngineError> {
        match self {
            Sizer::BySize(s) => Ok(*s),
            Sizer::ByAmount(_) => Err(EngineError::InputParameterConflict {
                class_name: "Sizer",
                provided_input: "by_amount",
                corresponding_input_types: ("size", "amount"),
                unexpected_corresponding_input: "size",
            }),
        }
    }

    pub fn amount(&self) -> Result<Money, EngineError> {
        match self {
            Sizer::ByAmount(a) => Ok(*a),
            Sizer::BySize(_) => Err(EngineError::InputParameterConflict {
                class_name: "Sizer",
                provided_input: "by_size",
                corresponding_input_types: ("size", "amount"),
                unexpected_corresponding_input: "amount",
            }),
        }
    }

    /// `floor((amount * buy_power_ratio) / ref_price)`. `buy_power_ratio`
    /// greater than 1.0 is clamped to 1.0 with a warning rather than
    /// treated as a hard construction error, since it is supplied per call
    /// rather than at config time. The division itself yields a share
    /// count, not a monetary value, so it drops to `f64` at this single
    /// boundary.
    pub fn size_by_amount(&self, ref_price: Money, buy_power_ratio: f64) -> Result<u64, EngineError> {
        let amount = self.amount()?;
        let ratio = if buy_power_ratio > 1.0 {
            tracing::warn!(buy_power_ratio, "buy_power_ratio > 1.0, clamping to 1.0");
            1.0
        } else {
            buy_power_ratio
        };
        if ref_price.is_zero() {
            return Ok(0);
        }
        Ok((amount.scale(ratio).to_f64() / ref_price.to_f64()).floor() as u64)
    }

    /// Resolve to a concrete size for a given ref price, dispatching on
    /// variant. `buy_power_ratio` is only consulted for the by-amount case.
    pub fn resolve(&self, ref_price: Money, buy_power_ratio: f64) -> Result<u64, EngineError> {
        match self {
            Sizer::BySize(s) => Ok(*s),
            Sizer::ByAmount(_) => self.size_by_amount(ref_price, buy_power_ratio),
        }
    }
}
