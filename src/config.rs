//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable support for broker credentials.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::bar::{IntervalOption, Symbol};
use crate::driver::{TradeConfig, TradingDurationType};
use crate::errors::EngineError;
use crate::money::Money;
use crate::sizer::Sizer;
use crate::stop_pricer::{self, StopPricerConfig, Threshold};

/// Top-level configuration for one `Trade`. Mirrors `TradeConfig` plus the
/// sizer and stop-pricer knobs, in the raw (percent-or-amount, JSON-facing)
/// shape that gets resolved into their strongly-typed counterparts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub symbol: String,
    pub currency: String,
    pub exchange: String,
    pub interval: String,
    #[serde(default = "default_duration_type")]
    pub duration_type: String,
    pub reps_limit: u32,
    #[serde(default = "default_buy_power_ratio")]
    pub buy_power_ratio: f64,
    #[serde(default)]
    pub data_delay_seconds: i64,
    #[serde(default = "default_settled_order_retention_hours")]
    pub settled_order_retention_hours: i64,
    #[serde(default = "default_reconcile_attempts")]
    pub reconcile_attempts: u32,
    pub sizer: SizerConfig,
    pub stop_pricer: StopPricerRawConfig,
    #[serde(default)]
    pub broker: BrokerCredentials,
}

fn default_duration_type() -> String {
    "gtc".to_string()
}

fn default_buy_power_ratio() -> f64 {
    0.95
}

fn default_settled_order_retention_hours() -> i64 {
    24
}

fn default_reconcile_attempts() -> u32 {
    3
}

/// Mutually exclusive sizer source, matching `Sizer`'s by-size/by-amount
/// variants one-to-one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizerConfig {
    pub size: Option<u64>,
    pub amount: Option<f64>,
}

/// Percent-or-amount pair for a single `Threshold` knob, as it appears in
/// the JSON source before `require_exactly_one` resolves it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ThresholdSource {
    pub percent: Option<f64>,
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopPricerRawConfig {
    pub is_buy: bool,
    pub trail: ThresholdSource,
    pub anchor_increase: ThresholdSource,
    #[serde(default)]
    pub stop_limit_gap: Option<ThresholdSource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerCredentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    #[serde(default)]
    pub trading_account_id: Option<String>,
}

impl EngineConfig {
    /// Load configuration from a JSON file, layering broker credentials
    /// from the environment over whatever the file itself carries.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("failed to read config file")?;
        let mut config: EngineConfig = serde_json::from_str(&contents).context("failed to parse config JSON")?;

        if let Ok(api_key) = std::env::var("BROKER_API_KEY") {
            config.broker.api_key = Some(api_key);
        }
        if let Ok(api_secret) = std::env::var("BROKER_API_SECRET") {
            config.broker.api_secret = Some(api_secret);
        }

        Ok(config)
    }

    pub fn symbol(&self) -> Symbol {
        Symbol::new(self.symbol.clone())
    }

    pub fn interval(&self) -> Result<IntervalOption, EngineError> {
        IntervalOption::from_code(&self.interval).ok_or_else(|| EngineError::ValueNotPresent {
            class_name: "EngineConfig",
            field: "interval",
            provided: self.interval.clone(),
            accepted: IntervalOption::ALL.iter().map(|i| i.code()).collect(),
        })
    }

    pub fn duration_type(&self) -> Result<TradingDurationType, EngineError> {
        match self.duration_type.as_str() {
            "day" => Ok(TradingDurationType::Day),
            "gtd" => Ok(TradingDurationType::Gtd),
            "gtc" => Ok(TradingDurationType::Gtc),
            other => Err(EngineError::ValueNotPresent {
                class_name: "EngineConfig",
                field: "duration_type",
                provided: other.to_string(),
                accepted: vec!["day", "gtd", "gtc"],
            }),
        }
    }

    pub fn sizer(&self) -> Result<Sizer, EngineError> {
        match (self.sizer.size, self.sizer.amount) {
            (Some(size), None) => Ok(Sizer::BySize(size)),
            (None, Some(amount)) => Ok(Sizer::ByAmount(Money::from_f64(amount))),
            (Some(_), Some(_)) => Err(EngineError::InputParameterConflict {
                class_name: "SizerConfig",
                provided_input: "size",
                corresponding_input_types: ("size", "amount"),
                unexpected_corresponding_input: "amount",
            }),
            (None, None) => Err(EngineError::ValueNotPresent {
                class_name: "SizerConfig",
                field: "size",
                provided: "none".to_string(),
                accepted: vec!["size", "amount"],
            }),
        }
    }

    pub fn stop_pricer_config(&self) -> Result<StopPricerConfig, EngineError> {
        let trail = resolve_threshold(self.stop_pricer.trail, "StopPricerConfig", ("trail.percent", "trail.amount"))?;
        let anchor_increase = resolve_threshold(
            self.stop_pricer.anchor_increase,
            "StopPricerConfig",
            ("anchor_increase.percent", "anchor_increase.amount"),
        )?;
        let stop_limit_gap = self
            .stop_pricer
            .stop_limit_gap
            .map(|g| resolve_threshold(g, "StopPricerConfig", ("stop_limit_gap.percent", "stop_limit_gap.amount")))
            .transpose()?;
        Ok(StopPricerConfig {
            is_buy: self.stop_pricer.is_buy,
            trail,
            anchor_increase,
            stop_limit_gap,
        })
    }

    /// Build the `TradeConfig` this file describes. Does not construct the
    /// `Trade` itself — the embedding application still supplies the
    /// Broker, Clock, and Notifier implementations.
    pub fn trade_config(&self) -> Result<TradeConfig, EngineError> {
        Ok(TradeConfig {
            symbol: self.symbol(),
            currency: self.currency.clone(),
            exchange: self.exchange.clone(),
            interval: self.interval()?,
            duration_type: self.duration_type()?,
            reps_limit: self.reps_limit,
            buy_power_ratio: self.buy_power_ratio,
            data_delay_seconds: self.data_delay_seconds,
            settled_order_retention_hours: self.settled_order_retention_hours,
            reconcile_attempts: self.reconcile_attempts,
        })
    }
}

fn resolve_threshold(
    source: ThresholdSource,
    class_name: &'static str,
    corresponding_input_types: (&'static str, &'static str),
) -> Result<Threshold, EngineError> {
    stop_pricer::require_exactly_one(source.percent, source.amount, class_name, corresponding_input_types)
}
