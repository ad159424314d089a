//! End-to-end scenarios exercising the Trade Driver against the backtest
//! broker: a full buy/sell cycle, a stop-loss trigger, and the
//! multiple-pending-order invariant.

use chrono::Utc;
use equity_trade_engine::bar::{Bar, IntervalOption, Symbol};
use equity_trade_engine::broker::backtest::FillModelConfig;
use equity_trade_engine::broker::{BacktestBroker, Commission};
use equity_trade_engine::clock::SimClock;
use equity_trade_engine::driver::{Trade, TradeConfig, TradeHandle, TradeStatus, TradingDurationType};
use equity_trade_engine::errors::EngineError;
use equity_trade_engine::market::{CandleRetriever, MarketHourOracle};
use equity_trade_engine::notifier::NullNotifier;
use equity_trade_engine::sizer::Sizer;
use equity_trade_engine::stop_pricer::{StopPricer, StopPricerConfig, Threshold};
use equity_trade_engine::{Money, Strategy};
use std::sync::Mutex;

struct FixedCandles {
    symbol: Symbol,
    interval: IntervalOption,
    closes: Vec<f64>,
    cursor: Mutex<usize>,
}

impl FixedCandles {
    fn new(symbol: Symbol, interval: IntervalOption, closes: Vec<f64>) -> Self {
        Self {
            symbol,
            interval,
            closes,
            cursor: Mutex::new(0),
        }
    }

    fn bar_at(&self, idx: usize) -> Bar {
        let close = self.closes[idx];
        Bar::new(
            (idx as i64 + 1) * self.interval.seconds(),
            Utc::now(),
            close,
            close,
            close,
            close,
            1_000,
            self.interval,
            self.symbol.clone(),
            false,
        )
    }
}

#[async_trait::async_trait]
impl CandleRetriever for FixedCandles {
    fn set_ticker_symbol(&mut self, symbol: Symbol) {
        self.symbol = symbol;
    }

    fn set_interval(&mut self, interval: IntervalOption) {
        self.interval = interval;
    }

    async fn get_candles(&self) -> Result<Vec<Bar>, EngineError> {
        let mut cursor = self.cursor.lock().unwrap();
        if *cursor >= self.closes.len() {
            return Ok(vec![]);
        }
        let bar = self.bar_at(*cursor);
        *cursor += 1;
        Ok(vec![bar])
    }

    async fn get_x_candles(&self, n: usize) -> Result<Vec<Bar>, EngineError> {
        let mut cursor = self.cursor.lock().unwrap();
        let end = (*cursor + n).min(self.closes.len());
        let batch = (*cursor..end).map(|i| self.bar_at(i)).collect();
        *cursor = end;
        Ok(batch)
    }
}

struct AlwaysOpen;

impl MarketHourOracle for AlwaysOpen {
    fn is_open_now(&self) -> bool {
        true
    }
    fn exchange_open(&self) -> chrono::DateTime<Utc> {
        Utc::now()
    }
    fn exchange_close(&self) -> chrono::DateTime<Utc> {
        Utc::now() + chrono::Duration::hours(6)
    }
    fn bar_zero_timestamp(&self) -> i64 {
        0
    }
    fn seconds_to_next_bar(&self) -> i64 {
        0
    }
    fn bar_gap_seconds(&self) -> i64 {
        60
    }
}

/// Buys on the first bar it sees, sells on the next, then goes dormant.
struct BuyThenSell {
    bought: bool,
}

#[async_trait::async_trait]
impl Strategy for BuyThenSell {
    async fn next(&mut self, handle: &mut TradeHandle<'_>) {
        let Some(ref_price) = handle.bars().latest_bar().map(|b| Money::from_f64(b.close)) else {
            return;
        };
        if !self.bought && !handle.has_pending_regular() {
            handle.buy(false, ref_price, Some(10), None).await.unwrap();
            self.bought = true;
            return;
        }
        if self.bought && handle.position().size() > 0 && !handle.has_pending_regular() {
            handle.sell(false, ref_price, Some(handle.position().size()), None).await.unwrap();
        }
    }
}

fn base_config(reps_limit: u32) -> TradeConfig {
    TradeConfig {
        symbol: Symbol::new("AAPL"),
        currency: "USD".to_string(),
        exchange: "NASDAQ".to_string(),
        interval: IntervalOption::OneMinute,
        duration_type: TradingDurationType::Gtc,
        reps_limit,
        buy_power_ratio: 1.0,
        data_delay_seconds: 0,
        settled_order_retention_hours: 24,
        reconcile_attempts: 3,
    }
}

fn sell_stop_pricer() -> StopPricer {
    StopPricer::new(StopPricerConfig {
        is_buy: false,
        trail: Threshold::Percent(0.01),
        anchor_increase: Threshold::Percent(0.005),
        stop_limit_gap: None,
    })
}

#[tokio::test]
async fn single_rep_buy_then_sell_closes_the_trade() {
    let broker = Box::new(BacktestBroker::new(Commission::Fixed(Money::ZERO), FillModelConfig::default(), 11));
    let mut trade = Trade::new(
        base_config(1),
        broker,
        Box::new(SimClock::new(Utc::now())),
        Box::new(NullNotifier),
        Sizer::BySize(10),
        sell_stop_pricer(),
    )
    .unwrap();

    let mut retriever = FixedCandles::new(Symbol::new("AAPL"), IntervalOption::OneMinute, vec![100.0, 101.0, 102.0]);
    let oracle = AlwaysOpen;
    let mut strategy = BuyThenSell { bought: false };

    trade.execute(&mut strategy, &mut retriever, &oracle).await.unwrap();

    assert_eq!(trade.status(), TradeStatus::Closed);
    assert_eq!(trade.position().size(), 0);
}

#[tokio::test]
async fn stop_loss_triggers_and_closes_position() {
    let broker = Box::new(BacktestBroker::new(Commission::Fixed(Money::ZERO), FillModelConfig::default(), 5));
    let mut trade = Trade::new(
        base_config(1),
        broker,
        Box::new(SimClock::new(Utc::now())),
        Box::new(NullNotifier),
        Sizer::BySize(10),
        sell_stop_pricer(),
    )
    .unwrap();

    struct BuyThenProtect {
        bought: bool,
    }

    #[async_trait::async_trait]
    impl Strategy for BuyThenProtect {
        async fn next(&mut self, handle: &mut TradeHandle<'_>) {
            let Some(ref_price) = handle.bars().latest_bar().map(|b| Money::from_f64(b.close)) else {
                return;
            };
            if !self.bought && !handle.has_pending_regular() {
                handle.buy(false, ref_price, Some(10), None).await.unwrap();
                self.bought = true;
                return;
            }
            if handle.position().size() > 0 && !handle.has_pending_stop() {
                handle.stoploss(false, ref_price.scale(0.95), ref_price, None, None).await.unwrap();
            }
        }
    }

    let mut retriever = FixedCandles::new(
        Symbol::new("AAPL"),
        IntervalOption::OneMinute,
        vec![100.0, 100.0, 90.0, 80.0],
    );
    let oracle = AlwaysOpen;
    let mut strategy = BuyThenProtect { bought: false };

    trade.execute(&mut strategy, &mut retriever, &oracle).await.unwrap();

    assert_eq!(trade.status(), TradeStatus::Closed);
    assert_eq!(trade.position().size(), 0);
}

#[tokio::test]
async fn duplicate_regular_order_intent_is_rejected_while_one_is_pending() {
    let broker = Box::new(BacktestBroker::new(Commission::Fixed(Money::ZERO), FillModelConfig::default(), 3));
    let mut trade = Trade::new(
        base_config(5),
        broker,
        Box::new(SimClock::new(Utc::now())),
        Box::new(NullNotifier),
        Sizer::BySize(10),
        sell_stop_pricer(),
    )
    .unwrap();

    let mut handle = trade.handle();
    handle.buy(false, Money::from_f64(100.0), Some(10), None).await.unwrap();
    let second = handle.buy(false, Money::from_f64(100.0), Some(10), None).await;
    assert!(matches!(second, Err(EngineError::MultiplePendingOrderException { order_kind: "regular" })));
}
