//! Demo CLI: run a tiny backtest over a synthetic candle series using the
//! engine core directly, without any external data provider wired in.

use anyhow::{Context, Result};
use clap::Parser;
use equity_trade_engine::bar::{Bar, IntervalOption, Symbol};
use equity_trade_engine::broker::{BacktestBroker, Commission};
use equity_trade_engine::broker::backtest::FillModelConfig;
use equity_trade_engine::clock::SimClock;
use equity_trade_engine::config::EngineConfig;
use equity_trade_engine::driver::{Trade, TradeHandle};
use equity_trade_engine::errors::EngineError;
use equity_trade_engine::market::{CandleRetriever, MarketHourOracle};
use equity_trade_engine::notifier::NullNotifier;
use equity_trade_engine::{Money, Strategy};
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Parser, Debug)]
#[command(name = "run-backtest", about = "Run a synthetic backtest against the engine core")]
struct Args {
    /// Path to an EngineConfig JSON file.
    #[arg(long)]
    config: PathBuf,

    /// RNG seed for the backtest fill simulator.
    #[arg(long, default_value_t = 7)]
    seed: u64,
}

/// Feeds a fixed, precomputed series of closing prices, one bar per call to
/// `get_candles`. Stands in for a real data provider per scope.
struct SyntheticCandles {
    symbol: Symbol,
    interval: IntervalOption,
    closes: Vec<f64>,
    cursor: Mutex<usize>,
}

impl SyntheticCandles {
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
            chrono::Utc::now(),
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
impl CandleRetriever for SyntheticCandles {
    fn set_ticker_symbol(&mut self, symbol: Symbol) {
        self.symbol = symbol;
    }

    fn set_interval(&mut self, interval: IntervalOption) {
        self.interval = interval;
    }

    async fn get_candles(&self) -> Result<Vec<Bar>, EngineError> {
        let mut cursor = self.cursor.lock().expect("cursor mutex poisoned");
        if *cursor >= self.closes.len() {
            return Ok(vec![]);
        }
        let bar = self.bar_at(*cursor);
        *cursor += 1;
        Ok(vec![bar])
    }

    async fn get_x_candles(&self, n: usize) -> Result<Vec<Bar>, EngineError> {
        let mut cursor = self.cursor.lock().expect("cursor mutex poisoned");
        let end = (*cursor + n).min(self.closes.len());
        let batch = (*cursor..end).map(|i| self.bar_at(i)).collect();
        *cursor = end;
        Ok(batch)
    }
}

/// A market that never closes, with a fixed one-bar gap — suitable for
/// driving a backtest over a synthetic series at full speed.
struct AlwaysOpenOracle {
    bar_gap_seconds: i64,
}

impl MarketHourOracle for AlwaysOpenOracle {
    fn is_open_now(&self) -> bool {
        true
    }

    fn exchange_open(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }

    fn exchange_close(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now() + chrono::Duration::hours(6)
    }

    fn bar_zero_timestamp(&self) -> i64 {
        0
    }

    fn seconds_to_next_bar(&self) -> i64 {
        0
    }

    fn bar_gap_seconds(&self) -> i64 {
        self.bar_gap_seconds
    }
}

/// Buys once on the first bar, trails the stop every bar thereafter, and
/// lets the stop close the position out.
struct TrailingDemoStrategy;

#[async_trait::async_trait]
impl Strategy for TrailingDemoStrategy {
    async fn next(&mut self, handle: &mut TradeHandle<'_>) {
        let Some(ref_price) = handle.bars().latest_bar().map(|b| Money::from_f64(b.close)) else {
            return;
        };

        if handle.position().size() == 0 && !handle.has_pending_regular() {
            if let Err(err) = handle.buy(false, ref_price, None, None).await {
                tracing::warn!(%err, "buy intent failed");
            }
            return;
        }

        if handle.position().size() > 0 && !handle.has_pending_stop() {
            let stop_price = ref_price.scale(0.99);
            if let Err(err) = handle.stoploss(false, stop_price, ref_price, None, None).await {
                tracing::warn!(%err, "stoploss intent failed");
            }
            return;
        }

        if let Err(err) = handle.trail_stoploss(ref_price).await {
            tracing::warn!(%err, "trail intent failed");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let engine_config = EngineConfig::from_file(&args.config).context("loading engine config")?;
    let trade_config = engine_config.trade_config()?;
    let sizer = engine_config.sizer()?;
    let stop_pricer_config = engine_config.stop_pricer_config()?;

    let broker = Box::new(BacktestBroker::new(Commission::Fixed(Money::from_f64(1.0)), FillModelConfig::default(), args.seed));
    let clock = Box::new(SimClock::new(chrono::Utc::now()));
    let notifier = Box::new(NullNotifier);

    let mut trade = Trade::new(
        trade_config,
        broker,
        clock,
        notifier,
        sizer,
        equity_trade_engine::StopPricer::new(stop_pricer_config),
    )?;

    let closes = vec![100.0, 101.0, 102.5, 101.8, 103.0, 104.2, 103.5, 99.0, 97.5, 96.0];
    let mut retriever = SyntheticCandles::new(engine_config.symbol(), engine_config.interval()?, closes);
    let oracle = AlwaysOpenOracle { bar_gap_seconds: engine_config.interval()?.seconds() };
    let mut strategy = TrailingDemoStrategy;

    trade.execute(&mut strategy, &mut retriever, &oracle).await?;

    tracing::info!(
        realized_gain_loss = trade.gl_tracker().realized_gain_loss().to_f64(),
        status = ?trade.status(),
        "backtest complete"
    );
    Ok(())
}
