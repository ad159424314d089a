//! Trade Driver (C6): the per-bar execution loop wiring Broker, StopPricer,
//! Sizer, GainLossTracker, and a user `Strategy` together. Grounded on
//! `autotrade/trade.py::Trade` and `autotrade/strategy/strat_base.py`'s
//! template method (`pre_next` / `next` / `post_next`).

use crate::bar::{IntervalOption, Symbol};
use crate::broker::Broker;
use crate::clock::Clock;
use crate::errors::EngineError;
use crate::gain_loss::GainLossTracker;
use crate::market::{BarFeed, CandleRetriever, MarketHourOracle};
use crate::money::Money;
use crate::notifier::{NotificationTag, Notifier};
use crate::order::{Order, OrderStatus};
use crate::position::Position;
use crate::sizer::Sizer;
use crate::stop_pricer::StopPricer;
use crate::strategy::Strategy;
use std::time::Duration;

/// Lifecycle state of a `Trade`. `Closed` and `Cancelled` are terminal;
/// `execute()` stops its loop on either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeStatus {
    Activated,
    Paused,
    Resumed,
    Cancelled,
    Closed,
}

/// How long a trade is allowed to remain open. `Gtc` (good-till-canceled)
/// never auto-expires on duration alone; `Day` and `Gtd` are enforced by
/// the embedding scheduler, not by `Trade` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingDurationType {
    Day,
    Gtd,
    Gtc,
}

/// Construction-time parameters, validated once in `Trade::new`.
#[derive(Debug, Clone)]
pub struct TradeConfig {
    pub symbol: Symbol,
    pub currency: String,
    pub exchange: String,
    pub interval: IntervalOption,
    pub duration_type: TradingDurationType,
    pub reps_limit: u32,
    pub buy_power_ratio: f64,
    pub data_delay_seconds: i64,
    pub settled_order_retention_hours: i64,
    pub reconcile_attempts: u32,
}

/// The per-symbol trading session: owns the Broker, the bar feed, the
/// sizing/stop-pricing/pnl helpers, and the buy/sell repetition counters.
/// `Strategy::next` only ever touches this state through a `TradeHandle`.
pub struct Trade {
    config: TradeConfig,
    status: TradeStatus,
    bars: BarFeed,
    broker: Box<dyn Broker>,
    clock: Box<dyn Clock>,
    notifier: Box<dyn Notifier>,
    sizer: Sizer,
    stop_pricer: StopPricer,
    gl_tracker: GainLossTracker,
    buy_count: u32,
    sell_count: u32,
    pending_regular: Option<String>,
    pending_stop: Option<String>,
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: TradeConfig,
        broker: Box<dyn Broker>,
        clock: Box<dyn Clock>,
        notifier: Box<dyn Notifier>,
        sizer: Sizer,
        stop_pricer: StopPricer,
    ) -> Result<Self, EngineError> {
        if config.currency.trim().is_empty() {
            return Err(EngineError::MissingRequiredTradingElement { element: "currency" });
        }
        if config.exchange.trim().is_empty() {
            return Err(EngineError::MissingRequiredTradingElement { element: "exchange" });
        }
        if config.reps_limit == 0 {
            return Err(EngineError::MissingRequiredTradingElement { element: "reps_limit" });
        }
        if config.reconcile_attempts == 0 {
            return Err(EngineError::MissingRequiredTradingElement { element: "reconcile_attempts" });
        }
        Ok(Self {
            bars: BarFeed::new(config.data_delay_seconds),
            config,
            status: TradeStatus::Activated,
            broker,
            clock,
            notifier,
            sizer,
            stop_pricer,
            gl_tracker: GainLossTracker::new(),
            buy_count: 0,
            sell_count: 0,
            pending_regular: None,
            pending_stop: None,
        })
    }

    pub fn status(&self) -> TradeStatus {
        self.status
    }

    pub fn position(&self) -> &Position {
        self.broker.position()
    }

    pub fn gl_tracker(&self) -> &GainLossTracker {
        &self.gl_tracker
    }

    pub fn bars(&self) -> &BarFeed {
        &self.bars
    }

    pub fn pause(&mut self) {
        if self.status == TradeStatus::Activated || self.status == TradeStatus::Resumed {
            self.status = TradeStatus::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.status == TradeStatus::Paused {
            self.status = TradeStatus::Resumed;
        }
    }

    pub fn cancel(&mut self) {
        self.status = TradeStatus::Cancelled;
    }

    /// A manual `TradeHandle` for embedders driving order intents outside
    /// the `execute()` loop (e.g. tests, or a one-off rebalance).
    pub fn handle(&mut self) -> TradeHandle<'_> {
        TradeHandle { trade: self }
    }

    /// Drive the trade to completion, polling `retriever` each bar and
    /// handing control to `strategy` via the template method
    /// (`pre_next` / `next` / `post_next`). Returns once the trade closes,
    /// is cancelled, or a reconciliation failure is fatal.
    pub async fn execute(
        &mut self,
        strategy: &mut dyn Strategy,
        retriever: &mut dyn CandleRetriever,
        oracle: &dyn MarketHourOracle,
    ) -> Result<(), EngineError> {
        self.broker.initialize(self.config.symbol.clone(), &self.config.currency).await?;
        let seed = retriever.get_x_candles(1).await?;
        self.bars.load(seed);
        {
            let handle = TradeHandle { trade: self };
            strategy.prepare(&handle);
        }

        while self.status != TradeStatus::Closed && self.status != TradeStatus::Cancelled {
            if self.status == TradeStatus::Paused {
                self.clock.sleep(Duration::from_secs(oracle.bar_gap_seconds() as u64)).await;
                continue;
            }

            if oracle.is_open_now() {
                let fresh = retriever.get_candles().await?;
                self.bars.load(fresh);
            }

            self.pre_next().await?;
            if self.status == TradeStatus::Closed || self.status == TradeStatus::Cancelled {
                break;
            }

            {
                let mut handle = TradeHandle { trade: self };
                strategy.print_bar(&handle);
                strategy.next(&mut handle).await;
            }

            self.post_next(strategy).await?;

            let sleep_for = oracle.seconds_to_next_bar().max(0) as u64;
            self.clock.sleep(Duration::from_secs(sleep_for)).await;
        }

        Ok(())
    }

    /// Reconcile any pending regular or stop order left from the previous
    /// bar. A still-pending order is cancelled and re-checked once more
    /// before being treated as fatal: orders are expected to settle within
    /// one bar boundary, and one that doesn't risks the invariant that at
    /// most one regular/stop order is outstanding at a time.
    async fn pre_next(&mut self) -> Result<(), EngineError> {
        let ref_price = self.bars.latest_bar().map(|b| Money::from_f64(b.close));

        if let Some(broker_ref_id) = self.pending_regular.take() {
            let order = self.settle_or_raise(&broker_ref_id, ref_price).await?;
            self.record_settlement(&order);
        }

        if let Some(broker_ref_id) = self.pending_stop.take() {
            let order = self.settle_or_raise(&broker_ref_id, ref_price).await?;
            self.record_settlement(&order);
            if order.status == OrderStatus::Filled {
                self.stop_pricer.reset_trailing();
            }
            // settle_or_raise only returns once the order is settled (filled,
            // canceled, rejected, or expired), so there is never a still-open
            // stop to restore here — `take()` already cleared the slot.
        }

        Ok(())
    }

    async fn post_next(&mut self, strategy: &dyn Strategy) -> Result<(), EngineError> {
        strategy.notify_trade(self.gl_tracker.realized_gain_loss());
        if self.buy_count >= self.config.reps_limit && self.sell_count >= self.config.reps_limit {
            self.status = TradeStatus::Closed;
        }
        self.broker.remove_settled(self.config.settled_order_retention_hours);
        Ok(())
    }

    async fn settle_or_raise(&mut self, broker_ref_id: &str, ref_price: Option<Money>) -> Result<Order, EngineError> {
        for attempt in 0..self.config.reconcile_attempts {
            let order = self.broker.update_order(broker_ref_id, ref_price).await?;
            if order.status.is_settled() {
                return Ok(order);
            }
            if attempt + 1 == self.config.reconcile_attempts {
                let _ = self.broker.cancel_order(broker_ref_id).await;
                let final_order = self.broker.update_order(broker_ref_id, ref_price).await?;
                if final_order.status.is_settled() {
                    return Ok(final_order);
                }
                return Err(EngineError::UnsettledOrderPersistError {
                    client_ref_id: final_order.client_ref_id.to_string(),
                });
            }
        }
        unreachable!("reconcile_attempts must be >= 1")
    }

    fn record_settlement(&mut self, order: &Order) {
        if order.status != OrderStatus::Filled {
            self.notifier.send_notification(&order.to_string(), NotificationTag::Order);
            return;
        }

        let price = order.filled_price.unwrap_or(order.ref_price);
        let qty = order.fill_quantity.unwrap_or(order.size);
        let commission = order.commission_fee.unwrap_or(Money::ZERO);
        let value = price.times(qty);

        if order.is_buy {
            self.gl_tracker.add_holding(value, qty, commission);
            self.buy_count += 1;
        } else {
            self.gl_tracker.make_sale(value, qty, commission);
            self.sell_count += 1;
        }
        self.notifier.send_notification(&order.to_string(), NotificationTag::Order);
    }

    async fn submit_regular(
        &mut self,
        is_buy: bool,
        is_limit: bool,
        ref_price: Money,
        size: Option<u64>,
        limit_price: Option<Money>,
    ) -> Result<(), EngineError> {
        if self.pending_regular.is_some() {
            return Err(EngineError::MultiplePendingOrderException { order_kind: "regular" });
        }
        let rep_count = if is_buy { self.buy_count } else { self.sell_count };
        if rep_count >= self.config.reps_limit {
            return Ok(());
        }
        let size = match size {
            Some(s) => s,
            None => self.sizer.resolve(ref_price, self.config.buy_power_ratio)?,
        };
        if size == 0 {
            return Ok(());
        }
        let order = Order::new_regular(self.config.symbol.clone(), is_buy, size, ref_price, is_limit, limit_price);
        let submitted = if is_buy {
            if is_limit {
                self.broker.limit_buy(order).await?
            } else {
                self.broker.market_buy(order).await?
            }
        } else if is_limit {
            self.broker.limit_sell(order).await?
        } else {
            self.broker.market_sell(order).await?
        };
        self.pending_regular = submitted.broker_ref_id.clone();
        Ok(())
    }

    async fn submit_stop(
        &mut self,
        is_stop_limit: bool,
        stop_price: Money,
        ref_price: Money,
        size: Option<u64>,
        limit_price: Option<Money>,
    ) -> Result<(), EngineError> {
        if self.pending_stop.is_some() {
            return Err(EngineError::MultiplePendingOrderException { order_kind: "stop" });
        }
        let size = match size {
            Some(s) => s,
            None => self.broker.position().size(),
        };
        if size == 0 {
            return Ok(());
        }
        let order = Order::new_stop(self.config.symbol.clone(), false, size, ref_price, is_stop_limit, stop_price, limit_price);
        let submitted = self.broker.stop_loss(order).await?;
        self.pending_stop = submitted.broker_ref_id.clone();
        self.stop_pricer.set_trailing(ref_price, stop_price);
        Ok(())
    }

    async fn apply_trail(&mut self, ref_price: Money) -> Result<(), EngineError> {
        let Some(broker_ref_id) = self.pending_stop.clone() else {
            return Ok(());
        };
        let Some((stop, limit)) = self.stop_pricer.trail(ref_price) else {
            return Ok(());
        };
        let cancelled = self.broker.cancel_order(&broker_ref_id).await?;
        let size = cancelled.size;
        let order = Order::new_stop(self.config.symbol.clone(), false, size, ref_price, cancelled.is_stop_limit_order(), stop, Some(limit));
        let submitted = self.broker.stop_loss(order).await?;
        self.pending_stop = submitted.broker_ref_id;
        Ok(())
    }

    async fn cancel_by_ref(&mut self, broker_ref_id: &str) -> Result<(), EngineError> {
        self.broker.cancel_order(broker_ref_id).await?;
        if self.pending_regular.as_deref() == Some(broker_ref_id) {
            self.pending_regular = None;
        }
        if self.pending_stop.as_deref() == Some(broker_ref_id) {
            self.pending_stop = None;
        }
        Ok(())
    }
}

/// The view of a `Trade` exposed to `Strategy::next`: read access to bars,
/// position, and pnl, plus the order-intent verbs (`buy`, `sell`,
/// `stoploss`, `trail_stoploss`, `cancel`). Borrowing `Trade` exclusively
/// for the duration of one bar's decision keeps the pending-order
/// invariants enforced in one place instead of duplicated per intent.
pub struct TradeHandle<'a> {
    trade: &'a mut Trade,
}

impl<'a> TradeHandle<'a> {
    pub fn bars(&self) -> &BarFeed {
        &self.trade.bars
    }

    pub fn position(&self) -> &Position {
        self.trade.broker.position()
    }

    pub fn gl_tracker(&self) -> &GainLossTracker {
        &self.trade.gl_tracker
    }

    pub fn is_live(&self) -> bool {
        self.trade.broker.is_live()
    }

    pub fn has_pending_regular(&self) -> bool {
        self.trade.pending_regular.is_some()
    }

    pub fn has_pending_stop(&self) -> bool {
        self.trade.pending_stop.is_some()
    }

    pub fn buy_count(&self) -> u32 {
        self.trade.buy_count
    }

    pub fn sell_count(&self) -> u32 {
        self.trade.sell_count
    }

    pub async fn buy(&mut self, is_limit: bool, ref_price: Money, size: Option<u64>, limit_price: Option<Money>) -> Result<(), EngineError> {
        self.trade.submit_regular(true, is_limit, ref_price, size, limit_price).await
    }

    /// Cancels any pending stop order before submitting the sell, since a
    /// sell clears the position the stop was protecting.
    pub async fn sell(&mut self, is_limit: bool, ref_price: Money, size: Option<u64>, limit_price: Option<Money>) -> Result<(), EngineError> {
        if let Some(broker_ref_id) = self.trade.pending_stop.clone() {
            self.trade.cancel_by_ref(&broker_ref_id).await?;
        }
        self.trade.submit_regular(false, is_limit, ref_price, size, limit_price).await
    }

    pub async fn stoploss(
        &mut self,
        is_stop_limit: bool,
        stop_price: Money,
        ref_price: Money,
        size: Option<u64>,
        limit_price: Option<Money>,
    ) -> Result<(), EngineError> {
        self.trade.submit_stop(is_stop_limit, stop_price, ref_price, size, limit_price).await
    }

    pub async fn trail_stoploss(&mut self, ref_price: Money) -> Result<(), EngineError> {
        self.trade.apply_trail(ref_price).await
    }

    pub async fn cancel(&mut self, broker_ref_id: &str) -> Result<(), EngineError> {
        self.trade.cancel_by_ref(broker_ref_id).await
    }
}
