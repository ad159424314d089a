//! Strategy trait (exposed to implementers; user-provided decision logic).

use crate::driver::TradeHandle;
use crate::order::Order;
use async_trait::async_trait;

/// User-implemented decision procedure invoked once per bar. Implementers
/// override `prepare` (install indicator columns, seed state),
/// `print_bar` (diagnostics), and `next` (per-bar decision, emitting
/// intents via the supplied `TradeHandle`). `notify_order`/`notify_trade`
/// have default logging implementations and rarely need overriding.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn prepare(&mut self, _handle: &TradeHandle<'_>) {}

    fn print_bar(&self, handle: &TradeHandle<'_>) {
        if let Some(bar) = handle.bars().latest_bar() {
            tracing::debug!(close = bar.close, timestamp = bar.timestamp, "bar");
        }
    }

    async fn next(&mut self, handle: &mut TradeHandle<'_>);

    fn notify_order(&self, order: &Order) {
        if order.status.is_settled() {
            if order.status == crate::order::OrderStatus::Filled {
                tracing::info!(
                    client_ref_id = order.client_ref_id,
                    is_buy = order.is_buy,
                    price = order.filled_price.map(|p| p.to_f64()),
                    commission = order.commission_fee.map(|c| c.to_f64()),
                    "order filled"
                );
            } else {
                tracing::warn!(client_ref_id = order.client_ref_id, status = ?order.status, "order deactivated");
            }
        }
    }

    fn notify_trade(&self, realized_gain_loss: crate::money::Money) {
        tracing::info!(realized_gain_loss = realized_gain_loss.to_f64(), "trade pnl update");
    }
}
