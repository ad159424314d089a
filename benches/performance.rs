//! Hot-path benchmarks: backtest fill simulation and signal-graph cascade.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use equity_trade_engine::bar::Symbol;
use equity_trade_engine::broker::backtest::FillModelConfig;
use equity_trade_engine::broker::{BacktestBroker, Broker, Commission};
use equity_trade_engine::order::Order;
use equity_trade_engine::signal::{Sequence, SignalGraph};
use equity_trade_engine::Money;
use tokio::runtime::Runtime;

fn bench_market_fill(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    c.bench_function("backtest market buy + fill", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut broker = BacktestBroker::new(Commission::Fixed(Money::from_f64(1.0)), FillModelConfig::default(), 42);
                broker.initialize(Symbol::new("AAPL"), "USD").await.unwrap();
                let order = Order::new_regular(Symbol::new("AAPL"), true, 10, Money::from_f64(100.0), false, None);
                let submitted = broker.market_buy(order).await.unwrap();
                let filled = broker
                    .update_order(submitted.broker_ref_id.as_deref().unwrap(), Some(Money::from_f64(100.0)))
                    .await
                    .unwrap();
                black_box(filled);
            });
        });
    });
}

fn bench_signal_cascade(c: &mut Criterion) {
    c.bench_function("signal graph up/down cascade over a 10-node chain", |b| {
        b.iter(|| {
            let mut graph = SignalGraph::new();
            let mut head = graph.insert_root("s0", Sequence::First, true).unwrap();
            for i in 1..10 {
                let sequence = if i == 9 { Sequence::Last } else { Sequence::Middle };
                head = graph.insert_dependent(format!("s{i}"), sequence, true, head).unwrap();
            }
            for id in 0..10 {
                graph.up_signal(id, id as i64, 100.0, 10, 0.5, chrono::Utc::now());
            }
            black_box(graph.is_up(head));
            graph.down_signal(0);
            black_box(graph.is_up(head));
        });
    });
}

criterion_group!(benches, bench_market_fill, bench_signal_cascade);
criterion_main!(benches);
