//! Injectable clock abstraction.
//!
//! The Driver's only suspension points go through this trait. `SystemClock`
//! sleeps for real; `SimClock` advances on command and never blocks, so
//! backtests (and tests of live-mode logic) run deterministically.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Abstracts time so the Driver's sleeps are deterministic under test.
#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

/// Real wall-clock time, backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

#[async_trait::async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Manually-advanced clock for backtests and deterministic tests.
///
/// `sleep` never actually blocks; it just advances the internal cursor by
/// the requested duration, matching the "all sleeps degenerate to zero"
/// backtest semantics.
#[derive(Debug, Clone)]
pub struct SimClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl SimClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().expect("SimClock mutex poisoned");
        *now += chrono::Duration::from_std(duration).unwrap_or_default();
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().expect("SimClock mutex poisoned") = at;
    }
}

#[async_trait::async_trait]
impl Clock for SimClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("SimClock mutex poisoned")
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
