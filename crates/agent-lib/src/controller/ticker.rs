//! Inter-cycle timing
//!
//! The loop waits on a [`Ticker`] between cycles instead of sleeping
//! directly, so tests can drive cycles without real delays.

use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Ticker: Send {
    /// Resolve when the next cycle should start
    async fn tick(&mut self);
}

/// Sleeps a fixed interval between cycles
#[derive(Debug, Clone)]
pub struct SleepTicker {
    interval: Duration,
}

impl SleepTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl Ticker for SleepTicker {
    async fn tick(&mut self) {
        tokio::time::sleep(self.interval).await;
    }
}
