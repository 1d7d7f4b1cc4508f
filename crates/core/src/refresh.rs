use crate::dashboard::Dashboard;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Seconds until the next scheduled sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Countdown {
    remaining: u32,
    interval: u32,
}

impl Countdown {
    pub fn new(interval: u32) -> Self {
        let interval = interval.max(1);
        Self {
            remaining: interval,
            interval,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Advances one tick. Returns `true` when a sync is due; the countdown has then
    /// already been reset to the full interval.
    pub fn tick(&mut self) -> bool {
        if self.remaining <= 1 {
            self.reset();
            true
        } else {
            self.remaining -= 1;
            false
        }
    }

    pub fn reset(&mut self) {
        self.remaining = self.interval;
    }
}

/// Owns the once-per-second timer of a dashboard. Triggers a sync on start, then one per
/// countdown rollover. The timer stops when the controller is stopped or dropped.
pub struct RefreshController {
    handle: JoinHandle<()>,
}

impl RefreshController {
    pub fn start(dashboard: Arc<Dashboard>) -> Self {
        let handle = tokio::spawn(async move {
            let _ = dashboard.refresh().await;

            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + TICK_PERIOD, TICK_PERIOD);
            // A stalled runtime should not replay a burst of missed ticks.
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let _ = dashboard.tick().await;
            }
        });
        tracing::info!(period = ?TICK_PERIOD, "refresh controller started");
        Self { handle }
    }

    pub fn stop(self) {
        drop(self);
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for RefreshController {
    fn drop(&mut self) {
        self.handle.abort();
        tracing::info!("refresh controller stopped");
    }
}
