// src/tracking/clock.rs - Time source for the session engine

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Monotonic and wall-clock time plus timers.
///
/// Timers default to tokio's, which follow the runtime clock, so a paused
/// test runtime drives the engine in simulated time.
pub trait Clock: Send + Sync {
    /// Monotonic instant used for all elapsed-time math.
    fn now(&self) -> Instant;

    /// Wall-clock time, only used for `started_at` and persisted records.
    fn utc_now(&self) -> DateTime<Utc>;

    fn sleep(&self, duration: Duration) -> tokio::time::Sleep {
        tokio::time::sleep(duration)
    }

    fn ticker(&self, period: Duration) -> Ticker {
        Ticker::new(period)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Periodic tick source. The first tick fires one period after creation and
/// ticks missed while the owner was busy are skipped, not bunched.
pub struct Ticker {
    interval: Interval,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    pub async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }
}
