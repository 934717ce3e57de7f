use std::fmt;

use chrono::{DateTime, Duration, Utc};

/// Wall-clock source for phase timing and absence measurement.
///
/// Production code injects [`SystemClock`]; timer tests inject a clock that
/// follows tokio's paused time so elapsed-minute math is deterministic.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that follows tokio's (possibly paused) time, for timer-driven tests.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct PausedClock {
    base: DateTime<Utc>,
    origin: tokio::time::Instant,
}

#[cfg(test)]
impl PausedClock {
    pub fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            origin: tokio::time::Instant::now(),
        }
    }
}

#[cfg(test)]
impl Clock for PausedClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now() - self.origin;
        self.base + Duration::milliseconds(elapsed.as_millis() as i64)
    }
}

/// Whole minutes between two instants, floored, never negative.
pub fn elapsed_minutes(from: DateTime<Utc>, to: DateTime<Utc>) -> u32 {
    let ms = (to - from).num_milliseconds().max(0);
    (ms / 60_000) as u32
}

/// Whole seconds between two instants, floored, never negative.
pub fn elapsed_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    let ms = (to - from).num_milliseconds().max(0);
    (ms / 1_000) as u64
}
