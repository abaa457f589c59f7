//! Wall-clock sources

use chrono::Utc;
use tokio::time::Instant;

/// Source of "now" in epoch milliseconds.
///
/// Latency is measured against publisher timestamps, so this must be a wall
/// clock, not a monotonic one.
pub trait Clock: Send + Sync + 'static {
    /// Current time, epoch milliseconds
    fn now_ms(&self) -> i64;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Epoch clock that advances with the tokio timer.
///
/// Follows paused/advanced time in tests and replays, anchored to a fixed
/// epoch offset.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeClock {
    origin_ms: i64,
    started: Instant,
}

impl RuntimeClock {
    /// Clock reading `origin_ms` right now. Must be called from within a
    /// tokio runtime when time is paused.
    pub fn anchored(origin_ms: i64) -> Self {
        Self {
            origin_ms,
            started: Instant::now(),
        }
    }
}

impl Clock for RuntimeClock {
    fn now_ms(&self) -> i64 {
        let elapsed = i64::try_from(self.started.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.origin_ms.saturating_add(elapsed)
    }
}

impl<F> Clock for F
where
    F: Fn() -> i64 + Send + Sync + 'static,
{
    fn now_ms(&self) -> i64 {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_system_clock_is_epoch_ms() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_clock_follows_tokio_time() {
        let clock = RuntimeClock::anchored(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(clock.now_ms(), 1_250);
    }

    #[test]
    fn test_closure_clock() {
        let clock = || 42;
        assert_eq!(clock.now_ms(), 42);
    }
}
