//! Liveness detection
//!
//! Tracks whether the data source is live, independent of individual
//! messages. Accepted messages refresh the last-seen timestamp; the
//! verdict only degrades on the periodic tick, so a pause ages out over
//! one tick instead of flipping the moment a message is late.

/// Default liveness window in milliseconds
pub const DEFAULT_LIVENESS_WINDOW_MS: i64 = 2000;

/// Default period of the liveness re-evaluation in milliseconds
pub const DEFAULT_LIVENESS_TICK_MS: u64 = 1000;

/// Tracks whether the source has sent anything within the window
#[derive(Debug, Clone)]
pub struct LivenessDetector {
    window_ms: i64,
    /// `None` until the first message is accepted
    last_accepted_at: Option<i64>,
    has_data: bool,
}

impl Default for LivenessDetector {
    fn default() -> Self {
        Self::new(DEFAULT_LIVENESS_WINDOW_MS)
    }
}

impl LivenessDetector {
    /// Detector that expires `window_ms` after the last accepted message
    pub fn new(window_ms: i64) -> Self {
        Self {
            window_ms,
            last_accepted_at: None,
            has_data: false,
        }
    }

    /// Record an accepted message at `now_ms`. Marks the source live.
    pub fn record_accept(&mut self, now_ms: i64) {
        self.last_accepted_at = Some(now_ms);
        self.has_data = true;
    }

    /// Re-derive liveness at `now_ms`.
    ///
    /// Returns `true` if the verdict changed.
    pub fn tick(&mut self, now_ms: i64) -> bool {
        let live = match self.last_accepted_at {
            Some(at) => now_ms.saturating_sub(at) < self.window_ms,
            None => false,
        };
        let changed = live != self.has_data;
        self.has_data = live;
        changed
    }

    /// Current verdict
    pub fn has_data(&self) -> bool {
        self.has_data
    }

    /// Time of the last accepted message, if any
    pub fn last_accepted_at(&self) -> Option<i64> {
        self.last_accepted_at
    }
}
