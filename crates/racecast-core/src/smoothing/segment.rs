//! Interpolation segments

use serde::{Deserialize, Serialize};

/// Quadratic ease-out: fast initial motion, decelerating into the target.
///
/// Monotone on `[0, 1]` with `ease_out(0) == 0` and `ease_out(1) == 1`.
pub fn ease_out(progress: f64) -> f64 {
    let p = progress.clamp(0.0, 1.0);
    1.0 - (1.0 - p) * (1.0 - p)
}

/// One metric's active animation: from `start_value` at `start_time` toward
/// `target_value`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterpolationSegment {
    /// Displayed value when the segment started
    pub start_value: f64,
    /// Milliseconds on the pipeline's monotonic clock
    pub start_time: i64,
    /// Value the segment settles on
    pub target_value: f64,
}

impl InterpolationSegment {
    /// Segment from `start_value` at `start_time` toward `target_value`
    pub fn new(start_value: f64, start_time: i64, target_value: f64) -> Self {
        Self {
            start_value,
            start_time,
            target_value,
        }
    }

    /// Linear progress through the segment at `now`, clamped to `[0, 1]`.
    ///
    /// A zero duration completes immediately.
    pub fn progress(&self, now: i64, duration_ms: u64) -> f64 {
        if duration_ms == 0 {
            return 1.0;
        }
        let elapsed = now.saturating_sub(self.start_time) as f64;
        (elapsed / duration_ms as f64).clamp(0.0, 1.0)
    }

    /// True once the segment has reached its target
    pub fn is_complete(&self, now: i64, duration_ms: u64) -> bool {
        self.progress(now, duration_ms) >= 1.0
    }

    /// Eased value at `now`.
    ///
    /// Always within `[start_value, target_value]` (either order), and
    /// exactly `target_value` once complete.
    pub fn value_at(&self, now: i64, duration_ms: u64) -> f64 {
        let eased = ease_out(self.progress(now, duration_ms));
        if eased >= 1.0 {
            return self.target_value;
        }
        let v = self.start_value + (self.target_value - self.start_value) * eased;
        let (lo, hi) = if self.start_value <= self.target_value {
            (self.start_value, self.target_value)
        } else {
            (self.target_value, self.start_value)
        };
        v.clamp(lo, hi)
    }

    /// Lazy, finite sequence of frame samples from the start of the segment
    /// to its target, one every `frame_interval_ms`. The last sample is the
    /// target itself.
    pub fn samples(&self, duration_ms: u64, frame_interval_ms: u64) -> SegmentSamples {
        SegmentSamples {
            segment: *self,
            duration_ms,
            frame_interval_ms: frame_interval_ms.max(1) as i64,
            next_time: self.start_time,
            done: false,
        }
    }
}

/// Iterator returned by [`InterpolationSegment::samples`]
#[derive(Debug, Clone)]
pub struct SegmentSamples {
    segment: InterpolationSegment,
    duration_ms: u64,
    frame_interval_ms: i64,
    next_time: i64,
    done: bool,
}

impl Iterator for SegmentSamples {
    /// `(time, value)`
    type Item = (i64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let t = self.next_time;
        if self.segment.is_complete(t, self.duration_ms) {
            self.done = true;
        }
        self.next_time = t.saturating_add(self.frame_interval_ms);
        Some((t, self.segment.value_at(t, self.duration_ms)))
    }
}
