//! Interpolation engine
//!
//! Drives the displayed value of each metric toward its latest target.
//! Metrics animate independently but share the caller's clock.

use serde::{Deserialize, Serialize};

use super::segment::InterpolationSegment;
use crate::telemetry::Metric;

/// Default smoothing duration in milliseconds
pub const DEFAULT_SMOOTHING_DURATION_MS: u64 = 500;

/// Displayed values, unrounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayState {
    /// km/h
    pub speed: f64,
    /// Engine revolutions per minute
    pub rpm: f64,
    /// Percent
    pub throttle: f64,
}

/// Round a speed for presentation: two decimal places
pub fn round_speed(v: f64) -> f64 {
    // `+ 0.0` turns -0.0 into 0.0
    (v * 100.0).round() / 100.0 + 0.0
}

/// Round RPM or throttle for presentation: nearest integer
pub fn round_whole(v: f64) -> f64 {
    v.round() + 0.0
}

impl DisplayState {
    /// Presentation form: speed to two decimals, RPM and throttle to the
    /// nearest integer
    pub fn rounded(&self) -> DisplayState {
        DisplayState {
            speed: round_speed(self.speed),
            rpm: round_whole(self.rpm),
            throttle: round_whole(self.throttle),
        }
    }

    /// Displayed value of `metric`, `None` for metrics without a slot
    pub fn get(&self, metric: &Metric) -> Option<f64> {
        match metric {
            Metric::Speed => Some(self.speed),
            Metric::Rpm => Some(self.rpm),
            Metric::Throttle => Some(self.throttle),
            Metric::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Channel {
    displayed: f64,
    segment: Option<InterpolationSegment>,
}

impl Channel {
    /// Move the displayed value to where the active segment is at `now`.
    /// Returns `true` while the segment is still running.
    fn advance(&mut self, now: i64, duration_ms: u64) -> bool {
        let Some(seg) = self.segment else {
            return false;
        };
        self.displayed = seg.value_at(now, duration_ms);
        if seg.is_complete(now, duration_ms) {
            self.segment = None;
            false
        } else {
            true
        }
    }
}

/// Per-metric smoothing toward the latest targets
#[derive(Debug, Clone)]
pub struct InterpolationEngine {
    duration_ms: u64,
    speed: Channel,
    rpm: Channel,
    throttle: Channel,
}

impl Default for InterpolationEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_DURATION_MS)
    }
}

impl InterpolationEngine {
    /// Create an engine at the zero baseline
    pub fn new(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            speed: Channel::default(),
            rpm: Channel::default(),
            throttle: Channel::default(),
        }
    }

    fn channel_mut(&mut self, metric: &Metric) -> Option<&mut Channel> {
        match metric {
            Metric::Speed => Some(&mut self.speed),
            Metric::Rpm => Some(&mut self.rpm),
            Metric::Throttle => Some(&mut self.throttle),
            Metric::Other(_) => None,
        }
    }

    fn channel(&self, metric: &Metric) -> Option<&Channel> {
        match metric {
            Metric::Speed => Some(&self.speed),
            Metric::Rpm => Some(&self.rpm),
            Metric::Throttle => Some(&self.throttle),
            Metric::Other(_) => None,
        }
    }

    /// Start a new segment for `metric` toward `target`.
    ///
    /// The segment starts from wherever the display is at `now`, not from
    /// the previous target, so an update mid-animation changes direction
    /// without a jump. Any running segment for the metric is discarded.
    pub fn on_target_changed(&mut self, metric: &Metric, target: f64, now: i64) {
        let duration_ms = self.duration_ms;
        let Some(ch) = self.channel_mut(metric) else {
            return;
        };
        ch.advance(now, duration_ms);
        ch.segment = Some(InterpolationSegment::new(ch.displayed, now, target));
    }

    /// Advance every running segment to `now` and return the displayed
    /// values. Metrics at rest are left untouched.
    pub fn tick(&mut self, now: i64) -> DisplayState {
        let duration_ms = self.duration_ms;
        self.speed.advance(now, duration_ms);
        self.rpm.advance(now, duration_ms);
        self.throttle.advance(now, duration_ms);
        self.display()
    }

    /// Current displayed values without advancing time
    pub fn display(&self) -> DisplayState {
        DisplayState {
            speed: self.speed.displayed,
            rpm: self.rpm.displayed,
            throttle: self.throttle.displayed,
        }
    }

    /// True while any metric still needs frames
    pub fn is_animating(&self) -> bool {
        self.speed.segment.is_some()
            || self.rpm.segment.is_some()
            || self.throttle.segment.is_some()
    }

    /// Active segment for `metric`, if it is animating
    pub fn segment(&self, metric: &Metric) -> Option<&InterpolationSegment> {
        self.channel(metric).and_then(|ch| ch.segment.as_ref())
    }

    /// Smoothing duration in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }
}
