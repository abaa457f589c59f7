//! Freshness filter
//!
//! Decides whether a decoded event is applied: events older than the
//! staleness threshold are dropped, metrics without a display slot are
//! dropped, and accepted values go through their calibration transform.

use crate::calibration::{Calibrate, MetricCalibrations};
use crate::telemetry::{Metric, TelemetryEvent};

/// Default staleness threshold in milliseconds
pub const DEFAULT_MAX_MESSAGE_AGE_MS: i64 = 1000;

/// Why an event was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// End-to-end latency above the staleness threshold
    Stale,
    /// Metric has no display slot
    Unrecognized,
    /// Value is not a finite number
    InvalidValue,
}

/// An event that passed the filter, value already calibrated
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedUpdate {
    /// One of the displayed metrics
    pub metric: Metric,
    /// Calibrated value
    pub value: f64,
    /// Latency observed for this event
    pub latency_ms: i64,
}

/// Outcome of running an event through the filter
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// The event should update its metric
    Accepted(AcceptedUpdate),
    /// The event changes nothing
    Dropped {
        /// Why it was dropped
        reason: DropReason,
        /// Latency observed for this event
        latency_ms: i64,
    },
}

/// Staleness and metric filter
#[derive(Debug, Clone)]
pub struct FreshnessFilter {
    max_message_age_ms: i64,
    calibrations: MetricCalibrations,
}

impl Default for FreshnessFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_AGE_MS, MetricCalibrations::default())
    }
}

impl FreshnessFilter {
    /// Create a filter with the given staleness threshold and transforms
    pub fn new(max_message_age_ms: i64, calibrations: MetricCalibrations) -> Self {
        Self {
            max_message_age_ms,
            calibrations,
        }
    }

    /// Staleness threshold in milliseconds
    pub fn max_message_age_ms(&self) -> i64 {
        self.max_message_age_ms
    }

    /// Classify `event` at wall-clock time `now_ms`.
    ///
    /// Events stamped in the future (publisher clock ahead of ours) have a
    /// negative latency and are accepted.
    pub fn accept(&self, event: &TelemetryEvent, now_ms: i64) -> Verdict {
        let latency_ms = event.latency_ms(now_ms);
        if latency_ms > self.max_message_age_ms {
            return Verdict::Dropped {
                reason: DropReason::Stale,
                latency_ms,
            };
        }

        let calibration: &dyn Calibrate = match event.metric {
            Metric::Speed => self.calibrations.speed.as_ref(),
            Metric::Rpm => self.calibrations.rpm.as_ref(),
            Metric::Throttle => self.calibrations.throttle.as_ref(),
            Metric::Other(_) => {
                return Verdict::Dropped {
                    reason: DropReason::Unrecognized,
                    latency_ms,
                }
            }
        };

        let value = match event.value.as_f64().map(|v| calibration.calibrate(v)) {
            Some(v) if v.is_finite() => v,
            _ => {
                return Verdict::Dropped {
                    reason: DropReason::InvalidValue,
                    latency_ms,
                }
            }
        };

        Verdict::Accepted(AcceptedUpdate {
            metric: event.metric.clone(),
            value,
            latency_ms,
        })
    }
}
