//! Latest-value store
//!
//! Holds the most recently accepted value per displayed metric. These are
//! the smoothing targets, not what is on screen.

use serde::{Deserialize, Serialize};

use crate::telemetry::Metric;

/// Most recent accepted value per metric, zero until data arrives
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatestValues {
    /// Calibrated speed
    pub speed: f64,
    /// Calibrated RPM
    pub rpm: f64,
    /// Calibrated throttle
    pub throttle: f64,
}

impl LatestValues {
    /// Value currently stored for `metric`
    pub fn get(&self, metric: &Metric) -> Option<f64> {
        match metric {
            Metric::Speed => Some(self.speed),
            Metric::Rpm => Some(self.rpm),
            Metric::Throttle => Some(self.throttle),
            Metric::Other(_) => None,
        }
    }

    /// Write `value` into the slot for `metric`.
    ///
    /// Returns `true` if the stored value changed. Metrics without a slot
    /// are ignored.
    pub fn set(&mut self, metric: &Metric, value: f64) -> bool {
        let slot = match metric {
            Metric::Speed => &mut self.speed,
            Metric::Rpm => &mut self.rpm,
            Metric::Throttle => &mut self.throttle,
            Metric::Other(_) => return false,
        };
        // Exact comparison: an equal value must not restart the animation.
        let changed = *slot != value;
        *slot = value;
        changed
    }
}
