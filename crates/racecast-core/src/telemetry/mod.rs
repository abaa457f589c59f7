//! Telemetry events
//!
//! Typed form of the metric records published on the telemetry topics,
//! plus the decoder that turns raw payloads into them.

mod decode;
mod error;

pub use decode::{decode, TelemetryPayload};
pub use error::DecodeError;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Metrics the pipeline knows how to display
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// Vehicle speed
    Speed,
    /// Engine speed
    Rpm,
    /// Throttle position (percent)
    Throttle,
    /// Anything else published on the topic (coolant, lap times, ...)
    Other(String),
}

impl Metric {
    /// Map a wire metric name to a metric.
    ///
    /// Names are matched exactly as the OBD publisher sends them.
    pub fn from_wire(name: &str) -> Self {
        match name {
            "SPEED" => Metric::Speed,
            "RPM" => Metric::Rpm,
            "THROTTLE_POS" | "THROTTLE" => Metric::Throttle,
            other => Metric::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Speed => write!(f, "SPEED"),
            Metric::Rpm => write!(f, "RPM"),
            Metric::Throttle => write!(f, "THROTTLE_POS"),
            Metric::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Metric value as published: publishers send numbers, the race timing
/// scraper also sends strings (lap times, positions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// JSON number
    Number(f64),
    /// JSON string
    Text(String),
}

impl MetricValue {
    /// Numeric view of the value, parsing numeric text.
    ///
    /// Returns `None` for non-numeric text and non-finite numbers.
    pub fn as_f64(&self) -> Option<f64> {
        let v = match self {
            MetricValue::Number(n) => *n,
            MetricValue::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        v.is_finite().then_some(v)
    }
}

/// A single decoded telemetry record
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    /// Emission time at the publisher, epoch milliseconds
    pub emitted_at_ms: i64,
    /// Publishing device id
    pub device: String,
    /// Which metric this record carries
    pub metric: Metric,
    /// Raw value
    pub value: MetricValue,
    /// Free-form tags (drive id, race id, ...)
    pub tags: HashMap<String, String>,
}

impl TelemetryEvent {
    /// Emission time as a UTC timestamp, if representable
    pub fn emitted_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.emitted_at_ms).single()
    }

    /// End-to-end latency relative to `now_ms`
    pub fn latency_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.emitted_at_ms)
    }
}
