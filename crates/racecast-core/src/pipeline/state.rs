//! Pipeline state
//!
//! Everything the pipeline knows lives in one [`TelemetryState`], changed
//! only through [`TelemetryState::apply`]. Transport events, liveness ticks
//! and frame ticks all go through that entry point, one at a time.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calibration::MetricCalibrations;
use crate::config::PipelineConfig;
use crate::freshness::{DropReason, FreshnessFilter, Verdict};
use crate::liveness::LivenessDetector;
use crate::smoothing::{round_speed, round_whole, DisplayState, InterpolationEngine};
use crate::store::LatestValues;
use crate::telemetry::decode;
use crate::transport::{ConnectionEvent, ConnectionState};

/// One input to the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineInput {
    /// Event from the connection manager
    Connection(ConnectionEvent),
    /// Periodic liveness re-evaluation
    LivenessTick,
    /// Animation frame
    Frame,
}

/// When an input is applied, on both clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Now {
    /// Wall clock in epoch milliseconds, compared with publisher timestamps
    pub wall_ms: i64,
    /// Monotonic milliseconds, driving liveness and smoothing
    pub monotonic_ms: i64,
}

impl Now {
    /// Readings from both clocks
    pub fn new(wall_ms: i64, monotonic_ms: i64) -> Self {
        Self {
            wall_ms,
            monotonic_ms,
        }
    }
}

impl From<i64> for Now {
    /// Both clocks at the same reading
    fn from(ms: i64) -> Self {
        Self::new(ms, ms)
    }
}

/// Message counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Messages applied
    pub accepted: u64,
    /// Dropped for latency
    pub stale: u64,
    /// Dropped for a metric with no display slot
    pub unrecognized: u64,
    /// Dropped for a non-numeric or non-finite value
    pub invalid_value: u64,
    /// Payloads that did not decode
    pub decode_errors: u64,
    /// Latency of the most recent decoded message, accepted or not
    pub last_latency_ms: Option<i64>,
}

impl PipelineStats {
    fn count_drop(&mut self, reason: DropReason) {
        match reason {
            DropReason::Stale => self.stale += 1,
            DropReason::Unrecognized => self.unrecognized += 1,
            DropReason::InvalidValue => self.invalid_value += 1,
        }
    }
}

/// What the display shows: rounded values plus connection and liveness
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Two decimal places
    pub speed: f64,
    /// Whole RPM
    pub rpm: i64,
    /// Whole percent
    pub throttle: i64,
    /// Transport session state
    pub connection: ConnectionState,
    /// Source is live
    pub has_data: bool,
}

impl TelemetrySnapshot {
    fn from_parts(display: DisplayState, connection: ConnectionState, has_data: bool) -> Self {
        Self {
            speed: round_speed(display.speed),
            rpm: round_whole(display.rpm) as i64,
            throttle: round_whole(display.throttle) as i64,
            connection,
            has_data,
        }
    }
}

/// Single owner of the pipeline's mutable state
#[derive(Debug)]
pub struct TelemetryState {
    filter: FreshnessFilter,
    latest: LatestValues,
    liveness: LivenessDetector,
    engine: InterpolationEngine,
    connection: ConnectionState,
    stats: PipelineStats,
}

impl Default for TelemetryState {
    fn default() -> Self {
        Self::new(&PipelineConfig::default())
    }
}

impl TelemetryState {
    /// Zero baseline, disconnected, no data
    pub fn new(config: &PipelineConfig) -> Self {
        let calibrations = MetricCalibrations::from(config.calibration.clone());
        Self {
            filter: FreshnessFilter::new(config.max_message_age_ms, calibrations),
            latest: LatestValues::default(),
            liveness: LivenessDetector::new(config.liveness_window_ms),
            engine: InterpolationEngine::new(config.smoothing_duration_ms),
            connection: ConnectionState::Disconnected,
            stats: PipelineStats::default(),
        }
    }

    /// Replace the freshness filter (custom calibrations)
    pub fn with_filter(mut self, filter: FreshnessFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Apply one input at `now`.
    ///
    /// Latency is measured on the wall clock; liveness and smoothing run on
    /// the monotonic clock, so a wall-clock step cannot freeze the display.
    /// A bare `i64` uses the same reading for both.
    ///
    /// Returns `true` if the snapshot may have changed.
    pub fn apply(&mut self, input: PipelineInput, now: impl Into<Now>) -> bool {
        let now = now.into();
        match input {
            PipelineInput::Connection(ConnectionEvent::State(state)) => {
                let changed = self.connection != state;
                self.connection = state;
                changed
            }
            PipelineInput::Connection(ConnectionEvent::Payload { topic, payload }) => {
                self.on_payload(&topic, &payload, now)
            }
            PipelineInput::LivenessTick => self.liveness.tick(now.monotonic_ms),
            PipelineInput::Frame => {
                let before = self.engine.display();
                self.engine.tick(now.monotonic_ms) != before
            }
        }
    }

    fn on_payload(&mut self, topic: &str, payload: &[u8], now: Now) -> bool {
        let event = match decode(payload) {
            Ok(event) => event,
            Err(e) => {
                self.stats.decode_errors += 1;
                debug!("pipeline: undecodable payload on {}: {}", topic, e);
                return false;
            }
        };

        match self.filter.accept(&event, now.wall_ms) {
            Verdict::Accepted(update) => {
                self.stats.accepted += 1;
                self.stats.last_latency_ms = Some(update.latency_ms);
                let was_live = self.liveness.has_data();
                self.liveness.record_accept(now.monotonic_ms);
                if self.latest.set(&update.metric, update.value) {
                    self.engine.on_target_changed(&update.metric, update.value, now.monotonic_ms);
                }
                !was_live
            }
            Verdict::Dropped { reason, latency_ms } => {
                self.stats.count_drop(reason);
                self.stats.last_latency_ms = Some(latency_ms);
                debug!(
                    "pipeline: dropped {} from {} ({:?}, latency {}ms)",
                    event.metric, event.device, reason, latency_ms
                );
                false
            }
        }
    }

    /// Rounded snapshot for the display
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot::from_parts(
            self.engine.display(),
            self.connection,
            self.liveness.has_data(),
        )
    }

    /// Smoothing targets
    pub fn latest(&self) -> LatestValues {
        self.latest
    }

    /// Displayed values, unrounded
    pub fn display(&self) -> DisplayState {
        self.engine.display()
    }

    /// Message counters so far
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Last connection state applied
    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Current liveness verdict
    pub fn has_data(&self) -> bool {
        self.liveness.has_data()
    }

    /// Monotonic time of the last accepted message, `None` before the first
    pub fn last_accepted_at(&self) -> Option<i64> {
        self.liveness.last_accepted_at()
    }

    /// True while any displayed value is still moving
    pub fn is_animating(&self) -> bool {
        self.engine.is_animating()
    }

    /// Smoothing engine, for inspecting active segments
    pub fn engine(&self) -> &InterpolationEngine {
        &self.engine
    }
}
