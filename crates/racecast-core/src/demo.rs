//! Demo Mode - simulated vehicle publishing telemetry
//!
//! Generates realistic speed / RPM / throttle / coolant data for running the
//! pipeline without a broker or a car. The simulator wanders between idle,
//! accelerating, cruising and decelerating, with sensor noise on top.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

use crate::telemetry::{MetricValue, TelemetryPayload};
use crate::transport::{Transport, TransportError, TransportEvent};

/// Device id used in demo payloads
pub const DEMO_DEVICE_ID: &str = "demo-car";

/// Driving mode of the simulated vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveMode {
    /// Stopped or coasting down, engine at idle
    Idle,
    /// Throttle rising, revs following the gearing
    Accelerating,
    /// Part throttle around a steady speed
    Cruising,
    /// Off throttle and braking
    Decelerating,
}

/// Idle and cruising are twice as likely as the rest
const MODE_WEIGHTS: [DriveMode; 6] = [
    DriveMode::Idle,
    DriveMode::Idle,
    DriveMode::Accelerating,
    DriveMode::Cruising,
    DriveMode::Cruising,
    DriveMode::Decelerating,
];

/// Simulated vehicle state
pub struct VehicleSimulator {
    /// km/h
    speed: f64,
    rpm: f64,
    /// percent
    throttle: f64,
    /// °C
    coolant_temp: f64,
    mode: DriveMode,
    /// Updates spent in the current mode
    mode_timer: u32,
    rng: StdRng,
}

impl Default for VehicleSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl VehicleSimulator {
    /// Create a simulator idling at operating temperature
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic simulator for tests
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            speed: 0.0,
            rpm: 750.0,
            throttle: 0.0,
            coolant_temp: 85.0,
            mode: DriveMode::Idle,
            mode_timer: 0,
            rng,
        }
    }

    /// Current driving mode
    pub fn mode(&self) -> DriveMode {
        self.mode
    }

    /// Advance the simulation by one step
    pub fn update(&mut self) {
        self.mode_timer += 1;
        if self.mode_timer > self.rng.gen_range(5..=20) {
            self.mode_timer = 0;
            self.mode = *MODE_WEIGHTS.choose(&mut self.rng).unwrap_or(&DriveMode::Idle);
        }

        match self.mode {
            DriveMode::Idle => self.idle(),
            DriveMode::Accelerating => self.accelerate(),
            DriveMode::Cruising => self.cruise(),
            DriveMode::Decelerating => self.decelerate(),
        }

        // Sensor noise
        self.rpm += self.rng.gen_range(-20.0..20.0);
        self.speed += self.rng.gen_range(-0.5..0.5);
        self.throttle += self.rng.gen_range(-1.0..1.0);
        self.coolant_temp += self.rng.gen_range(-0.2..0.2);

        self.speed = self.speed.clamp(0.0, 140.0);
        self.rpm = self.rpm.clamp(600.0, 6500.0);
        self.throttle = self.throttle.clamp(0.0, 100.0);
        self.coolant_temp = self.coolant_temp.clamp(75.0, 105.0);
    }

    fn idle(&mut self) {
        self.throttle = (self.throttle - 5.0).max(0.0);
        self.speed = (self.speed - 2.0).max(0.0);
        if self.speed < 5.0 {
            self.rpm = 750.0 + self.rng.gen_range(-50.0..50.0);
        } else {
            // Coasting down
            self.rpm = (self.rpm - 100.0).max(750.0);
        }
    }

    fn accelerate(&mut self) {
        self.throttle = (self.throttle + self.rng.gen_range(5.0..15.0)).min(100.0);
        self.speed = (self.speed + self.throttle * 0.05).min(140.0);

        // Rough gearing: short gears rev high, top gears rev low
        let mut target_rpm = if self.speed < 30.0 {
            2000.0 + (self.speed / 30.0) * 3000.0
        } else if self.speed < 60.0 {
            2000.0 + (self.speed / 60.0) * 2000.0
        } else {
            2000.0 + (self.speed / 140.0) * 2500.0
        };
        target_rpm += self.throttle * 10.0;
        self.rpm += (target_rpm - self.rpm) * 0.3;
    }

    fn cruise(&mut self) {
        let target_throttle = 30.0 + self.rng.gen_range(-10.0..10.0);
        self.throttle += (target_throttle - self.throttle) * 0.2;
        self.speed += self.rng.gen_range(-1.0..1.0);

        let target_rpm = if self.speed < 40.0 {
            1500.0
        } else if self.speed < 80.0 {
            2000.0
        } else {
            2500.0
        };
        self.rpm += (target_rpm - self.rpm) * 0.2;
    }

    fn decelerate(&mut self) {
        self.throttle = (self.throttle - 10.0).max(0.0);
        self.speed = (self.speed - self.rng.gen_range(3.0..8.0)).max(0.0);
        if self.speed > 10.0 {
            let target_rpm = 1200.0 + (self.speed / 140.0) * 1500.0;
            self.rpm += (target_rpm - self.rpm) * 0.3;
        } else {
            self.rpm += (750.0 - self.rpm) * 0.2;
        }
    }

    /// Current readings keyed by wire metric name, rounded to one decimal
    pub fn readings(&self) -> [(&'static str, f64); 4] {
        let r = |v: f64| (v * 10.0).round() / 10.0;
        [
            ("RPM", r(self.rpm)),
            ("SPEED", r(self.speed)),
            ("THROTTLE_POS", r(self.throttle)),
            ("COOLANT_TEMP", r(self.coolant_temp)),
        ]
    }

    /// Wire payloads for the current readings, stamped `ts_ms`
    pub fn payloads(&self, device: &str, drive_id: &str, ts_ms: i64) -> Vec<TelemetryPayload> {
        self.readings()
            .iter()
            .map(|(metric, value)| TelemetryPayload {
                ts_ms,
                device: device.to_string(),
                metric: metric.to_string(),
                value: MetricValue::Number(*value),
                tags: Some(HashMap::from([("drive".to_string(), drive_id.to_string())])),
            })
            .collect()
    }
}

/// Transport that "connects" instantly and publishes simulator readings on
/// a fixed period, stamped with the wall clock.
pub struct DemoTransport {
    simulator: VehicleSimulator,
    period: Duration,
    ticker: Option<Interval>,
    drive_id: String,
    connected: bool,
    subscribed: bool,
    pending: VecDeque<TransportEvent>,
}

impl DemoTransport {
    /// Publish a reading of every metric each `period`
    pub fn new(simulator: VehicleSimulator, period: Duration) -> Self {
        Self {
            simulator,
            period,
            ticker: None,
            drive_id: format!("drive-{}", Utc::now().format("%Y-%m-%dT%H:%M:%S")),
            connected: false,
            subscribed: false,
            pending: VecDeque::new(),
        }
    }

    fn publish_readings(&mut self) {
        let ts_ms = Utc::now().timestamp_millis();
        for payload in self.simulator.payloads(DEMO_DEVICE_ID, &self.drive_id, ts_ms) {
            self.pending.push_back(TransportEvent::Message {
                topic: format!("telemetry/{}/{}", DEMO_DEVICE_ID, payload.metric),
                payload: payload.to_bytes(),
            });
        }
    }
}

impl Transport for DemoTransport {
    async fn poll(&mut self) -> Result<TransportEvent, TransportError> {
        if !self.connected {
            self.connected = true;
            return Ok(TransportEvent::Connected);
        }
        loop {
            if let Some(event) = self.pending.pop_front() {
                // Like a broker, nothing is delivered without a subscription
                if self.subscribed {
                    return Ok(event);
                }
                continue;
            }
            let period = self.period.max(Duration::from_millis(1));
            let ticker = self.ticker.get_or_insert_with(|| {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker
            });
            ticker.tick().await;
            self.simulator.update();
            self.publish_readings();
        }
    }

    fn subscribe(&mut self, _topic: &str) -> Result<(), TransportError> {
        self.subscribed = true;
        Ok(())
    }

    fn close(&mut self) {
        self.connected = false;
        self.subscribed = false;
        self.ticker = None;
        self.pending.clear();
    }
}
