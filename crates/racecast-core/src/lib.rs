//! # Racecast Core Library
//!
//! Live vehicle telemetry ingestion and smoothing.
//!
//! This library provides:
//! - A supervised pub/sub subscription (MQTT over TCP or WebSocket) with
//!   reconnect-and-backoff
//! - Decoding of timestamped metric payloads
//! - Freshness filtering and per-metric calibration
//! - Liveness detection for the data source
//! - Time-based ease-out smoothing of the displayed values
//! - A vehicle simulator for running without a broker
//!
//! ## Example
//!
//! ```rust,ignore
//! use racecast_core::prelude::*;
//!
//! let config = PipelineConfig::from_file("racecast.json")?;
//! let mut pipeline = Pipeline::with_mqtt(&config)?;
//!
//! let mut snapshots = pipeline.subscribe();
//! while snapshots.changed().await.is_ok() {
//!     let snap = *snapshots.borrow();
//!     println!("{} km/h, {} rpm", snap.speed, snap.rpm);
//! }
//! pipeline.shutdown().await;
//! ```

#![warn(missing_docs)]

/// Per-metric value transforms
pub mod calibration;
/// Pipeline configuration file
pub mod config;
/// Simulated vehicle for running without a broker
pub mod demo;
/// Staleness and metric filtering
pub mod freshness;
/// Data source liveness
pub mod liveness;
pub mod pipeline;
pub mod smoothing;
/// Smoothing targets
pub mod store;
pub mod telemetry;
pub mod transport;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::calibration::{Calibrate, Calibration, CalibrationConfig, MetricCalibrations};
    pub use crate::config::{ConfigError, PipelineConfig};
    pub use crate::demo::{DemoTransport, VehicleSimulator};
    pub use crate::freshness::{DropReason, FreshnessFilter, Verdict};
    pub use crate::liveness::LivenessDetector;
    pub use crate::pipeline::{
        Clock, Pipeline, PipelineInput, PipelineStats, SystemClock, TelemetrySnapshot,
        TelemetryState,
    };
    pub use crate::smoothing::{DisplayState, InterpolationEngine, InterpolationSegment};
    pub use crate::store::LatestValues;
    pub use crate::telemetry::{decode, DecodeError, Metric, MetricValue, TelemetryEvent};
    pub use crate::transport::{
        ConnectionEvent, ConnectionManager, ConnectionState, MqttTransport, Transport,
        TransportConfig, TransportError, TransportEvent, TransportProtocol,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
