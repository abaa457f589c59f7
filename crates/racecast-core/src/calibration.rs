//! Value Calibration
//!
//! Per-metric transforms applied to accepted values before they become
//! smoothing targets:
//! - Truncation to whole units (RPM, throttle, speed by default)
//! - Fixed scale factors
//! - Gear-ratio correction for speed read off a swapped final drive
//! - Speed unit conversion: km/h to mph

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Gear-ratio correction used on the race car: the ECU computes speed for
/// the stock 6.47 final drive, the car runs 5.50.
pub const RACE_GEAR_RATIO: (f64, f64) = (550.0, 647.0);

/// Convert km/h to mph
pub fn kmh_to_mph(kmh: f64) -> f64 {
    kmh * 0.62137119223733
}

/// A value transform applied on the accept path.
///
/// Implemented by [`Calibration`] and by plain closures, so hosts can plug
/// in their own correction without touching the filter.
pub trait Calibrate: Send + Sync {
    /// Transform a raw metric value
    fn calibrate(&self, raw: f64) -> f64;
}

impl<F> Calibrate for F
where
    F: Fn(f64) -> f64 + Send + Sync,
{
    fn calibrate(&self, raw: f64) -> f64 {
        self(raw)
    }
}

/// Configurable calibration transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Calibration {
    /// Pass the value through unchanged
    Identity,
    /// Drop the fractional part
    Truncate,
    /// Multiply by a fixed factor
    Scale {
        factor: f64,
        #[serde(default)]
        truncate: bool,
    },
    /// Multiply by `numerator / denominator`
    GearRatio {
        numerator: f64,
        denominator: f64,
        #[serde(default)]
        truncate: bool,
    },
    /// Convert km/h to mph
    KmhToMph {
        #[serde(default)]
        truncate: bool,
    },
}

impl Default for Calibration {
    fn default() -> Self {
        Calibration::Truncate
    }
}

impl Calibration {
    /// Gear-ratio correction with the race car's ratio
    pub fn race_gear_ratio() -> Self {
        Calibration::GearRatio {
            numerator: RACE_GEAR_RATIO.0,
            denominator: RACE_GEAR_RATIO.1,
            truncate: false,
        }
    }

    /// Check the parameters describe a usable transform
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Calibration::Scale { factor, .. } if !factor.is_finite() => {
                Err(format!("scale factor must be finite, got {}", factor))
            }
            Calibration::GearRatio {
                numerator,
                denominator,
                ..
            } if !numerator.is_finite() || !denominator.is_finite() || *denominator == 0.0 => {
                Err(format!(
                    "gear ratio {}/{} is not a finite ratio",
                    numerator, denominator
                ))
            }
            _ => Ok(()),
        }
    }
}

fn maybe_trunc(v: f64, truncate: bool) -> f64 {
    if truncate {
        v.trunc()
    } else {
        v
    }
}

impl Calibrate for Calibration {
    fn calibrate(&self, raw: f64) -> f64 {
        match *self {
            Calibration::Identity => raw,
            Calibration::Truncate => raw.trunc(),
            Calibration::Scale { factor, truncate } => maybe_trunc(raw * factor, truncate),
            Calibration::GearRatio {
                numerator,
                denominator,
                truncate,
            } => maybe_trunc(raw * (numerator / denominator), truncate),
            Calibration::KmhToMph { truncate } => maybe_trunc(kmh_to_mph(raw), truncate),
        }
    }
}

/// Calibration settings for the three displayed metrics
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Speed transform, truncating by default
    pub speed: Calibration,
    /// RPM transform
    pub rpm: Calibration,
    /// Throttle transform
    pub throttle: Calibration,
}

/// Resolved transforms, shared by the freshness filter
#[derive(Clone)]
pub struct MetricCalibrations {
    /// Applied to SPEED
    pub speed: Arc<dyn Calibrate>,
    /// Applied to RPM
    pub rpm: Arc<dyn Calibrate>,
    /// Applied to THROTTLE_POS
    pub throttle: Arc<dyn Calibrate>,
}

impl MetricCalibrations {
    /// Replace the speed transform
    pub fn with_speed(mut self, speed: impl Calibrate + 'static) -> Self {
        self.speed = Arc::new(speed);
        self
    }
}

impl Default for MetricCalibrations {
    fn default() -> Self {
        CalibrationConfig::default().into()
    }
}

impl From<CalibrationConfig> for MetricCalibrations {
    fn from(cfg: CalibrationConfig) -> Self {
        Self {
            speed: Arc::new(cfg.speed),
            rpm: Arc::new(cfg.rpm),
            throttle: Arc::new(cfg.throttle),
        }
    }
}

impl std::fmt::Debug for MetricCalibrations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricCalibrations").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kmh_mph_conversion() {
        assert!((kmh_to_mph(100.0) - 62.14).abs() < 0.01);
        assert!((kmh_to_mph(160.934) - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_truncate_is_default() {
        assert_eq!(Calibration::default().calibrate(42.7), 42.0);
        assert_eq!(Calibration::default().calibrate(3999.99), 3999.0);
    }

    #[test]
    fn test_race_gear_ratio() {
        let cal = Calibration::race_gear_ratio();
        assert!((cal.calibrate(647.0) - 550.0).abs() < 1e-9);
        assert!((cal.calibrate(100.0) - 85.0077).abs() < 1e-3);
    }

    #[test]
    fn test_scale_with_truncation() {
        let cal = Calibration::Scale {
            factor: 2.5,
            truncate: true,
        };
        assert_eq!(cal.calibrate(3.1), 7.0);
    }

    #[test]
    fn test_closure_calibration() {
        let cals = MetricCalibrations::default().with_speed(|v: f64| v * 10.0);
        assert_eq!(cals.speed.calibrate(1.5), 15.0);
        assert_eq!(cals.rpm.calibrate(850.9), 850.0);
    }

    #[test]
    fn test_validate_rejects_zero_denominator() {
        let cal = Calibration::GearRatio {
            numerator: 1.0,
            denominator: 0.0,
            truncate: false,
        };
        assert!(cal.validate().is_err());
        assert!(Calibration::race_gear_ratio().validate().is_ok());
    }

    #[test]
    fn test_calibration_config_from_json() {
        let cfg: CalibrationConfig = serde_json::from_str(
            r#"{"speed":{"kind":"gear_ratio","numerator":550,"denominator":647}}"#,
        )
        .unwrap();
        assert_eq!(cfg.speed, Calibration::race_gear_ratio());
        assert_eq!(cfg.rpm, Calibration::Truncate);
    }
}
