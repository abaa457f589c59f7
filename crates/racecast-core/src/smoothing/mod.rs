//! Motion Smoothing
//!
//! Turns irregular, discrete target updates into a smooth displayed value
//! per metric using a time-based quadratic ease-out. Displayed values never
//! overshoot their target and settle exactly on it.

mod engine;
mod segment;

pub use engine::{
    round_speed, round_whole, DisplayState, InterpolationEngine, DEFAULT_SMOOTHING_DURATION_MS,
};
pub use segment::{ease_out, InterpolationSegment, SegmentSamples};
