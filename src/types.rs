//! Core data types for the fall sensing engine.
//!
//! This module defines the values that flow between the pipeline stages:
//! raw samples in, classification states in the middle, and the
//! acceleration unit contract that ties them together.
//!
//! Design principle: Types should make intent obvious. If a concept exists,
//! it gets a type. Never pass raw tuples across stage boundaries.

use serde::{Deserialize, Serialize};

/// Standard gravity in m/s².
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Unit in which the sensor source reports acceleration.
///
/// The mobile sensor APIs this engine was tuned against report in g. The
/// window's max statistic is always reported in m/s², while mean and
/// variance stay in this native unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccelUnit {
    /// Multiples of standard gravity.
    #[default]
    StandardGravity,
    /// Metres per second squared.
    MetersPerSecondSquared,
}

impl AccelUnit {
    /// Factor converting a value in this unit to m/s².
    pub fn to_ms2(&self) -> f64 {
        match self {
            AccelUnit::StandardGravity => STANDARD_GRAVITY,
            AccelUnit::MetersPerSecondSquared => 1.0,
        }
    }
}

/// A single normalized inertial sample.
///
/// Three-axis accelerometer (in the configured [`AccelUnit`]), three-axis
/// gyroscope in rad/s, and an optional barometric pressure in hPa. Immutable
/// once produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Monotonic timestamp in milliseconds.
    pub timestamp_ms: u64,

    /// Accelerometer reading [x, y, z].
    pub accel: [f64; 3],

    /// Gyroscope reading [x, y, z] in rad/s.
    pub gyro: [f64; 3],

    /// Optional barometer reading in hPa.
    pub pressure_hpa: Option<f64>,
}

impl Sample {
    /// Creates a sample with accelerometer and gyroscope only.
    pub fn new(timestamp_ms: u64, accel: [f64; 3], gyro: [f64; 3]) -> Self {
        Self {
            timestamp_ms,
            accel,
            gyro,
            pressure_hpa: None,
        }
    }

    /// Attach a barometer reading.
    pub fn with_pressure(mut self, pressure_hpa: f64) -> Self {
        self.pressure_hpa = Some(pressure_hpa);
        self
    }

    /// Euclidean norm of the acceleration vector, in the source unit.
    pub fn accel_magnitude(&self) -> f64 {
        magnitude(&self.accel)
    }

    /// Euclidean norm of the rotation-rate vector in rad/s.
    pub fn gyro_magnitude(&self) -> f64 {
        magnitude(&self.gyro)
    }

    /// True when every component (and pressure, if present) is a finite number.
    pub fn is_finite(&self) -> bool {
        self.accel.iter().chain(self.gyro.iter()).all(|v| v.is_finite())
            && self.pressure_hpa.map_or(true, f64::is_finite)
    }
}

/// Euclidean norm of a three-component vector.
pub fn magnitude(v: &[f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Discrete motion state produced by the classifier every sample.
///
/// Not latched: the episode tracker is what turns a `Fall` edge into state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassificationState {
    /// Nothing unusual.
    #[default]
    Normal,
    /// One strong indicator (impact or stillness) present.
    Suspicious,
    /// Impact and stillness together.
    Fall,
}

impl ClassificationState {
    /// Upper-case label, as shown to the wearer.
    pub fn label(&self) -> &'static str {
        match self {
            ClassificationState::Normal => "NORMAL",
            ClassificationState::Suspicious => "SUSPICIOUS",
            ClassificationState::Fall => "FALL",
        }
    }
}

/// Barometer availability, queried once when the engine is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorCapabilities {
    /// The device exposes a pressure sensor.
    pub barometer: bool,
}

impl SensorCapabilities {
    /// Accelerometer and gyroscope only.
    pub fn inertial_only() -> Self {
        Self { barometer: false }
    }

    /// Accelerometer, gyroscope and barometer.
    pub fn with_barometer() -> Self {
        Self { barometer: true }
    }
}
