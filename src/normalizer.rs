//! Sample normalization.
//!
//! Sensor drivers deliver acceleration, rotation and pressure on independent
//! callbacks, at whatever rate the platform manages. This module folds those
//! callbacks into uniform timestamped [`Sample`] records:
//! - Acceleration callbacks are the sample clock: each one emits a sample
//! - Rotation readings are cached and attached to the next sample
//! - Pressure readings are attached once, to the first sample after arrival
//!
//! A callback invoked with partial or non-finite data is rejected without
//! touching any cached state.

use serde::{Deserialize, Serialize};

use crate::error::{FallError, Result};
use crate::types::{SensorCapabilities, Sample};

/// A raw tri-axial reading as delivered by a sensor callback.
///
/// Every axis is optional because drivers have been observed to invoke
/// listeners with incomplete objects.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RawAxes {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl RawAxes {
    /// A complete reading.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
        }
    }

    /// Validate and convert into a vector.
    pub fn to_vector(&self, what: &str) -> Result<[f64; 3]> {
        match (self.x, self.y, self.z) {
            (Some(x), Some(y), Some(z)) if x.is_finite() && y.is_finite() && z.is_finite() => {
                Ok([x, y, z])
            }
            (Some(_), Some(_), Some(_)) => Err(FallError::MalformedReading(format!(
                "{what} reading has a non-finite component"
            ))),
            _ => Err(FallError::MalformedReading(format!(
                "{what} reading is missing an axis"
            ))),
        }
    }
}

impl From<[f64; 3]> for RawAxes {
    fn from(v: [f64; 3]) -> Self {
        RawAxes::new(v[0], v[1], v[2])
    }
}

/// Folds independent sensor callbacks into [`Sample`]s.
#[derive(Debug, Clone)]
pub struct SampleNormalizer {
    capabilities: SensorCapabilities,
    latest_gyro: [f64; 3],
    pending_pressure: Option<f64>,
    emitted: u64,
    rejected: u64,
}

impl SampleNormalizer {
    /// Create a normalizer for a device with the given capabilities.
    pub fn new(capabilities: SensorCapabilities) -> Self {
        Self {
            capabilities,
            latest_gyro: [0.0; 3],
            pending_pressure: None,
            emitted: 0,
            rejected: 0,
        }
    }

    /// Acceleration callback. Emits one sample per accepted reading.
    pub fn on_acceleration(&mut self, timestamp_ms: u64, raw: RawAxes) -> Result<Sample> {
        let accel = match raw.to_vector("acceleration") {
            Ok(v) => v,
            Err(e) => {
                self.rejected += 1;
                return Err(e);
            }
        };

        let mut sample = Sample::new(timestamp_ms, accel, self.latest_gyro);
        if self.capabilities.barometer {
            sample.pressure_hpa = self.pending_pressure.take();
        }
        self.emitted += 1;
        Ok(sample)
    }

    /// Rotation callback. Caches the reading for the next sample.
    pub fn on_rotation(&mut self, raw: RawAxes) -> Result<()> {
        match raw.to_vector("rotation") {
            Ok(v) => {
                self.latest_gyro = v;
                Ok(())
            }
            Err(e) => {
                self.rejected += 1;
                Err(e)
            }
        }
    }

    /// Pressure callback in hPa. Ignored when the device has no barometer.
    pub fn on_pressure(&mut self, pressure_hpa: Option<f64>) -> Result<()> {
        if !self.capabilities.barometer {
            return Ok(());
        }
        match pressure_hpa {
            Some(p) if p.is_finite() && p > 0.0 => {
                self.pending_pressure = Some(p);
                Ok(())
            }
            _ => {
                self.rejected += 1;
                Err(FallError::MalformedReading(
                    "pressure reading is missing or not a positive number".to_string(),
                ))
            }
        }
    }

    /// Number of samples emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Number of callbacks rejected as malformed.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acceleration_emits_sample_with_cached_rotation() {
        let mut normalizer = SampleNormalizer::new(SensorCapabilities::inertial_only());

        let first = normalizer.on_acceleration(0, RawAxes::new(0.0, 0.0, 1.0)).unwrap();
        assert_eq!(first.gyro, [0.0; 3]);

        normalizer.on_rotation(RawAxes::new(0.1, 0.2, 0.3)).unwrap();
        let second = normalizer.on_acceleration(50, RawAxes::new(0.0, 0.0, 1.0)).unwrap();
        assert_eq!(second.timestamp_ms, 50);
        assert_eq!(second.gyro, [0.1, 0.2, 0.3]);
        assert_eq!(normalizer.emitted(), 2);
    }

    #[test]
    fn test_partial_reading_rejected_without_side_effects() {
        let mut normalizer = SampleNormalizer::new(SensorCapabilities::inertial_only());
        normalizer.on_rotation(RawAxes::new(1.0, 1.0, 1.0)).unwrap();

        let partial = RawAxes {
            x: Some(0.5),
            y: None,
            z: Some(0.5),
        };
        assert!(matches!(
            normalizer.on_rotation(partial),
            Err(FallError::MalformedReading(_))
        ));
        assert!(normalizer
            .on_acceleration(0, RawAxes::new(f64::NAN, 0.0, 1.0))
            .is_err());

        let sample = normalizer.on_acceleration(0, RawAxes::new(0.0, 0.0, 1.0)).unwrap();
        assert_eq!(sample.gyro, [1.0, 1.0, 1.0]);
        assert_eq!(normalizer.rejected(), 2);
        assert_eq!(normalizer.emitted(), 1);
    }

    #[test]
    fn test_pressure_attached_once() {
        let mut normalizer = SampleNormalizer::new(SensorCapabilities::with_barometer());
        normalizer.on_pressure(Some(1013.2)).unwrap();

        let a = normalizer.on_acceleration(0, RawAxes::new(0.0, 0.0, 1.0)).unwrap();
        let b = normalizer.on_acceleration(50, RawAxes::new(0.0, 0.0, 1.0)).unwrap();
        assert_eq!(a.pressure_hpa, Some(1013.2));
        assert_eq!(b.pressure_hpa, None);
    }

    #[test]
    fn test_pressure_ignored_without_barometer() {
        let mut normalizer = SampleNormalizer::new(SensorCapabilities::inertial_only());
        assert!(normalizer.on_pressure(Some(1013.2)).is_ok());
        assert!(normalizer.on_pressure(None).is_ok());

        let sample = normalizer.on_acceleration(0, RawAxes::new(0.0, 0.0, 1.0)).unwrap();
        assert_eq!(sample.pressure_hpa, None);
    }

    #[test]
    fn test_invalid_pressure_rejected() {
        let mut normalizer = SampleNormalizer::new(SensorCapabilities::with_barometer());
        assert!(normalizer.on_pressure(None).is_err());
        assert!(normalizer.on_pressure(Some(-3.0)).is_err());
        assert!(normalizer.on_pressure(Some(f64::NAN)).is_err());
    }

    #[test]
    fn test_raw_axes_deserialize_partial() {
        let raw: RawAxes = serde_json::from_str(r#"{"x": 0.1, "z": 0.98}"#).unwrap();
        assert_eq!(raw.y, None);
        assert!(raw.to_vector("acceleration").is_err());
    }
}
