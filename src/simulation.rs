//! Deterministic sensor scenarios.
//!
//! Builds scripted accelerometer / gyroscope / barometer streams for the
//! demo binary and the tests:
//! - `rest`: device lying flat, 1 g, no rotation
//! - `walk`: 2 Hz gait with ±0.5 g vertical swing
//! - `fall`: a single impact spike, a short roll, then the device keeps
//!   whatever orientation the roll left it in
//!
//! Acceleration is in g, rotation in rad/s, pressure in hPa. Pressure frames
//! arrive at a lower rate than inertial ones, as on real hardware.

use std::f64::consts::PI;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FallError, Result};
use crate::monitor::SensorFeed;
use crate::normalizer::RawAxes;
use crate::sink::SensorSource;
use crate::types::{Sample, STANDARD_GRAVITY};

/// Sea-level pressure used as the scenario baseline (hPa).
pub const BASELINE_PRESSURE_HPA: f64 = 1013.25;

/// A barometer frame is emitted every this many inertial frames.
const PRESSURE_EVERY_FRAMES: usize = 10;

/// Pressure change per metre used to script height (hPa/m).
const HPA_PER_METER: f64 = 0.12;

/// Step frequency of the walking pattern (Hz).
const STEP_HZ: f64 = 2.0;

/// One inertial frame, plus a barometer reading when one is due.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub accel: [f64; 3],
    pub gyro: [f64; 3],
    pub pressure_hpa: Option<f64>,
}

/// Shape of a scripted fall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallProfile {
    /// Impact peak (m/s²).
    pub peak_ms2: f64,
    /// Rotation rate during the roll (rad/s).
    pub rotation: f64,
    /// Apparent height, scripted as a pressure drop after impact (m).
    pub height_m: f64,
    /// Duration of the roll following the impact (ms).
    pub roll_ms: u64,
}

impl Default for FallProfile {
    fn default() -> Self {
        Self {
            peak_ms2: 24.5,
            rotation: 12.0,
            height_m: 0.0,
            roll_ms: 200,
        }
    }
}

/// A scripted sequence of frames at a fixed interval.
#[derive(Debug, Clone)]
pub struct Scenario {
    interval_ms: u64,
    frames: Vec<Frame>,
    orientation: [f64; 3],
    pressure_hpa: f64,
}

impl Scenario {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            frames: Vec::new(),
            orientation: [0.0, 0.0, 1.0],
            pressure_hpa: BASELINE_PRESSURE_HPA,
        }
    }

    /// Three seconds at rest, a fall, then long enough at rest for the
    /// confirmation countdown to run out.
    pub fn fall_demo(interval_ms: u64, profile: &FallProfile) -> Self {
        Self::new(interval_ms)
            .rest(3000)
            .fall(profile)
            .rest(12_000)
    }

    /// Device motionless in its current orientation.
    pub fn rest(mut self, duration_ms: u64) -> Self {
        for _ in 0..self.frame_count(duration_ms) {
            self.push(self.orientation, [0.0; 3]);
        }
        self
    }

    /// Periodic gait.
    pub fn walk(mut self, duration_ms: u64) -> Self {
        for _ in 0..self.frame_count(duration_ms) {
            let t = self.frames.len() as f64 * self.interval_ms as f64 / 1000.0;
            let phase = 2.0 * PI * STEP_HZ * t;
            let accel = [0.2 * phase.cos(), 0.0, 1.0 + 0.5 * phase.sin()];
            let gyro = [0.0, 1.5 * phase.sin(), 0.0];
            self.push(accel, gyro);
        }
        self.orientation = [0.0, 0.0, 1.0];
        self
    }

    /// Impact spike followed by a roll onto the side.
    pub fn fall(mut self, profile: &FallProfile) -> Self {
        let peak_g = profile.peak_ms2 / STANDARD_GRAVITY;
        let spin = [profile.rotation, 0.0, 0.0];
        self.push([0.0, 0.0, peak_g], spin);
        self.pressure_hpa -= profile.height_m * HPA_PER_METER;

        let roll_frames = self.frame_count(profile.roll_ms).max(1);
        for i in 1..=roll_frames {
            let angle = PI / 2.0 * i as f64 / roll_frames as f64;
            self.push([angle.sin(), 0.0, angle.cos()], spin);
        }
        self.orientation = [1.0, 0.0, 0.0];
        self
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn duration_ms(&self) -> u64 {
        self.frames.len() as u64 * self.interval_ms
    }

    /// Frames as timestamped samples starting at `start_ms`.
    pub fn samples(&self, start_ms: u64) -> Vec<Sample> {
        self.frames
            .iter()
            .enumerate()
            .map(|(i, frame)| {
                let sample = Sample::new(
                    start_ms + i as u64 * self.interval_ms,
                    frame.accel,
                    frame.gyro,
                );
                match frame.pressure_hpa {
                    Some(p) => sample.with_pressure(p),
                    None => sample,
                }
            })
            .collect()
    }

    fn frame_count(&self, duration_ms: u64) -> usize {
        (duration_ms / self.interval_ms) as usize
    }

    fn push(&mut self, accel: [f64; 3], gyro: [f64; 3]) {
        let pressure_hpa = if self.frames.len() % PRESSURE_EVERY_FRAMES == 0 {
            Some(self.pressure_hpa)
        } else {
            None
        };
        self.frames.push(Frame {
            accel,
            gyro,
            pressure_hpa,
        });
    }
}

/// [`SensorSource`] replaying a [`Scenario`] in (tokio) real time.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    scenario: Scenario,
    barometer: bool,
    failure: Option<String>,
}

impl ScriptedSource {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            barometer: true,
            failure: None,
        }
    }

    pub fn without_barometer(mut self) -> Self {
        self.barometer = false;
        self
    }

    /// A source whose sensors refuse to start.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            scenario: Scenario::new(50),
            barometer: false,
            failure: Some(message.into()),
        }
    }
}

impl SensorSource for ScriptedSource {
    fn has_barometer(&self) -> bool {
        self.barometer
    }

    fn start(&self, interval: Duration, feed: SensorFeed) -> Result<()> {
        if let Some(message) = &self.failure {
            return Err(FallError::SensorInit(message.clone()));
        }

        let frames = self.scenario.frames().to_vec();
        let barometer = self.barometer;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            for frame in frames {
                ticker.tick().await;
                if barometer {
                    if let Some(p) = frame.pressure_hpa {
                        let _ = feed.pressure(Some(p));
                    }
                }
                if feed.rotation(RawAxes::from(frame.gyro)).is_err()
                    || feed.acceleration(RawAxes::from(frame.accel)).is_err()
                {
                    debug!("Monitor gone, stopping scripted sensors");
                    return;
                }
            }
            debug!("Scripted sensor stream finished");
        });
        Ok(())
    }
}
