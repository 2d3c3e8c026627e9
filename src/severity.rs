//! Severity estimation for confirmed falls.
//!
//! Once the countdown expires, the episode's accumulated kinematics are
//! turned into a point score and a LOW / MEDIUM / HIGH level:
//!
//! | indicator            | +1        | +2        | +3    |
//! |----------------------|-----------|-----------|-------|
//! | acceleration peak    | > 20 m/s² | ≥ 30 m/s² | ≥ 50  |
//! | peak rotation        | ≥ 10      | ≥ 20      |       |
//! | time still           | ≥ 1000 ms | ≥ 2000 ms |       |
//! | barometric height    | ≥ 0.5 m   | ≥ 1.5 m   |       |
//!
//! A score of 6 or more is HIGH, 3 or more is MEDIUM, with one exception: a
//! peak above 50 m/s² whose total is exactly 3 is reported LOW.

use serde::{Deserialize, Serialize};

use crate::episode::DetectionEpisode;

/// Severity thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityConfig {
    /// Peaks above this score one point (m/s²). Matches the impact threshold.
    pub impact_threshold_ms2: f64,
    /// Peaks at or above this score two points (m/s²).
    pub medium_accel_ms2: f64,
    /// Peaks at or above this score three points (m/s²).
    pub high_accel_ms2: f64,
    /// Rotation at or above this scores one point (rad/s).
    pub medium_rotation: f64,
    /// Rotation at or above this scores two points (rad/s).
    pub high_rotation: f64,
    /// Stillness at or above this scores one point (ms).
    pub medium_still_ms: u64,
    /// Stillness at or above this scores two points (ms).
    pub high_still_ms: u64,
    /// Height at or above this scores one point (m).
    pub medium_height_m: f64,
    /// Height at or above this scores two points (m).
    pub high_height_m: f64,
    /// Pressure change per metre of altitude (hPa/m).
    pub pressure_per_meter_hpa: f64,
    /// Minimum score for [`SeverityLevel::Medium`].
    pub medium_score: u8,
    /// Minimum score for [`SeverityLevel::High`].
    pub high_score: u8,
}

impl Default for SeverityConfig {
    fn default() -> Self {
        Self {
            impact_threshold_ms2: 20.0,
            medium_accel_ms2: 30.0,
            high_accel_ms2: 50.0,
            medium_rotation: 10.0,
            high_rotation: 20.0,
            medium_still_ms: 1000,
            high_still_ms: 2000,
            medium_height_m: 0.5,
            high_height_m: 1.5,
            pressure_per_meter_hpa: 0.12,
            medium_score: 3,
            high_score: 6,
        }
    }
}

/// Coarse severity of a confirmed fall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeverityLevel {
    Low,
    Medium,
    High,
}

impl SeverityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityLevel::Low => "LOW",
            SeverityLevel::Medium => "MEDIUM",
            SeverityLevel::High => "HIGH",
        }
    }
}

/// Numeric breakdown reported alongside the level.
///
/// Values are rounded for reporting: acceleration and rotation to 0.1,
/// height to 0.01 m.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeverityMetrics {
    pub acceleration_peak: f64,
    pub rotation_angle: f64,
    pub time_still_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub height_estimate_meters: Option<f64>,
}

/// Severity of one confirmed episode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityResult {
    pub level: SeverityLevel,
    pub score: u8,
    pub metrics: SeverityMetrics,
}

/// Converts episode kinematics into a [`SeverityResult`].
#[derive(Debug, Clone, Default)]
pub struct SeverityEstimator {
    config: SeverityConfig,
}

impl SeverityEstimator {
    pub fn new(config: SeverityConfig) -> Self {
        Self { config }
    }

    /// Estimate severity for a finished episode at confirmation time `now_ms`.
    ///
    /// `current_pressure_hpa` is the latest post-onset barometer reading.
    pub fn estimate(
        &self,
        episode: &DetectionEpisode,
        current_pressure_hpa: Option<f64>,
        now_ms: u64,
    ) -> SeverityResult {
        let acceleration_peak = episode.max_acceleration_ms2;
        let rotation = episode.max_rotation;
        let time_still_ms = episode.time_still_ms(now_ms);
        let height = self.height_estimate(episode.pressure_at_onset_hpa, current_pressure_hpa);

        let score = self.acceleration_points(acceleration_peak)
            + self.rotation_points(rotation)
            + self.stillness_points(time_still_ms)
            + height.map_or(0, |h| self.height_points(h));

        SeverityResult {
            level: self.level(score, acceleration_peak),
            score,
            metrics: SeverityMetrics {
                acceleration_peak: round_to(acceleration_peak, 10.0),
                rotation_angle: round_to(rotation, 10.0),
                time_still_ms,
                height_estimate_meters: height.map(|h| round_to(h, 100.0)),
            },
        }
    }

    /// Fall height from the pressure rise between onset and now.
    ///
    /// Only a positive change (descent) yields a height.
    pub fn height_estimate(&self, onset_hpa: Option<f64>, current_hpa: Option<f64>) -> Option<f64> {
        let (before, after) = (onset_hpa?, current_hpa?);
        let delta = before - after;
        if delta > 0.0 {
            Some(delta / self.config.pressure_per_meter_hpa)
        } else {
            None
        }
    }

    fn acceleration_points(&self, peak: f64) -> u8 {
        if peak >= self.config.high_accel_ms2 {
            3
        } else if peak >= self.config.medium_accel_ms2 {
            2
        } else if peak > self.config.impact_threshold_ms2 {
            1
        } else {
            0
        }
    }

    fn rotation_points(&self, rotation: f64) -> u8 {
        if rotation >= self.config.high_rotation {
            2
        } else if rotation >= self.config.medium_rotation {
            1
        } else {
            0
        }
    }

    fn stillness_points(&self, time_still_ms: u64) -> u8 {
        if time_still_ms >= self.config.high_still_ms {
            2
        } else if time_still_ms >= self.config.medium_still_ms {
            1
        } else {
            0
        }
    }

    fn height_points(&self, height_m: f64) -> u8 {
        if height_m >= self.config.high_height_m {
            2
        } else if height_m >= self.config.medium_height_m {
            1
        } else {
            0
        }
    }

    fn level(&self, score: u8, acceleration_peak: f64) -> SeverityLevel {
        if score >= self.config.high_score {
            SeverityLevel::High
        } else if score >= self.config.medium_score {
            // Hard impact scoring only the bare medium minimum stays LOW.
            if acceleration_peak > self.config.high_accel_ms2 && score == self.config.medium_score {
                SeverityLevel::Low
            } else {
                SeverityLevel::Medium
            }
        } else {
            SeverityLevel::Low
        }
    }
}

fn round_to(value: f64, factor: f64) -> f64 {
    (value * factor).round() / factor
}
