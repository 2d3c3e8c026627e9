//! Motion classification.
//!
//! A memoryless weighted threshold score over the current window statistics
//! and the instantaneous rotation rate:
//! - +2 when the window max exceeds the impact threshold
//! - +2 when the window is still
//! - +1 when the rotation rate exceeds the gyro threshold
//!
//! A score of 4 or more is a fall, 2 or more is suspicious. Recomputed every
//! sample; nothing here is latched.

use serde::{Deserialize, Serialize};

use crate::types::ClassificationState;
use crate::window::WindowStats;

/// Configuration for the motion classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Window max above which an impact is scored (m/s²).
    pub impact_threshold_ms2: f64,

    /// Rotation rate above which rotation is scored (rad/s).
    pub gyro_threshold: f64,

    /// Weight of the impact indicator.
    pub impact_weight: u8,

    /// Weight of the stillness indicator.
    pub stillness_weight: u8,

    /// Weight of the rotation indicator.
    pub rotation_weight: u8,

    /// Minimum score for [`ClassificationState::Fall`].
    pub fall_score: u8,

    /// Minimum score for [`ClassificationState::Suspicious`].
    pub suspicious_score: u8,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            impact_threshold_ms2: 20.0,
            gyro_threshold: 5.0,
            impact_weight: 2,
            stillness_weight: 2,
            rotation_weight: 1,
            fall_score: 4,
            suspicious_score: 2,
        }
    }
}

/// Result of classifying one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Classification {
    pub state: ClassificationState,
    pub score: u8,
}

/// Stateless threshold classifier.
#[derive(Debug, Clone, Default)]
pub struct MotionClassifier {
    config: ClassifierConfig,
}

impl MotionClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Score the current window and rotation rate.
    pub fn classify(&self, stats: &WindowStats, gyro_magnitude: f64) -> Classification {
        let mut score = 0u8;
        if stats.max_magnitude_ms2 > self.config.impact_threshold_ms2 {
            score = score.saturating_add(self.config.impact_weight);
        }
        if stats.stillness {
            score = score.saturating_add(self.config.stillness_weight);
        }
        if gyro_magnitude > self.config.gyro_threshold {
            score = score.saturating_add(self.config.rotation_weight);
        }

        let state = if score >= self.config.fall_score {
            ClassificationState::Fall
        } else if score >= self.config.suspicious_score {
            ClassificationState::Suspicious
        } else {
            ClassificationState::Normal
        };

        Classification { state, score }
    }

}
