//! The fall detection state machine.
//!
//! [`FallEngine`] owns the sliding window, the live detection episode and the
//! confirmation countdown as plain fields, and has exactly three mutators:
//!
//! - [`FallEngine::observe`]: one normalized sample
//! - [`FallEngine::tick`]: one countdown period elapsed
//! - [`FallEngine::cancel`]: the wearer dismissed the alert
//!
//! # Transitions
//!
//! ```text
//!            fall edge (no countdown)            tick, remaining > 1
//!   Idle ───────────────────────────▶ CountingDown(10) ─────────────┐
//!    ▲  ▲                                │        ▲                 │
//!    │  └──────────── cancel ────────────┘        └─────────────────┘
//!    │                                   │
//!    └──── confirmed (severity computed) ┘ tick, remaining == 1
//! ```
//!
//! Sampling keeps running through the countdown: severity depends on what
//! happens after the impact, in particular how long the wearer stays still.
//! The engine never blocks and performs no I/O. On confirmation it hands
//! back a [`ConfirmedEpisode`] and is immediately ready for the next fall;
//! location lookup and dispatch belong to the caller.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classifier::{Classification, ClassifierConfig, MotionClassifier};
use crate::countdown::{ConfirmationTimer, CountdownConfig, TickOutcome, TimerPhase};
use crate::episode::{DetectionEpisode, EpisodeTracker};
use crate::error::{FallError, Result};
use crate::severity::{SeverityConfig, SeverityEstimator, SeverityResult};
use crate::types::{Sample, SensorCapabilities};
use crate::window::{SlidingWindow, WindowConfig, WindowStats};

/// Configuration for the complete engine.
///
/// Bundles the per-stage configurations into a single package that can be
/// loaded from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sliding window and stillness parameters.
    pub window: WindowConfig,
    /// Classification thresholds and weights.
    pub classifier: ClassifierConfig,
    /// Confirmation countdown.
    pub countdown: CountdownConfig,
    /// Severity thresholds.
    pub severity: SeverityConfig,
}

impl EngineConfig {
    /// Load and validate a configuration from a JSON file.
    pub fn from_json(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| FallError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig =
            serde_json::from_str(&contents).map_err(|source| FallError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field and return the first problem found.
    pub fn validate(&self) -> Result<()> {
        let w = &self.window;
        if w.window_ms == 0 {
            return Err(FallError::invalid_config("window.window_ms", "must be > 0"));
        }
        if w.sample_interval_ms == 0 {
            return Err(FallError::invalid_config(
                "window.sample_interval_ms",
                "must be > 0",
            ));
        }
        if w.sample_interval_ms > w.window_ms {
            return Err(FallError::invalid_config(
                "window.sample_interval_ms",
                format!("must not exceed window_ms ({})", w.window_ms),
            ));
        }
        if !(w.stillness_fill_ratio > 0.0 && w.stillness_fill_ratio <= 1.0) {
            return Err(FallError::invalid_config(
                "window.stillness_fill_ratio",
                "must be in (0, 1]",
            ));
        }
        if w.stillness_variance_max <= 0.0 {
            return Err(FallError::invalid_config(
                "window.stillness_variance_max",
                "must be > 0",
            ));
        }
        if w.stillness_gravity_tolerance <= 0.0 {
            return Err(FallError::invalid_config(
                "window.stillness_gravity_tolerance",
                "must be > 0",
            ));
        }

        let c = &self.classifier;
        if c.impact_threshold_ms2 <= 0.0 {
            return Err(FallError::invalid_config(
                "classifier.impact_threshold_ms2",
                "must be > 0",
            ));
        }
        let max_score = u16::from(c.impact_weight)
            + u16::from(c.stillness_weight)
            + u16::from(c.rotation_weight);
        if max_score > u16::from(u8::MAX) {
            return Err(FallError::invalid_config(
                "classifier.impact_weight",
                format!("weights sum to {max_score}, must not exceed {}", u8::MAX),
            ));
        }
        if c.suspicious_score > c.fall_score {
            return Err(FallError::invalid_config(
                "classifier.suspicious_score",
                format!("must not exceed fall_score ({})", c.fall_score),
            ));
        }

        if self.countdown.ticks == 0 {
            return Err(FallError::invalid_config("countdown.ticks", "must be > 0"));
        }
        if self.countdown.tick_interval_ms == 0 {
            return Err(FallError::invalid_config(
                "countdown.tick_interval_ms",
                "must be > 0",
            ));
        }

        let s = &self.severity;
        if s.pressure_per_meter_hpa <= 0.0 {
            return Err(FallError::invalid_config(
                "severity.pressure_per_meter_hpa",
                "must be > 0",
            ));
        }
        if s.medium_accel_ms2 > s.high_accel_ms2 {
            return Err(FallError::invalid_config(
                "severity.medium_accel_ms2",
                "must not exceed high_accel_ms2",
            ));
        }
        if s.medium_rotation > s.high_rotation {
            return Err(FallError::invalid_config(
                "severity.medium_rotation",
                "must not exceed high_rotation",
            ));
        }
        if s.medium_still_ms > s.high_still_ms {
            return Err(FallError::invalid_config(
                "severity.medium_still_ms",
                "must not exceed high_still_ms",
            ));
        }
        if s.medium_height_m > s.high_height_m {
            return Err(FallError::invalid_config(
                "severity.medium_height_m",
                "must not exceed high_height_m",
            ));
        }
        if s.medium_score > s.high_score {
            return Err(FallError::invalid_config(
                "severity.medium_score",
                "must not exceed high_score",
            ));
        }
        Ok(())
    }
}

/// Externally observable phase of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum EnginePhase {
    /// No episode.
    Idle,
    /// Episode open, waiting for the wearer to cancel.
    CountingDown { remaining: u8 },
}

/// A finished, confirmed episode and its severity.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedEpisode {
    pub episode: DetectionEpisode,
    pub severity: SeverityResult,
    /// Engine time at which the countdown expired.
    pub confirmed_at_ms: u64,
}

/// Something the caller may need to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A fall edge opened an episode and started the countdown.
    EpisodeOpened { started_at_ms: u64 },
    /// The countdown advanced.
    CountdownTick { remaining: u8 },
    /// The wearer cancelled; the episode was discarded.
    Cancelled,
    /// The countdown expired; dispatch this.
    Confirmed(ConfirmedEpisode),
}

/// Running counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineCounters {
    pub samples_observed: u64,
    pub samples_skipped: u64,
    pub episodes_opened: u64,
    pub episodes_cancelled: u64,
    pub episodes_confirmed: u64,
}

/// Explicit finite-state machine for fall detection.
pub struct FallEngine {
    config: EngineConfig,
    window: SlidingWindow,
    classifier: MotionClassifier,
    tracker: EpisodeTracker,
    timer: ConfirmationTimer,
    severity: SeverityEstimator,
    classification: Classification,
    counters: EngineCounters,
}

impl FallEngine {
    /// Build an engine. Barometer availability is fixed for its lifetime.
    pub fn new(config: EngineConfig, capabilities: SensorCapabilities) -> Self {
        Self {
            window: SlidingWindow::new(config.window.clone()),
            classifier: MotionClassifier::new(config.classifier.clone()),
            tracker: EpisodeTracker::new(capabilities.barometer),
            timer: ConfirmationTimer::new(&config.countdown),
            severity: SeverityEstimator::new(config.severity.clone()),
            classification: Classification::default(),
            counters: EngineCounters::default(),
            config,
        }
    }

    /// Build a validated engine.
    pub fn try_new(config: EngineConfig, capabilities: SensorCapabilities) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config, capabilities))
    }

    /// Fold one sample in.
    ///
    /// Non-finite samples and samples older than the newest window entry are
    /// skipped and leave window and episode untouched.
    pub fn observe(&mut self, sample: &Sample) -> Option<EngineEvent> {
        if !sample.is_finite() {
            self.counters.samples_skipped += 1;
            warn!(timestamp_ms = sample.timestamp_ms, "Skipping non-finite sample");
            return None;
        }

        let magnitude = sample.accel_magnitude();
        if !magnitude.is_finite() {
            self.counters.samples_skipped += 1;
            warn!(
                timestamp_ms = sample.timestamp_ms,
                "Skipping sample whose magnitude overflows"
            );
            return None;
        }

        let stats = match self.window.observe(sample.timestamp_ms, magnitude) {
            Some(stats) => stats,
            None => {
                self.counters.samples_skipped += 1;
                warn!(
                    timestamp_ms = sample.timestamp_ms,
                    newest_ms = ?self.window.newest_ms(),
                    "Skipping out-of-order sample"
                );
                return None;
            }
        };
        self.counters.samples_observed += 1;

        let gyro = sample.gyro_magnitude();
        let classification = self.classifier.classify(&stats, gyro);
        if classification.state != self.classification.state {
            debug!(
                from = self.classification.state.label(),
                to = classification.state.label(),
                score = classification.score,
                max_ms2 = stats.max_magnitude_ms2,
                variance = stats.variance,
                stillness = stats.stillness,
                "Classification changed"
            );
        }
        self.classification = classification;

        let opened = self
            .tracker
            .observe(sample, &stats, classification.state, self.timer.is_active());
        if opened {
            self.timer.start();
            self.counters.episodes_opened += 1;
            info!(
                started_at_ms = sample.timestamp_ms,
                max_ms2 = stats.max_magnitude_ms2,
                countdown = self.config.countdown.ticks,
                "Possible fall detected"
            );
            return Some(EngineEvent::EpisodeOpened {
                started_at_ms: sample.timestamp_ms,
            });
        }
        None
    }

    /// Advance the countdown by one period. `now_ms` is engine time, on the
    /// same clock as sample timestamps.
    pub fn tick(&mut self, now_ms: u64) -> Option<EngineEvent> {
        match self.timer.tick() {
            TickOutcome::Idle => None,
            TickOutcome::Remaining(remaining) => {
                debug!(remaining, "Countdown tick");
                Some(EngineEvent::CountdownTick { remaining })
            }
            TickOutcome::Expired => {
                let Some(episode) = self.tracker.finish() else {
                    warn!("Countdown expired without a live episode");
                    return None;
                };
                let severity =
                    self.severity
                        .estimate(&episode, episode.latest_pressure_hpa, now_ms);
                self.counters.episodes_confirmed += 1;
                info!(
                    started_at_ms = episode.started_at_ms,
                    level = severity.level.as_str(),
                    score = severity.score,
                    peak_ms2 = severity.metrics.acceleration_peak,
                    time_still_ms = severity.metrics.time_still_ms,
                    "Fall confirmed"
                );
                Some(EngineEvent::Confirmed(ConfirmedEpisode {
                    episode,
                    severity,
                    confirmed_at_ms: now_ms,
                }))
            }
        }
    }

    /// Dismiss the running countdown. No-op when idle.
    pub fn cancel(&mut self) -> Option<EngineEvent> {
        if !self.timer.cancel() {
            return None;
        }
        self.tracker.discard();
        self.counters.episodes_cancelled += 1;
        info!("Fall alert cancelled by wearer");
        Some(EngineEvent::Cancelled)
    }

    pub fn phase(&self) -> EnginePhase {
        match self.timer.phase() {
            TimerPhase::Idle => EnginePhase::Idle,
            TimerPhase::CountingDown { remaining } => EnginePhase::CountingDown { remaining },
        }
    }

    /// Classification of the most recent accepted sample.
    pub fn classification(&self) -> Classification {
        self.classification
    }

    /// Statistics of the current window.
    pub fn stats(&self) -> Option<WindowStats> {
        self.window.stats()
    }

    /// The live episode, if any.
    pub fn episode(&self) -> Option<&DetectionEpisode> {
        self.tracker.episode()
    }

    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    pub fn counters(&self) -> EngineCounters {
        self.counters
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
