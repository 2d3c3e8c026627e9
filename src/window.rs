//! Sliding-window acceleration statistics.
//!
//! Keeps a bounded, time-ordered buffer of recent acceleration magnitudes
//! and recomputes the window statistics on every sample:
//! - max magnitude, reported in m/s²
//! - mean and Bessel-corrected variance, left in the source unit
//! - a stillness flag (device resting under gravity alone)
//!
//! The max/mean unit split is deliberate. The classifier's impact threshold
//! is expressed in m/s² while the stillness test compares the mean against
//! one g; converting either side would shift the effective thresholds.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::AccelUnit;

/// Configuration for the sliding window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window duration in milliseconds. Entries older than this relative to
    /// the newest entry are discarded.
    pub window_ms: u64,

    /// Nominal sampling interval in milliseconds (50 ms = 20 Hz).
    /// Used only to decide how full the window must be for stillness.
    pub sample_interval_ms: u64,

    /// Unit the accelerometer reports in.
    pub accel_unit: AccelUnit,

    /// Fraction of a full window required before stillness may be declared.
    pub stillness_fill_ratio: f64,

    /// Variance (source unit²) below which the window counts as still.
    pub stillness_variance_max: f64,

    /// Allowed distance of the mean from 1.0 for stillness.
    pub stillness_gravity_tolerance: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_ms: 3000,
            sample_interval_ms: 50,
            accel_unit: AccelUnit::StandardGravity,
            stillness_fill_ratio: 0.6,
            stillness_variance_max: 0.05,
            stillness_gravity_tolerance: 0.25,
        }
    }
}

impl WindowConfig {
    /// Number of samples a full window holds at the nominal interval.
    pub fn nominal_capacity(&self) -> f64 {
        self.window_ms as f64 / self.sample_interval_ms.max(1) as f64
    }

    /// Minimum number of samples for stillness (36 at defaults).
    pub fn stillness_min_samples(&self) -> f64 {
        self.nominal_capacity() * self.stillness_fill_ratio
    }
}

/// Statistics derived from the current window contents.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WindowStats {
    /// Number of entries in the window.
    pub sample_count: usize,
    /// Largest magnitude in the window, scaled to m/s².
    pub max_magnitude_ms2: f64,
    /// Mean magnitude in the source unit.
    pub mean: f64,
    /// Sample variance in the source unit², divisor max(1, n − 1).
    pub variance: f64,
    /// Low-variance, near-1g window.
    pub stillness: bool,
}

impl WindowStats {
    /// Compute statistics over a slice of magnitudes. `None` when empty.
    pub fn compute<I>(magnitudes: I, config: &WindowConfig) -> Option<Self>
    where
        I: IntoIterator<Item = f64> + Clone,
    {
        let mut n = 0usize;
        let mut sum = 0.0;
        let mut max = f64::NEG_INFINITY;
        for m in magnitudes.clone() {
            n += 1;
            sum += m;
            if m > max {
                max = m;
            }
        }
        if n == 0 {
            return None;
        }

        let mean = sum / n as f64;
        let sum_sq_dev: f64 = magnitudes.into_iter().map(|m| (m - mean) * (m - mean)).sum();
        let divisor = n.saturating_sub(1).max(1) as f64;
        let variance = sum_sq_dev / divisor;

        let stillness = n as f64 >= config.stillness_min_samples()
            && variance < config.stillness_variance_max
            && (mean - 1.0).abs() < config.stillness_gravity_tolerance;

        Some(Self {
            sample_count: n,
            max_magnitude_ms2: max * config.accel_unit.to_ms2(),
            mean,
            variance,
            stillness,
        })
    }
}

/// Bounded time-ordered buffer of (timestamp, magnitude) pairs.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    config: WindowConfig,
    entries: VecDeque<(u64, f64)>,
    last_stats: Option<WindowStats>,
}

impl SlidingWindow {
    /// Create an empty window.
    pub fn new(config: WindowConfig) -> Self {
        let capacity = config.nominal_capacity().ceil() as usize + 1;
        Self {
            config,
            entries: VecDeque::with_capacity(capacity),
            last_stats: None,
        }
    }

    /// Append a magnitude, prune expired entries and return the new stats.
    ///
    /// A timestamp older than the newest entry is rejected (returns `None`,
    /// window unchanged) so timestamps stay non-decreasing.
    pub fn observe(&mut self, timestamp_ms: u64, magnitude: f64) -> Option<WindowStats> {
        if !magnitude.is_finite() {
            return None;
        }
        if let Some(&(newest, _)) = self.entries.back() {
            if timestamp_ms < newest {
                return None;
            }
        }

        self.entries.push_back((timestamp_ms, magnitude));
        while let Some(&(ts, _)) = self.entries.front() {
            if timestamp_ms - ts > self.config.window_ms {
                self.entries.pop_front();
            } else {
                break;
            }
        }

        if let Some(stats) =
            WindowStats::compute(self.entries.iter().map(|&(_, m)| m), &self.config)
        {
            self.last_stats = Some(stats);
        }
        self.last_stats
    }

    /// Most recent statistics, if any sample has been observed.
    pub fn stats(&self) -> Option<WindowStats> {
        self.last_stats
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no sample has been observed since creation or reset.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Timestamp of the oldest entry.
    pub fn oldest_ms(&self) -> Option<u64> {
        self.entries.front().map(|&(ts, _)| ts)
    }

    /// Timestamp of the newest entry.
    pub fn newest_ms(&self) -> Option<u64> {
        self.entries.back().map(|&(ts, _)| ts)
    }

    /// Drop all entries and statistics.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.last_stats = None;
    }
}
