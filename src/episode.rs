//! Detection episode tracking.
//!
//! An episode is the lifetime of one candidate fall. It opens on the rising
//! edge into [`ClassificationState::Fall`] and, until it is confirmed or
//! cancelled, accumulates the post-impact kinematics the severity estimate
//! needs:
//! - peak window acceleration (m/s²) and peak rotation rate
//! - the start of the current contiguous stillness run
//! - barometric pressure just before onset and the latest one after it
//!
//! At most one episode is live. A sustained fall classification does not
//! open a second one; the classification has to leave `Fall` first.

use serde::{Deserialize, Serialize};

use crate::types::{ClassificationState, Sample};
use crate::window::WindowStats;

/// Accumulated state of one candidate fall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEpisode {
    /// Timestamp of the sample that opened the episode.
    pub started_at_ms: u64,
    /// Running max of the window max magnitude since onset (m/s²).
    pub max_acceleration_ms2: f64,
    /// Running max of the gyroscope magnitude since onset (rad/s).
    pub max_rotation: f64,
    /// Start of the current unbroken stillness run, if any.
    pub stillness_started_at_ms: Option<u64>,
    /// Last pressure observed before onset (hPa).
    pub pressure_at_onset_hpa: Option<f64>,
    /// Most recent pressure observed after onset (hPa).
    pub latest_pressure_hpa: Option<f64>,
    /// Samples folded in after onset.
    pub samples_observed: u32,
}

impl DetectionEpisode {
    /// Open a fresh episode with zeroed maxima.
    pub fn open(started_at_ms: u64, pressure_at_onset_hpa: Option<f64>) -> Self {
        Self {
            started_at_ms,
            max_acceleration_ms2: 0.0,
            max_rotation: 0.0,
            stillness_started_at_ms: None,
            pressure_at_onset_hpa,
            latest_pressure_hpa: None,
            samples_observed: 0,
        }
    }

    /// Fold one post-onset sample into the episode.
    pub fn update(&mut self, timestamp_ms: u64, stats: &WindowStats, gyro_magnitude: f64) {
        self.max_acceleration_ms2 = self.max_acceleration_ms2.max(stats.max_magnitude_ms2);
        self.max_rotation = self.max_rotation.max(gyro_magnitude);

        if stats.stillness {
            if self.stillness_started_at_ms.is_none() {
                self.stillness_started_at_ms = Some(timestamp_ms);
            }
        } else {
            self.stillness_started_at_ms = None;
        }
        self.samples_observed += 1;
    }

    /// Length of the current stillness run at `now_ms`, 0 if not still.
    pub fn time_still_ms(&self, now_ms: u64) -> u64 {
        self.stillness_started_at_ms
            .map_or(0, |start| now_ms.saturating_sub(start))
    }
}

/// Edge detector and owner of the (single) live episode.
#[derive(Debug, Clone)]
pub struct EpisodeTracker {
    barometer: bool,
    previous: ClassificationState,
    episode: Option<DetectionEpisode>,
    pressure_before_onset: Option<f64>,
    opened_total: u64,
}

impl EpisodeTracker {
    pub fn new(barometer: bool) -> Self {
        Self {
            barometer,
            previous: ClassificationState::Normal,
            episode: None,
            pressure_before_onset: None,
            opened_total: 0,
        }
    }

    /// Fold one classified sample in. Returns true when this sample opened a
    /// new episode.
    ///
    /// `countdown_active` comes from the confirmation timer; an episode is
    /// only opened while no countdown runs.
    pub fn observe(
        &mut self,
        sample: &Sample,
        stats: &WindowStats,
        state: ClassificationState,
        countdown_active: bool,
    ) -> bool {
        if self.barometer {
            if let Some(p) = sample.pressure_hpa {
                match self.episode.as_mut() {
                    Some(episode) => episode.latest_pressure_hpa = Some(p),
                    None => self.pressure_before_onset = Some(p),
                }
            }
        }

        if let Some(episode) = self.episode.as_mut() {
            episode.update(sample.timestamp_ms, stats, sample.gyro_magnitude());
        }

        let rising_edge =
            state == ClassificationState::Fall && self.previous != ClassificationState::Fall;
        self.previous = state;

        if rising_edge && !countdown_active && self.episode.is_none() {
            self.episode = Some(DetectionEpisode::open(
                sample.timestamp_ms,
                self.pressure_before_onset,
            ));
            self.opened_total += 1;
            return true;
        }
        false
    }

    /// The live episode, if any.
    pub fn episode(&self) -> Option<&DetectionEpisode> {
        self.episode.as_ref()
    }

    /// Remove and return the live episode for finalization.
    pub fn finish(&mut self) -> Option<DetectionEpisode> {
        self.pressure_before_onset = None;
        self.episode.take()
    }

    /// Drop the live episode and everything it accumulated.
    pub fn discard(&mut self) -> bool {
        self.pressure_before_onset = None;
        self.episode.take().is_some()
    }

    /// Episodes opened since creation.
    pub fn opened_total(&self) -> u64 {
        self.opened_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(max_ms2: f64, stillness: bool) -> WindowStats {
        WindowStats {
            sample_count: 60,
            max_magnitude_ms2: max_ms2,
            mean: 1.0,
            variance: 0.0,
            stillness,
        }
    }

    fn rest(ts: u64) -> Sample {
        Sample::new(ts, [0.0, 0.0, 1.0], [0.0; 3])
    }

    #[test]
    fn test_opens_on_rising_edge_only() {
        let mut tracker = EpisodeTracker::new(false);
        let s = stats(25.0, true);

        assert!(tracker.observe(&rest(0), &s, ClassificationState::Fall, false));
        for i in 1..50 {
            assert!(!tracker.observe(&rest(i * 50), &s, ClassificationState::Fall, true));
        }
        assert_eq!(tracker.opened_total(), 1);
    }

    #[test]
    fn test_no_open_while_countdown_active() {
        let mut tracker = EpisodeTracker::new(false);
        let opened = tracker.observe(&rest(0), &stats(25.0, true), ClassificationState::Fall, true);
        assert!(!opened);
        assert!(tracker.episode().is_none());
    }

    #[test]
    fn test_onset_sample_not_folded_in() {
        let mut tracker = EpisodeTracker::new(false);
        tracker.observe(&rest(0), &stats(25.0, true), ClassificationState::Fall, false);

        let episode = tracker.episode().unwrap();
        assert_eq!(episode.max_acceleration_ms2, 0.0);
        assert_eq!(episode.stillness_started_at_ms, None);
        assert_eq!(episode.samples_observed, 0);
    }

    #[test]
    fn test_running_maxima_and_contiguous_stillness() {
        let mut tracker = EpisodeTracker::new(false);
        tracker.observe(&rest(0), &stats(25.0, true), ClassificationState::Fall, false);

        let spin = Sample::new(50, [0.0, 0.0, 1.0], [0.0, 7.0, 0.0]);
        tracker.observe(&spin, &stats(31.0, true), ClassificationState::Fall, true);
        tracker.observe(&rest(100), &stats(28.0, true), ClassificationState::Fall, true);
        {
            let episode = tracker.episode().unwrap();
            assert_eq!(episode.max_acceleration_ms2, 31.0);
            assert_eq!(episode.max_rotation, 7.0);
            assert_eq!(episode.stillness_started_at_ms, Some(50));
        }

        // Stillness broken, then resumed: only the latest run counts.
        tracker.observe(&rest(150), &stats(28.0, false), ClassificationState::Suspicious, true);
        assert_eq!(tracker.episode().unwrap().stillness_started_at_ms, None);
        tracker.observe(&rest(200), &stats(28.0, true), ClassificationState::Fall, true);
        let episode = tracker.episode().unwrap();
        assert_eq!(episode.stillness_started_at_ms, Some(200));
        assert_eq!(episode.time_still_ms(1200), 1000);
    }

    #[test]
    fn test_pressure_capture() {
        let mut tracker = EpisodeTracker::new(true);
        let s = stats(9.8, false);
        tracker.observe(&rest(0).with_pressure(1013.0), &s, ClassificationState::Normal, false);
        tracker.observe(&rest(50).with_pressure(1013.1), &s, ClassificationState::Normal, false);
        tracker.observe(&rest(100), &stats(25.0, true), ClassificationState::Fall, false);
        tracker.observe(&rest(150).with_pressure(1013.3), &stats(25.0, true), ClassificationState::Fall, true);

        let episode = tracker.episode().unwrap();
        assert_eq!(episode.pressure_at_onset_hpa, Some(1013.1));
        assert_eq!(episode.latest_pressure_hpa, Some(1013.3));
    }

    #[test]
    fn test_pressure_ignored_without_barometer() {
        let mut tracker = EpisodeTracker::new(false);
        tracker.observe(&rest(0).with_pressure(1013.0), &stats(9.8, false), ClassificationState::Normal, false);
        tracker.observe(&rest(50), &stats(25.0, true), ClassificationState::Fall, false);
        assert_eq!(tracker.episode().unwrap().pressure_at_onset_hpa, None);
    }

    #[test]
    fn test_discard_resets() {
        let mut tracker = EpisodeTracker::new(false);
        tracker.observe(&rest(0), &stats(25.0, true), ClassificationState::Fall, false);
        assert!(tracker.discard());
        assert!(tracker.episode().is_none());
        assert!(!tracker.discard());

        // Still classified as fall: no new edge yet.
        assert!(!tracker.observe(&rest(50), &stats(25.0, true), ClassificationState::Fall, false));
        tracker.observe(&rest(100), &stats(9.8, true), ClassificationState::Suspicious, false);
        assert!(tracker.observe(&rest(150), &stats(22.0, true), ClassificationState::Fall, false));
        assert_eq!(tracker.opened_total(), 2);
    }
}
