/// Integration tests for the complete fall detection chain
/// Drives the engine with realistic sample streams and checks end-to-end
/// behavior: classification, edge-triggered episodes, countdown, severity
/// and payload assembly.

#[cfg(test)]
mod integration_tests {
    use crate::alert::{assemble_alert, SubjectProfile};
    use crate::engine::*;
    use crate::severity::SeverityLevel;
    use crate::types::*;
    use crate::window::WindowConfig;
    use chrono::TimeZone;

    const INTERVAL_MS: u64 = 50;

    /// Helper: device lying flat, 1 g on Z, no rotation
    fn rest_sample(timestamp_ms: u64) -> Sample {
        Sample::new(timestamp_ms, [0.0, 0.0, 1.0], [0.0; 3])
    }

    /// Helper: single impact sample of the given magnitude (m/s²)
    fn impact_sample(timestamp_ms: u64, ms2: f64) -> Sample {
        Sample::new(timestamp_ms, [0.0, 0.0, ms2 / STANDARD_GRAVITY], [0.0; 3])
    }

    /// Helper: still motion profile starting at `start_ms`
    fn still_motion_profile(start_ms: u64, count: u64) -> Vec<Sample> {
        (0..count)
            .map(|i| rest_sample(start_ms + i * INTERVAL_MS))
            .collect()
    }

    /// Helper: feed samples, collecting any engine events
    fn feed(engine: &mut FallEngine, samples: &[Sample]) -> Vec<EngineEvent> {
        samples.iter().filter_map(|s| engine.observe(s)).collect()
    }

    fn opened(events: &[EngineEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, EngineEvent::EpisodeOpened { .. }))
            .count()
    }

    /// Helper: tick until the countdown confirms
    fn run_countdown(engine: &mut FallEngine, first_tick_ms: u64) -> ConfirmedEpisode {
        for i in 0..u64::from(engine.config().countdown.ticks) {
            if let Some(EngineEvent::Confirmed(c)) = engine.tick(first_tick_ms + i * 1000) {
                return c;
            }
        }
        panic!("countdown did not confirm");
    }

    fn engine() -> FallEngine {
        FallEngine::new(EngineConfig::default(), SensorCapabilities::inertial_only())
    }

    #[test]
    fn test_resting_device_is_still_but_never_falls() {
        let mut engine = engine();
        let events = feed(&mut engine, &still_motion_profile(0, 60));

        let stats = engine.stats().unwrap();
        assert!(stats.stillness);
        assert!((stats.mean - 1.0).abs() < 1e-12);
        assert_eq!(stats.variance, 0.0);
        // Stillness alone scores 2.
        assert_eq!(engine.classification().score, 2);
        assert_eq!(engine.classification().state, ClassificationState::Suspicious);
        assert!(events.is_empty());
        assert_eq!(engine.phase(), EnginePhase::Idle);
    }

    #[test]
    fn test_short_rest_is_normal() {
        // Fewer than 36 samples: stillness needs a fuller window.
        let mut engine = engine();
        feed(&mut engine, &still_motion_profile(0, 35));
        assert!(!engine.stats().unwrap().stillness);
        assert_eq!(engine.classification().state, ClassificationState::Normal);

        engine.observe(&rest_sample(35 * INTERVAL_MS));
        assert!(engine.stats().unwrap().stillness);
    }

    #[test]
    fn test_spike_then_rest_opens_exactly_one_episode() {
        let mut engine = engine();
        let mut events = feed(&mut engine, &still_motion_profile(0, 60));
        events.extend(engine.observe(&impact_sample(3000, 25.0)));
        events.extend(feed(&mut engine, &still_motion_profile(3050, 100)));

        assert_eq!(opened(&events), 1);
        assert_eq!(events[0], EngineEvent::EpisodeOpened { started_at_ms: 3000 });
    }

    #[test]
    fn test_sustained_fall_opens_one_episode() {
        let mut engine = engine();
        feed(&mut engine, &still_motion_profile(0, 60));

        let mut samples = vec![impact_sample(3000, 25.0)];
        samples.extend(still_motion_profile(3050, 49));

        let mut opened_count = 0;
        for sample in &samples {
            if let Some(EngineEvent::EpisodeOpened { .. }) = engine.observe(sample) {
                opened_count += 1;
            }
            assert_eq!(engine.classification().state, ClassificationState::Fall);
        }
        assert_eq!(opened_count, 1);
    }

    #[test]
    fn test_impact_without_stillness_is_suspicious() {
        let mut engine = engine();
        // Only 10 samples: window not full enough to be still.
        feed(&mut engine, &still_motion_profile(0, 10));
        let event = engine.observe(&impact_sample(500, 25.0));
        assert!(event.is_none());
        assert_eq!(engine.classification().state, ClassificationState::Suspicious);
    }

    #[test]
    fn test_countdown_is_exactly_ten_ticks() {
        let mut engine = engine();
        feed(&mut engine, &still_motion_profile(0, 60));
        engine.observe(&impact_sample(3000, 25.0));

        let mut seen = Vec::new();
        for i in 1..=9u64 {
            match engine.tick(3000 + i * 1000) {
                Some(EngineEvent::CountdownTick { remaining }) => seen.push(remaining),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(seen, vec![9, 8, 7, 6, 5, 4, 3, 2, 1]);
        assert!(matches!(engine.tick(13_000), Some(EngineEvent::Confirmed(_))));
        assert_eq!(engine.phase(), EnginePhase::Idle);
        assert!(engine.tick(14_000).is_none());
    }

    #[test]
    fn test_cancel_resets_and_next_episode_starts_fresh() {
        let mut engine = engine();
        feed(&mut engine, &still_motion_profile(0, 60));
        engine.observe(&impact_sample(3000, 25.0));

        // Tumble after the impact.
        for i in 1..=4u64 {
            engine.observe(&Sample::new(3000 + i * INTERVAL_MS, [0.0, 0.0, 1.0], [15.0, 0.0, 0.0]));
        }
        assert_eq!(engine.episode().unwrap().max_rotation, 15.0);

        engine.tick(4000);
        engine.tick(5000);
        engine.tick(6000);
        assert_eq!(engine.phase(), EnginePhase::CountingDown { remaining: 7 });

        assert_eq!(engine.cancel(), Some(EngineEvent::Cancelled));
        assert_eq!(engine.phase(), EnginePhase::Idle);
        assert!(engine.episode().is_none());
        assert!(engine.cancel().is_none());

        // Rest until the old impact has left the window.
        let events = feed(&mut engine, &still_motion_profile(3250, 66));
        assert!(events.is_empty());
        assert_eq!(engine.window().newest_ms(), Some(6500));
        assert_eq!(engine.classification().state, ClassificationState::Suspicious);

        let event = engine.observe(&impact_sample(6550, 22.0));
        assert_eq!(event, Some(EngineEvent::EpisodeOpened { started_at_ms: 6550 }));
        engine.observe(&rest_sample(6600));

        let episode = engine.episode().unwrap();
        assert!((episode.max_acceleration_ms2 - 22.0).abs() < 1e-9);
        assert_eq!(episode.max_rotation, 0.0);
        assert_eq!(episode.stillness_started_at_ms, Some(6600));

        let confirmed = run_countdown(&mut engine, 7550);
        assert_eq!(confirmed.episode.started_at_ms, 6550);
        let counters = engine.counters();
        assert_eq!(counters.episodes_opened, 2);
        assert_eq!(counters.episodes_cancelled, 1);
        assert_eq!(counters.episodes_confirmed, 1);
    }

    #[test]
    fn test_post_impact_kinematics_drive_severity() {
        let mut engine = engine();
        feed(&mut engine, &still_motion_profile(0, 60));
        engine.observe(&impact_sample(3000, 25.0));
        for i in 1..=4u64 {
            engine.observe(&Sample::new(3000 + i * INTERVAL_MS, [1.0, 0.0, 0.0], [0.0, 21.0, 0.0]));
        }
        feed(&mut engine, &still_motion_profile(3250, 195));

        let confirmed = run_countdown(&mut engine, 4000);
        let severity = confirmed.severity;
        // 1 (peak) + 2 (rotation) + 2 (still) = 5
        assert_eq!(severity.score, 5);
        assert_eq!(severity.level, SeverityLevel::Medium);
        assert_eq!(severity.metrics.acceleration_peak, 25.0);
        assert_eq!(severity.metrics.rotation_angle, 21.0);
        assert_eq!(severity.metrics.time_still_ms, 13_000 - 3050);
        assert_eq!(severity.metrics.height_estimate_meters, None);
    }

    #[test]
    fn test_stillness_broken_after_onset_restarts_run() {
        let mut engine = engine();
        feed(&mut engine, &still_motion_profile(0, 60));
        engine.observe(&impact_sample(3000, 25.0));
        engine.observe(&rest_sample(3050));
        assert_eq!(engine.episode().unwrap().stillness_started_at_ms, Some(3050));

        // A stumble: variance jumps, stillness is lost.
        engine.observe(&Sample::new(3100, [0.0, 0.0, 0.1], [0.0; 3]));
        engine.observe(&Sample::new(3150, [0.0, 0.0, 1.9], [0.0; 3]));
        assert_eq!(engine.episode().unwrap().stillness_started_at_ms, None);
        assert!(engine.episode().unwrap().max_acceleration_ms2 >= 25.0 - 1e-9);
    }

    #[test]
    fn test_height_requires_pressure_descent() {
        let barometer = SensorCapabilities::with_barometer();

        // Pressure rose after onset: no height.
        let mut engine = FallEngine::new(EngineConfig::default(), barometer);
        let mut samples: Vec<Sample> = still_motion_profile(0, 60)
            .into_iter()
            .map(|s| s.with_pressure(1013.0))
            .collect();
        samples.push(impact_sample(3000, 25.0));
        samples.push(rest_sample(3050).with_pressure(1013.5));
        feed(&mut engine, &samples);
        let confirmed = run_countdown(&mut engine, 4000);
        assert_eq!(confirmed.severity.metrics.height_estimate_meters, None);

        // Pressure fell by 0.12 hPa: one metre.
        let mut engine = FallEngine::new(EngineConfig::default(), barometer);
        samples.pop();
        samples.push(rest_sample(3050).with_pressure(1012.88));
        feed(&mut engine, &samples);
        let confirmed = run_countdown(&mut engine, 4000);
        let height = confirmed.severity.metrics.height_estimate_meters.unwrap();
        assert!((height - 1.0).abs() < 1e-9);
        assert!(height >= 0.0);
    }

    #[test]
    fn test_pressure_ignored_without_barometer() {
        let mut engine = engine();
        let mut samples: Vec<Sample> = still_motion_profile(0, 60)
            .into_iter()
            .map(|s| s.with_pressure(1013.0))
            .collect();
        samples.push(impact_sample(3000, 25.0));
        samples.push(rest_sample(3050).with_pressure(1012.0));
        feed(&mut engine, &samples);

        let confirmed = run_countdown(&mut engine, 4000);
        assert_eq!(confirmed.episode.pressure_at_onset_hpa, None);
        assert_eq!(confirmed.severity.metrics.height_estimate_meters, None);
    }

    #[test]
    fn test_window_age_bound_with_jittery_rate() {
        let mut engine = engine();
        let mut ts = 0u64;
        for i in 0..2_000u64 {
            ts += 20 + (i * 37) % 61;
            engine.observe(&rest_sample(ts));

            let window = engine.window();
            let oldest = window.oldest_ms().unwrap();
            let newest = window.newest_ms().unwrap();
            assert_eq!(newest, ts);
            assert!(newest - oldest <= 3000);
        }
    }

    #[test]
    fn test_entry_exactly_window_old_is_kept() {
        let mut engine = engine();
        engine.observe(&rest_sample(0));
        engine.observe(&rest_sample(3000));
        assert_eq!(engine.window().len(), 2);
        engine.observe(&rest_sample(3001));
        assert_eq!(engine.window().oldest_ms(), Some(3000));
    }

    #[test]
    fn test_out_of_order_sample_skipped() {
        let mut engine = engine();
        feed(&mut engine, &still_motion_profile(0, 10));
        let before = engine.stats();
        assert!(engine.observe(&impact_sample(100, 40.0)).is_none());
        assert_eq!(engine.stats(), before);
        assert_eq!(engine.counters().samples_skipped, 1);
    }

    #[test]
    fn test_metres_per_second_unit_never_still() {
        // Mean is compared against 1.0 in the source unit.
        let mut config = EngineConfig::default();
        config.window = WindowConfig {
            accel_unit: AccelUnit::MetersPerSecondSquared,
            ..WindowConfig::default()
        };
        let mut engine = FallEngine::new(config, SensorCapabilities::inertial_only());
        for i in 0..60u64 {
            engine.observe(&Sample::new(i * INTERVAL_MS, [0.0, 0.0, STANDARD_GRAVITY], [0.0; 3]));
        }
        let stats = engine.stats().unwrap();
        assert!(!stats.stillness);
        assert!((stats.max_magnitude_ms2 - STANDARD_GRAVITY).abs() < 1e-9);
        assert_eq!(engine.classification().state, ClassificationState::Normal);
    }

    #[test]
    fn test_confirmed_episode_to_payload() {
        let mut engine = engine();
        feed(&mut engine, &still_motion_profile(0, 60));
        engine.observe(&impact_sample(3000, 25.0));
        feed(&mut engine, &still_motion_profile(3050, 40));
        let confirmed = run_countdown(&mut engine, 4000);

        let profile = SubjectProfile::new("Ana María", "family@example.org");
        let at = chrono::Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let payload = assemble_alert(&profile, at, None, &confirmed.severity);
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["subjectId"], "ana-mar-a");
        assert_eq!(json["type"], "FALL");
        assert_eq!(json["timestamp"], "2026-01-02T03:04:05.000Z");
        assert_eq!(json["severityScore"], confirmed.severity.score);
        assert_eq!(json["severityMetrics"]["accelerationPeak"], 25.0);
        assert!(json.get("location").is_none());
    }
}
