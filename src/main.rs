//! `fall-monitor-sim` binary: replays a scripted fall through the full
//! monitor (sensors, countdown, severity, dispatch).
//!
//! # Usage
//!
//! ```bash
//! fall-monitor-sim --peak 24.5 --height 2.0 --lat 40.4 --lng -3.7
//! fall-monitor-sim --cancel-after 3
//! fall-monitor-sim --config engine.json --json
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use fall_sensing::alert::{Coordinates, SubjectProfile};
use fall_sensing::engine::EngineConfig;
use fall_sensing::monitor::{FallMonitor, MonitorSnapshot, MonitorStatus};
use fall_sensing::simulation::{FallProfile, Scenario, ScriptedSource};
use fall_sensing::sink::{
    AlertSink, FixedLocation, LocationProvider, LogAlertSink, MemoryAlertSink, NoLocation,
};

/// Command-line arguments for the simulator.
#[derive(Parser, Debug)]
#[command(
    name = "fall-monitor-sim",
    version,
    about = "Replay a scripted fall through the fall monitor",
    long_about = None
)]
struct Args {
    /// Path to a JSON engine configuration. Defaults are used otherwise.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Impact peak in m/s².
    #[arg(long, default_value_t = 24.5)]
    peak: f64,

    /// Rotation rate during the roll after impact, in rad/s.
    #[arg(long, default_value_t = 12.0)]
    rotation: f64,

    /// Apparent fall height in metres, scripted as a pressure drop.
    #[arg(long, default_value_t = 0.0)]
    height: f64,

    /// Simulate a device without a barometer.
    #[arg(long, default_value_t = false)]
    no_barometer: bool,

    /// Cancel the countdown after this many ticks.
    #[arg(long, value_name = "TICKS")]
    cancel_after: Option<u8>,

    /// Wearer display name.
    #[arg(long, default_value = "Demo User")]
    name: String,

    /// Contact to notify.
    #[arg(long, default_value = "")]
    contact: String,

    /// Latitude reported by the location provider.
    #[arg(long, requires = "lng", allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Longitude reported by the location provider.
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lng: Option<f64>,

    /// Make the alert sink reject the alert.
    #[arg(long, default_value_t = false)]
    fail_dispatch: bool,

    /// Print the dispatched payload as JSON on stdout.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_level_filter = args
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);

    tracing_subscriber::fmt()
        .with_max_level(log_level_filter)
        .with_target(false)
        .init();

    let config = match args.config.as_deref() {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            match EngineConfig::from_json(path) {
                Ok(cfg) => cfg,
                Err(e) => {
                    error!("Failed to load configuration: {e}");
                    std::process::exit(1);
                }
            }
        }
        None => EngineConfig::default(),
    };

    if let Err(e) = run(args, config).await {
        error!("Simulation failed: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args, config: EngineConfig) -> fall_sensing::Result<()> {
    let fall = FallProfile {
        peak_ms2: args.peak,
        rotation: args.rotation,
        height_m: args.height,
        ..FallProfile::default()
    };
    let scenario = Scenario::fall_demo(config.window.sample_interval_ms, &fall);
    let ticks = config.countdown.ticks;
    let budget = Duration::from_millis(
        scenario.duration_ms() + u64::from(ticks) * config.countdown.tick_interval_ms,
    );

    let mut source = ScriptedSource::new(scenario);
    if args.no_barometer {
        source = source.without_barometer();
    }
    let location: Arc<dyn LocationProvider> = match (args.lat, args.lng) {
        (Some(lat), Some(lng)) => Arc::new(FixedLocation(Coordinates::new(lat, lng))),
        _ => Arc::new(NoLocation::default()),
    };
    let sink: Arc<dyn AlertSink> = if args.fail_dispatch {
        Arc::new(MemoryAlertSink::failing("simulated sink outage"))
    } else {
        Arc::new(LogAlertSink::new())
    };

    info!(
        peak_ms2 = fall.peak_ms2,
        rotation = fall.rotation,
        height_m = fall.height_m,
        "Replaying scripted fall"
    );
    let handle = FallMonitor::spawn(
        config,
        SubjectProfile::new(args.name, args.contact),
        Arc::new(source),
        location,
        sink,
    )?;

    let mut statuses = handle.subscribe();
    tokio::spawn(async move {
        while statuses.changed().await.is_ok() {
            let status = statuses.borrow_and_update().status.clone();
            info!(status = status.label(), "Monitor status");
        }
    });

    if let MonitorStatus::SensorsUnavailable { reason } = handle.snapshot().status {
        warn!("Sensors unavailable: {reason}");
        return handle.shutdown().await;
    }

    if let Some(after) = args.cancel_after {
        let detected = tokio::time::timeout(
            budget,
            handle.wait_for(|s| match s.status {
                MonitorStatus::PossibleFall { remaining } => ticks.saturating_sub(remaining) >= after,
                _ => false,
            }),
        )
        .await;
        match detected {
            Ok(snapshot) => {
                snapshot?;
                handle.cancel()?;
                handle
                    .wait_for(|s| s.status == MonitorStatus::Monitoring)
                    .await?;
                info!("Countdown cancelled after {after} ticks, no alert sent");
            }
            Err(_) => info!("No fall detected"),
        }
        return handle.shutdown().await;
    }

    let finished = tokio::time::timeout(
        budget,
        handle.wait_for(|s| {
            matches!(
                s.status,
                MonitorStatus::AlertSent { .. } | MonitorStatus::DispatchFailed { .. }
            )
        }),
    )
    .await;

    match finished {
        Ok(snapshot) => report(&snapshot?, args.json),
        Err(_) => info!("No fall confirmed"),
    }
    handle.shutdown().await
}

fn report(snapshot: &MonitorSnapshot, json: bool) {
    match &snapshot.status {
        MonitorStatus::AlertSent { event_id, severity } => info!(
            "Alert sent: severity {} (event {})",
            severity.as_str(),
            event_id.as_deref().unwrap_or("-")
        ),
        MonitorStatus::DispatchFailed { reason } => warn!("Alert not delivered: {reason}"),
        other => info!("Finished in state {}", other.label()),
    }

    let Some(payload) = &snapshot.last_alert else {
        return;
    };
    info!("  severity score : {}", payload.severity_score);
    info!("  peak accel     : {} m/s²", payload.severity_metrics.acceleration_peak);
    info!("  rotation       : {} rad/s", payload.severity_metrics.rotation_angle);
    info!("  time still     : {} ms", payload.severity_metrics.time_still_ms);
    match payload.severity_metrics.height_estimate_meters {
        Some(h) => info!("  height         : {h} m"),
        None => info!("  height         : n/a"),
    }

    if json {
        match serde_json::to_string_pretty(payload) {
            Ok(body) => println!("{body}"),
            Err(e) => error!("Cannot serialize payload: {e}"),
        }
    }
}
