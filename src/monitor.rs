//! Runtime host for the fall engine.
//!
//! [`FallMonitor`] runs one [`FallEngine`] inside a single tokio task and
//! serializes everything that touches it:
//! - sensor readings pushed through a [`SensorFeed`]
//! - the 1 Hz countdown tick
//! - cancel requests and profile updates from a [`MonitorHandle`]
//! - completions of in-flight alert dispatches
//!
//! Location lookup and alert delivery run in their own spawned task, so
//! sampling and new countdowns carry on while a sink call is outstanding.
//! Progress is published as a [`MonitorSnapshot`] on a watch channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::alert::{assemble_alert, AlertPayload, SubjectProfile};
use crate::classifier::Classification;
use crate::engine::{ConfirmedEpisode, EngineConfig, EngineCounters, EngineEvent, EnginePhase, FallEngine};
use crate::error::{FallError, Result};
use crate::normalizer::{RawAxes, SampleNormalizer};
use crate::severity::SeverityLevel;
use crate::sink::{AlertSink, DispatchReceipt, LocationProvider, SensorSource};
use crate::types::SensorCapabilities;

/// Input to the monitor task.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorCommand {
    Acceleration { timestamp_ms: u64, raw: RawAxes },
    Rotation(RawAxes),
    Pressure(Option<f64>),
    Cancel,
    UpdateProfile(SubjectProfile),
    Shutdown,
}

/// Milliseconds since the monitor started. Shared by samples and ticks.
#[derive(Debug, Clone, Copy)]
struct MonitorClock {
    origin: Instant,
}

impl MonitorClock {
    fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Callback surface handed to a [`SensorSource`].
///
/// Cheap to clone. Every method fails with [`FallError::MonitorClosed`]
/// once the monitor has stopped.
#[derive(Debug, Clone)]
pub struct SensorFeed {
    tx: mpsc::UnboundedSender<MonitorCommand>,
    clock: MonitorClock,
}

impl SensorFeed {
    /// A feed not attached to any monitor, with the receiving end.
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<MonitorCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let feed = Self {
            tx,
            clock: MonitorClock::start(),
        };
        (feed, rx)
    }

    /// Accelerometer callback. Timestamped on arrival.
    pub fn acceleration(&self, raw: RawAxes) -> Result<()> {
        self.send(MonitorCommand::Acceleration {
            timestamp_ms: self.clock.now_ms(),
            raw,
        })
    }

    /// Gyroscope callback.
    pub fn rotation(&self, raw: RawAxes) -> Result<()> {
        self.send(MonitorCommand::Rotation(raw))
    }

    /// Barometer callback (hPa).
    pub fn pressure(&self, pressure_hpa: Option<f64>) -> Result<()> {
        self.send(MonitorCommand::Pressure(pressure_hpa))
    }

    fn send(&self, command: MonitorCommand) -> Result<()> {
        self.tx.send(command).map_err(|_| FallError::MonitorClosed)
    }
}

/// What the monitor is doing, as shown to the wearer.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MonitorStatus {
    #[default]
    Starting,
    /// Sampling, no episode.
    Monitoring,
    /// Sensors could not be started. Reported once; nothing is sampled.
    SensorsUnavailable { reason: String },
    /// Countdown running.
    PossibleFall { remaining: u8 },
    /// Alert handed to the sink, waiting for the outcome.
    Dispatching,
    /// The sink accepted the alert.
    AlertSent {
        event_id: Option<String>,
        severity: SeverityLevel,
    },
    /// The sink rejected the alert. Not retried.
    DispatchFailed { reason: String },
}

impl MonitorStatus {
    pub fn label(&self) -> &'static str {
        match self {
            MonitorStatus::Starting => "starting",
            MonitorStatus::Monitoring => "monitoring",
            MonitorStatus::SensorsUnavailable { .. } => "sensors_unavailable",
            MonitorStatus::PossibleFall { .. } => "possible_fall",
            MonitorStatus::Dispatching => "dispatching",
            MonitorStatus::AlertSent { .. } => "alert_sent",
            MonitorStatus::DispatchFailed { .. } => "dispatch_failed",
        }
    }
}

/// Point-in-time view of the monitor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonitorSnapshot {
    pub status: MonitorStatus,
    pub classification: Classification,
    pub counters: EngineCounters,
    /// The last payload handed to the sink, delivered or not.
    pub last_alert: Option<AlertPayload>,
    pub dispatches_in_flight: usize,
    pub alerts_sent: u64,
    pub alerts_failed: u64,
}

/// Control surface of a running monitor.
pub struct MonitorHandle {
    tx: mpsc::UnboundedSender<MonitorCommand>,
    snapshots: watch::Receiver<MonitorSnapshot>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Dismiss the running countdown. No-op without one.
    pub fn cancel(&self) -> Result<()> {
        self.send(MonitorCommand::Cancel)
    }

    /// Replace the profile used for subsequent alerts.
    pub fn update_profile(&self, profile: SubjectProfile) -> Result<()> {
        self.send(MonitorCommand::UpdateProfile(profile))
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> MonitorSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<MonitorSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until a snapshot satisfies `predicate`. Checks the current one
    /// first.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<MonitorSnapshot>
    where
        F: FnMut(&MonitorSnapshot) -> bool,
    {
        let mut rx = self.snapshots.clone();
        let snapshot = rx
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| FallError::MonitorClosed)?;
        Ok(snapshot.clone())
    }

    /// Stop the monitor task and wait for it to exit.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.tx.send(MonitorCommand::Shutdown);
        self.task.await.map_err(|_| FallError::MonitorClosed)
    }

    fn send(&self, command: MonitorCommand) -> Result<()> {
        self.tx.send(command).map_err(|_| FallError::MonitorClosed)
    }
}

/// Result of one dispatch task.
struct DispatchFinished {
    payload: AlertPayload,
    result: Result<DispatchReceipt>,
}

/// Single-task event loop around a [`FallEngine`].
pub struct FallMonitor {
    engine: FallEngine,
    normalizer: SampleNormalizer,
    profile: SubjectProfile,
    location: Arc<dyn LocationProvider>,
    sink: Arc<dyn AlertSink>,
    clock: MonitorClock,
    status: MonitorStatus,
    last_alert: Option<AlertPayload>,
    in_flight: usize,
    alerts_sent: u64,
    alerts_failed: u64,
    done_tx: mpsc::UnboundedSender<DispatchFinished>,
    snapshots: watch::Sender<MonitorSnapshot>,
}

impl FallMonitor {
    /// Validate `config`, start the sensors and spawn the monitor task.
    ///
    /// Must be called from within a tokio runtime. A sensor start failure is
    /// not an error here: the monitor runs with status
    /// [`MonitorStatus::SensorsUnavailable`].
    pub fn spawn(
        config: EngineConfig,
        profile: SubjectProfile,
        source: Arc<dyn SensorSource>,
        location: Arc<dyn LocationProvider>,
        sink: Arc<dyn AlertSink>,
    ) -> Result<MonitorHandle> {
        config.validate()?;

        let capabilities = SensorCapabilities {
            barometer: source.has_barometer(),
        };
        let sample_interval = Duration::from_millis(config.window.sample_interval_ms);
        let tick_interval = Duration::from_millis(config.countdown.tick_interval_ms);

        let clock = MonitorClock::start();
        let (tx, rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (snapshots, snapshot_rx) = watch::channel(MonitorSnapshot::default());

        let mut monitor = FallMonitor {
            engine: FallEngine::new(config, capabilities),
            normalizer: SampleNormalizer::new(capabilities),
            profile,
            location,
            sink,
            clock,
            status: MonitorStatus::Starting,
            last_alert: None,
            in_flight: 0,
            alerts_sent: 0,
            alerts_failed: 0,
            done_tx,
            snapshots,
        };

        let feed = SensorFeed {
            tx: tx.clone(),
            clock,
        };
        match source.start(sample_interval, feed) {
            Ok(()) => {
                info!(
                    barometer = capabilities.barometer,
                    interval_ms = sample_interval.as_millis() as u64,
                    "Fall monitoring started"
                );
                monitor.status = MonitorStatus::Monitoring;
            }
            Err(e) => {
                warn!(error = %e, "Sensors unavailable, fall monitoring disabled");
                monitor.status = MonitorStatus::SensorsUnavailable {
                    reason: e.to_string(),
                };
            }
        }
        monitor.publish();

        let task = tokio::spawn(monitor.run(rx, done_rx, tick_interval));
        Ok(MonitorHandle {
            tx,
            snapshots: snapshot_rx,
            task,
        })
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<MonitorCommand>,
        mut completions: mpsc::UnboundedReceiver<DispatchFinished>,
        tick_interval: Duration,
    ) {
        let mut ticker = tokio::time::interval_at(Instant::now() + tick_interval, tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(MonitorCommand::Shutdown) | None => {
                        info!("Fall monitor shutting down");
                        break;
                    }
                    Some(command) => self.handle(command, &mut ticker),
                },
                Some(finished) = completions.recv() => self.on_dispatch_finished(finished),
                _ = ticker.tick() => self.on_tick(),
            }
            self.publish();
        }
    }

    fn handle(&mut self, command: MonitorCommand, ticker: &mut Interval) {
        match command {
            MonitorCommand::Acceleration { timestamp_ms, raw } => {
                match self.normalizer.on_acceleration(timestamp_ms, raw) {
                    Ok(sample) => {
                        if let Some(EngineEvent::EpisodeOpened { .. }) = self.engine.observe(&sample) {
                            // First tick lands one full period after onset.
                            ticker.reset();
                            self.status = MonitorStatus::PossibleFall {
                                remaining: self.engine.config().countdown.ticks,
                            };
                        }
                    }
                    Err(e) => debug!(error = %e, "Dropping acceleration reading"),
                }
            }
            MonitorCommand::Rotation(raw) => {
                if let Err(e) = self.normalizer.on_rotation(raw) {
                    debug!(error = %e, "Dropping rotation reading");
                }
            }
            MonitorCommand::Pressure(p) => {
                if let Err(e) = self.normalizer.on_pressure(p) {
                    debug!(error = %e, "Dropping pressure reading");
                }
            }
            MonitorCommand::Cancel => {
                if self.engine.cancel().is_some() {
                    self.status = MonitorStatus::Monitoring;
                }
            }
            MonitorCommand::UpdateProfile(profile) => {
                debug!(subject_id = %profile.subject_id(), "Profile updated");
                self.profile = profile;
            }
            MonitorCommand::Shutdown => {}
        }
    }

    fn on_tick(&mut self) {
        match self.engine.tick(self.clock.now_ms()) {
            Some(EngineEvent::CountdownTick { remaining }) => {
                self.status = MonitorStatus::PossibleFall { remaining };
            }
            Some(EngineEvent::Confirmed(confirmed)) => self.dispatch(confirmed, Utc::now()),
            _ => {}
        }
    }

    fn dispatch(&mut self, confirmed: ConfirmedEpisode, confirmed_at: DateTime<Utc>) {
        self.in_flight += 1;
        self.status = MonitorStatus::Dispatching;

        let profile = self.profile.clone();
        let location = Arc::clone(&self.location);
        let sink = Arc::clone(&self.sink);
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let coordinates = match location.current_position().await {
                Ok(c) => Some(c),
                Err(e) if e.is_recoverable() => {
                    warn!(error = %e, "Location unavailable, alerting without it");
                    None
                }
                Err(e) => {
                    error!(error = %e, "Location provider failed, alerting without it");
                    None
                }
            };
            let payload = assemble_alert(&profile, confirmed_at, coordinates, &confirmed.severity);
            info!(
                sink = sink.name(),
                subject_id = %payload.subject_id,
                severity = payload.severity.as_str(),
                "Dispatching fall alert"
            );
            let result = sink
                .dispatch(&payload)
                .await
                .and_then(DispatchReceipt::into_result);
            let _ = done_tx.send(DispatchFinished { payload, result });
        });
    }

    fn on_dispatch_finished(&mut self, finished: DispatchFinished) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let outcome = match finished.result {
            Ok(receipt) => {
                self.alerts_sent += 1;
                info!(event_id = ?receipt.event_id, "Fall alert delivered");
                MonitorStatus::AlertSent {
                    event_id: receipt.event_id,
                    severity: finished.payload.severity,
                }
            }
            Err(e) => {
                self.alerts_failed += 1;
                warn!(error = %e, "Fall alert dispatch failed");
                MonitorStatus::DispatchFailed {
                    reason: e.to_string(),
                }
            }
        };
        self.last_alert = Some(finished.payload);

        // A newer countdown keeps the screen.
        if self.engine.phase() == EnginePhase::Idle {
            self.status = outcome;
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(MonitorSnapshot {
            status: self.status.clone(),
            classification: self.engine.classification(),
            counters: self.engine.counters(),
            last_alert: self.last_alert.clone(),
            dispatches_in_flight: self.in_flight,
            alerts_sent: self.alerts_sent,
            alerts_failed: self.alerts_failed,
        });
    }
}
