//! Fall Sensing Engine Library
//!
//! An on-device motion classification engine that turns a continuous stream
//! of accelerometer, gyroscope and (optional) barometer readings into
//! confirmed, severity-graded fall alerts.
//!
//! # Design Philosophy
//!
//! - **Explicit state machine**: one [`FallEngine`] value owns the window, the
//!   live episode and the countdown; it changes only through `observe`,
//!   `tick` and `cancel`.
//! - **Edge-triggered detection**: an episode opens on the transition into
//!   FALL, never on a sustained FALL classification.
//! - **Wearer in control**: every detection starts a cancellable countdown
//!   before anything leaves the device.
//! - **I/O at the edges**: sensors, location and alert delivery sit behind
//!   traits; the engine itself never blocks.
//!
//! # Example
//!
//! ```
//! use fall_sensing::{EngineConfig, EngineEvent, FallEngine, Sample, SensorCapabilities};
//!
//! let mut engine = FallEngine::new(EngineConfig::default(), SensorCapabilities::inertial_only());
//!
//! // Three seconds lying still, then a 24.5 m/s² impact.
//! for i in 0..60 {
//!     engine.observe(&Sample::new(i * 50, [0.0, 0.0, 1.0], [0.0; 3]));
//! }
//! let event = engine.observe(&Sample::new(3000, [0.0, 0.0, 2.5], [0.0; 3]));
//! assert_eq!(event, Some(EngineEvent::EpisodeOpened { started_at_ms: 3000 }));
//! ```

pub mod alert;
pub mod classifier;
pub mod countdown;
pub mod engine;
pub mod episode;
pub mod error;
pub mod monitor;
pub mod normalizer;
pub mod severity;
pub mod simulation;
pub mod sink;
pub mod types;
pub mod window;

#[cfg(test)]
mod integration_tests;

// Re-export commonly used types
pub use alert::{assemble_alert, AlertPayload, Coordinates, SubjectProfile};
pub use classifier::{Classification, ClassifierConfig, MotionClassifier};
pub use countdown::{ConfirmationTimer, CountdownConfig};
pub use engine::{ConfirmedEpisode, EngineConfig, EngineEvent, EnginePhase, FallEngine};
pub use episode::{DetectionEpisode, EpisodeTracker};
pub use error::{FallError, Result};
pub use monitor::{FallMonitor, MonitorHandle, MonitorSnapshot, MonitorStatus, SensorFeed};
pub use normalizer::{RawAxes, SampleNormalizer};
pub use severity::{SeverityConfig, SeverityEstimator, SeverityLevel, SeverityMetrics, SeverityResult};
pub use sink::{AlertSink, DispatchReceipt, LocationProvider, SensorSource};
pub use types::{ClassificationState, Sample, SensorCapabilities};
pub use window::{SlidingWindow, WindowConfig, WindowStats};
