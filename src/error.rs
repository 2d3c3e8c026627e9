//! Error types for the fall sensing engine.
//!
//! The engine itself is infallible once constructed: malformed readings are
//! skipped, not propagated. Errors surface at the edges: sensor start-up,
//! configuration loading, geolocation and alert dispatch.

use std::path::PathBuf;

use thiserror::Error;

/// Common result type for fall sensing operations.
pub type Result<T> = std::result::Result<T, FallError>;

/// Unified error type for the fall sensing engine and its collaborators.
#[derive(Debug, Error)]
pub enum FallError {
    /// The sensor source could not be started. Sampling never begins.
    #[error("Sensor initialization failed: {0}")]
    SensorInit(String),

    /// A sensor callback delivered a partial or non-finite reading.
    #[error("Malformed sensor reading: {0}")]
    MalformedReading(String),

    /// The one-shot location lookup produced nothing.
    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    /// The user declined the location permission.
    #[error("Location permission denied")]
    PermissionDenied,

    /// The alert sink rejected or failed to deliver the payload.
    #[error("Alert dispatch failed: {0}")]
    Dispatch(String),

    /// A configuration field has an invalid value.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidConfig {
        /// Name of the field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// A configuration file could not be read.
    #[error("Cannot read config file `{path}`: {source}")]
    ConfigRead {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file contains malformed JSON.
    #[error("Cannot parse config file `{path}`: {source}")]
    ConfigParse {
        /// Path that was being parsed.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The monitor task has shut down and no longer accepts events.
    #[error("Fall monitor is no longer running")]
    MonitorClosed,
}

impl FallError {
    /// Construct an [`FallError::InvalidConfig`].
    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        FallError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    /// Whether this error is an expected degraded condition rather than a
    /// fault. Location failures only drop the coordinates from the payload.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FallError::LocationUnavailable(_)
                | FallError::PermissionDenied
                | FallError::MalformedReading(_)
        )
    }
}
