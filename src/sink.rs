//! Collaborator boundaries.
//!
//! The engine talks to the outside world through three traits:
//! - [`SensorSource`] starts the platform sensors and pushes readings into a
//!   [`SensorFeed`]
//! - [`LocationProvider`] performs a one-shot, best-effort position lookup
//! - [`AlertSink`] delivers a finalized [`AlertPayload`]
//!
//! Small reference implementations live here too; they back the demo binary
//! and the tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::alert::{AlertPayload, Coordinates};
use crate::error::{FallError, Result};
use crate::monitor::SensorFeed;

/// Platform sensor driver.
pub trait SensorSource: Send + Sync {
    /// Whether a barometer is present. Queried once, at monitor start.
    fn has_barometer(&self) -> bool;

    /// Begin delivering readings to `feed` at roughly `interval`.
    ///
    /// Called from within a tokio runtime.
    fn start(&self, interval: Duration, feed: SensorFeed) -> Result<()>;
}

/// One-shot geolocation lookup.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Current position. Failure only drops the location from the alert.
    async fn current_position(&self) -> Result<Coordinates>;
}

/// What the sink reports back.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReceipt {
    pub success: bool,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl DispatchReceipt {
    pub fn delivered(event_id: impl Into<String>) -> Self {
        Self {
            success: true,
            event_id: Some(event_id.into()),
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            event_id: None,
            message: Some(message.into()),
        }
    }

    /// Fold `success == false` into an error.
    pub fn into_result(self) -> Result<DispatchReceipt> {
        if self.success {
            Ok(self)
        } else {
            Err(FallError::Dispatch(
                self.message
                    .unwrap_or_else(|| "sink reported failure".to_string()),
            ))
        }
    }
}

/// Destination for confirmed fall alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Sink name, for logs.
    fn name(&self) -> &str;

    /// Deliver one payload. Called once per confirmed episode, never retried.
    async fn dispatch(&self, payload: &AlertPayload) -> Result<DispatchReceipt>;
}

/// Logs every payload as JSON and reports success.
#[derive(Debug, Default)]
pub struct LogAlertSink {
    sent: std::sync::atomic::AtomicU64,
}

impl LogAlertSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertSink for LogAlertSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn dispatch(&self, payload: &AlertPayload) -> Result<DispatchReceipt> {
        let body = payload
            .to_json()
            .map_err(|e| FallError::Dispatch(format!("cannot serialize payload: {e}")))?;
        let n = self
            .sent
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1;
        tracing::info!(
            subject_id = %payload.subject_id,
            severity = payload.severity.as_str(),
            body = %body,
            "Fall alert"
        );
        Ok(DispatchReceipt::delivered(format!("log-{n}")))
    }
}

/// Records payloads in memory. Can be told to fail.
#[derive(Debug, Clone, Default)]
pub struct MemoryAlertSink {
    payloads: Arc<Mutex<Vec<AlertPayload>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every dispatch is rejected with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            payloads: Arc::default(),
            failure: Arc::new(Mutex::new(Some(message.into()))),
        }
    }

    /// Switch failure mode on (`Some`) or off (`None`).
    pub async fn set_failure(&self, message: Option<String>) {
        *self.failure.lock().await = message;
    }

    /// Payloads received so far, including rejected ones.
    pub async fn payloads(&self) -> Vec<AlertPayload> {
        self.payloads.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.payloads.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.payloads.lock().await.is_empty()
    }
}

#[async_trait]
impl AlertSink for MemoryAlertSink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn dispatch(&self, payload: &AlertPayload) -> Result<DispatchReceipt> {
        let mut payloads = self.payloads.lock().await;
        payloads.push(payload.clone());
        let receipt = match self.failure.lock().await.as_ref() {
            Some(message) => DispatchReceipt::rejected(message.clone()),
            None => DispatchReceipt::delivered(format!("mem-{}", payloads.len())),
        };
        Ok(receipt)
    }
}

/// Always reports the same position.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub Coordinates);

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_position(&self) -> Result<Coordinates> {
        Ok(self.0)
    }
}

/// A device without location access.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocation {
    /// Report a permission denial instead of plain unavailability.
    pub denied: bool,
}

#[async_trait]
impl LocationProvider for NoLocation {
    async fn current_position(&self) -> Result<Coordinates> {
        if self.denied {
            Err(FallError::PermissionDenied)
        } else {
            Err(FallError::LocationUnavailable("no position fix".to_string()))
        }
    }
}
