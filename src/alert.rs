//! Alert payload assembly.
//!
//! Packages a confirmed episode's severity, the wearer's profile and an
//! optional location into the record handed to the alert sink. Assembly is
//! a pure function; sending is the caller's job.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::severity::{SeverityLevel, SeverityMetrics, SeverityResult};

/// Subject identifier used when no name or explicit id is known.
pub const DEFAULT_SUBJECT_ID: &str = "demo-user-1";

/// Event type carried by every payload this engine produces.
pub const FALL_EVENT_TYPE: &str = "FALL";

/// Who is wearing the device and whom to notify.
///
/// Supplied by the caller at confirmation time; the engine never reads
/// profile storage itself.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectProfile {
    /// Stable subject id. Derived from the display name when absent.
    #[serde(default)]
    pub subject_id: Option<String>,
    /// Name shown to the contact.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Destination contact identifier (e.g. an email address).
    #[serde(default)]
    pub contact_id: Option<String>,
}

impl SubjectProfile {
    pub fn new(display_name: impl Into<String>, contact_id: impl Into<String>) -> Self {
        Self {
            subject_id: None,
            display_name: Some(display_name.into()),
            contact_id: Some(contact_id.into()),
        }
    }

    /// The subject id to report.
    ///
    /// An explicit non-blank id wins; otherwise the display name is slugged
    /// ("Ana María López" → "ana-mar-a-l-pez"); otherwise
    /// [`DEFAULT_SUBJECT_ID`].
    pub fn subject_id(&self) -> String {
        if let Some(id) = non_blank(self.subject_id.as_deref()) {
            return id.to_string();
        }
        self.display_name
            .as_deref()
            .map(slugify)
            .filter(|slug| !slug.is_empty())
            .unwrap_or_else(|| DEFAULT_SUBJECT_ID.to_string())
    }
}

/// Lowercase, collapse runs of non `[a-z0-9]` into single hyphens and strip
/// leading/trailing hyphens.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A geographic position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// The boundary-crossing alert record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    pub subject_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub contact_id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    /// ISO-8601 UTC timestamp of confirmation.
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub location: Option<Coordinates>,
    pub severity: SeverityLevel,
    pub severity_score: u8,
    pub severity_metrics: SeverityMetrics,
}

impl AlertPayload {
    /// Serialize to the JSON body the sink expects.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Build the payload for one confirmed episode.
pub fn assemble_alert(
    profile: &SubjectProfile,
    timestamp: DateTime<Utc>,
    location: Option<Coordinates>,
    severity: &SeverityResult,
) -> AlertPayload {
    AlertPayload {
        subject_id: profile.subject_id(),
        display_name: non_blank(profile.display_name.as_deref()).map(str::to_string),
        contact_id: non_blank(profile.contact_id.as_deref()).map(str::to_string),
        event_type: FALL_EVENT_TYPE.to_string(),
        timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        location,
        severity: severity.level,
        severity_score: severity.score,
        severity_metrics: severity.metrics,
    }
}
