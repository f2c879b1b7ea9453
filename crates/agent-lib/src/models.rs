//! Core data models for the location sync agent

use chrono::{SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single location reading for a tracked device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub device_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Epoch milliseconds as reported by the source
    pub timestamp: i64,
    /// RFC 3339 rendering of `timestamp`
    pub observed_at: String,
}

impl Observation {
    /// Build an observation, deriving `observed_at` from the timestamp
    pub fn new(device_id: impl Into<String>, latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Self {
            device_id: device_id.into(),
            latitude,
            longitude,
            timestamp,
            observed_at: iso_timestamp(timestamp),
        }
    }
}

/// Render epoch milliseconds as an RFC 3339 UTC timestamp.
///
/// Out-of-range values fall back to the Unix epoch.
pub fn iso_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Server-side fate of a single observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOutcome {
    /// Server persisted a new point
    Stored,
    /// Server already knew this point
    Duplicate,
    /// No determination possible (network or protocol error)
    Failed,
}

impl DeliveryOutcome {
    /// Whether the server acknowledged the observation either way
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, DeliveryOutcome::Stored | DeliveryOutcome::Duplicate)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Stored => "stored",
            DeliveryOutcome::Duplicate => "duplicate",
            DeliveryOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bearer credential obtained through pairing
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}
