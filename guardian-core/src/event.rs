//! Events
//!
//! Everything the tracker learns is published as an [`Event`]. Events are
//! immutable once built and are never stored; subscribers see them as a
//! self-describing JSON object:
//!
//! ```json
//! {"ts": 1718000000.25, "type": "status_update", "connected": true, ...}
//! ```

use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;
use crate::state::LastKnownLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::High
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// Source tag for events raised by hand through the API
pub const SOURCE_MANUAL_TEST: &str = "manual_test";

/// Source tag for events reported directly by the device
pub const SOURCE_INGEST: &str = "ingest";

/// Reason given when the device drops out of range
pub const REASON_OUT_OF_RANGE: &str = "out_of_range";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Seconds since the Unix epoch
    pub ts: f64,

    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(kind: EventKind, now_ms: u64) -> Self {
        Event {
            ts: now_ms as f64 / 1000.0,
            kind,
        }
    }

    /// Wire name of the event, as found in the `type` field
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            EventKind::StatusUpdate { .. } => "status_update",
            EventKind::FallDetected { .. } => "fall_detected",
            EventKind::DeviceDisconnected { .. } => "device_disconnected",
            EventKind::Location { .. } => "location",
            EventKind::Fall { .. } => "fall",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// Summary after every processed sample
    StatusUpdate {
        connected: bool,
        signal: Option<f64>,
        distance: Option<f64>,
        location: Option<Coordinate>,
    },

    /// Fall inferred from the signal, or injected for testing
    FallDetected {
        severity: Severity,
        #[serde(skip_serializing_if = "Option::is_none")]
        signal: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        distance: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },

    DeviceDisconnected {
        #[serde(skip_serializing_if = "Option::is_none")]
        distance: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(rename = "lastLocation")]
        last_location: LastKnownLocation,
    },

    /// Position or presence reported by the device itself
    Location {
        device: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        lat: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        lng: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        signal: Option<i32>,
        source: String,
    },

    /// Fall reported by the device's own motion sensing
    Fall {
        device: String,
        severity: Severity,
        #[serde(default)]
        meta: serde_json::Value,
        source: String,
    },
}
