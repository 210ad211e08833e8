//! Ingestion boundary
//!
//! Samples arrive as loosely typed JSON from the scanner or from hardware
//! posting directly. Everything is checked here so that a rejected sample
//! never reaches the [`Tracker`](crate::Tracker).
//!
//! Three shapes are recognized, checked in this order:
//!
//! 1. `{"fallSignaled": true, "severity": "high"}` - fall reported by the device
//! 2. `{"lat": 37.77, "lng": -122.41, "signal": -70}` - direct position report
//! 3. `{"signal": -62, "deviceAddress": "AA:BB:..."}` - a scan reading
//!
//! The names used by the first generation of firmware (`rssi`, `address`,
//! `device_id`, `fall`) are accepted as aliases.

use serde::Deserialize;

use crate::error::{GuardianError, Result};
use crate::event::Severity;
use crate::geo::Coordinate;

/// Device name used when a direct report does not identify itself
pub const UNKNOWN_DEVICE: &str = "unknown";

/// Raw, unvalidated payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSample {
    #[serde(default, alias = "rssi")]
    pub signal: Option<f64>,
    #[serde(default, alias = "address", alias = "device_id")]
    pub device_address: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default, alias = "fall")]
    pub fall_signaled: Option<bool>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

/// A validated sample, ready to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Signal {
        signal: i32,
        address: String,
    },
    Location {
        device: String,
        position: Coordinate,
        signal: Option<i32>,
    },
    Fall {
        device: String,
        severity: Severity,
        meta: serde_json::Value,
    },
}

impl Sample {
    /// Parse and validate a JSON payload.
    pub fn from_json(value: serde_json::Value) -> Result<Sample> {
        let raw: IngestSample = serde_json::from_value(value)
            .map_err(|e| GuardianError::invalid_input(e.to_string()))?;
        raw.validate()
    }
}

impl IngestSample {
    pub fn validate(self) -> Result<Sample> {
        let device = self
            .device_address
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        if self.fall_signaled == Some(true) {
            let severity = match self.severity.as_deref() {
                None => Severity::default(),
                Some(s) => s.parse().map_err(|e: String| GuardianError::invalid_input(e))?,
            };
            return Ok(Sample::Fall {
                device: device.unwrap_or_else(|| UNKNOWN_DEVICE.to_string()),
                severity,
                meta: self
                    .meta
                    .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
            });
        }

        let signal = self.signal.map(to_signal).transpose()?;

        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => {
                return Ok(Sample::Location {
                    device: device.unwrap_or_else(|| UNKNOWN_DEVICE.to_string()),
                    position: Coordinate::new(lat, lng)?,
                    signal,
                });
            }
            (Some(_), None) => return Err(GuardianError::invalid_input("lat given without lng")),
            (None, Some(_)) => return Err(GuardianError::invalid_input("lng given without lat")),
            (None, None) => {}
        }

        match (signal, device) {
            (Some(signal), Some(address)) => Ok(Sample::Signal { signal, address }),
            (Some(_), None) => Err(GuardianError::invalid_input(
                "signal reading without deviceAddress",
            )),
            (None, _) => Err(GuardianError::invalid_input("no recognized fields")),
        }
    }
}

fn to_signal(value: f64) -> Result<i32> {
    if !value.is_finite() || value.abs() > i32::MAX as f64 {
        return Err(GuardianError::invalid_input(format!(
            "signal must be a finite number, got {}",
            value
        )));
    }
    Ok(value.round() as i32)
}
