//! GuardianLink Core
//!
//! Platform-independent signal processing and geolocation estimation for a
//! single tracked wearable. This crate does no I/O and has no async runtime;
//! the server feeds it samples and forwards the events it returns.
//!
//! # Architecture
//!
//! - **signal**: bounded moving-average smoother and the log-distance
//!   path-loss model ([`Calibration`])
//! - **proximity**: step classification of smoothed signal into zones
//! - **fall**: sudden-drop detector working on raw samples
//! - **geo**: great-circle destination, initial bearing, compass sectors
//! - **state**: the authoritative [`DeviceState`] and the [`Tracker`] that
//!   applies every update in one step
//! - **event**: typed records published to subscribers
//! - **ingest**: validation of samples arriving from outside the process
//!
//! # Usage
//!
//! ```rust,ignore
//! use guardian_core::{Tracker, TrackerConfig, ObserverPose};
//!
//! let mut tracker = Tracker::new(TrackerConfig::default())?;
//! tracker.set_observer(ObserverPose::new(37.7749, -122.4194, Some(90.0))?);
//!
//! for event in tracker.apply_signal(-62, "AA:BB:CC:DD:EE:FF", now_ms) {
//!     bus.publish(event);
//! }
//! ```

pub mod error;
pub mod event;
pub mod fall;
pub mod geo;
pub mod ingest;
pub mod proximity;
pub mod signal;
pub mod state;

pub use error::{GuardianError, Result};
pub use event::{Event, EventKind, Severity};
pub use fall::detect_fall;
pub use geo::{bearing, project, Cardinal, Coordinate};
pub use ingest::{IngestSample, Sample};
pub use proximity::{ProximityZone, ZoneColor, ZoneThresholds};
pub use signal::{estimate_distance, Calibration, SignalHistory, SignalSample};
pub use state::{
    DeviceState, LastKnownLocation, ObserverPose, ProjectionFix, StatusSnapshot, Tracker,
    TrackerConfig,
};

/// Round `value` to `places` decimal places.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
