//! GuardianLink Server
//!
//! Runs the update pipeline of `guardian-core` behind an HTTP API and streams
//! every event to browsers as Server-Sent Events.
//!
//! Two subsystems run under `tokio-graceful-shutdown`:
//!
//! - **producer**: polls a [`SignalSource`](producer::SignalSource) (the
//!   built-in simulator unless a scanning backend is plugged in) and feeds
//!   each reading to the [`Monitor`]
//! - **web**: the axum router, see [`web`]
//!
//! All tracking state lives in one [`Monitor`], shared as a [`Session`].

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use guardian_core::{
    Calibration, Event, EventKind, ObserverPose, ProjectionFix, Result as CoreResult, Sample,
    StatusSnapshot, Tracker, TrackerConfig,
};

pub mod bus;
pub mod config;
pub mod error;
pub mod producer;
pub mod web;

use bus::EventBus;

pub use error::ServerError;

#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// Port for the HTTP API
    #[arg(short, long, default_value_t = 5001)]
    pub port: u16,

    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// JSON file with calibration, thresholds and detection settings
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Milliseconds between scanner polls
    #[arg(long, default_value_t = 2000)]
    pub interval: u64,

    /// Number of samples in the moving average
    #[arg(long, default_value_t = guardian_core::signal::DEFAULT_WINDOW)]
    pub window: usize,

    /// Signal drop (dB) below the recent average that is reported as a fall
    #[arg(long, default_value_t = guardian_core::fall::DEFAULT_FALL_DROP)]
    pub fall_drop: f64,

    /// Signal strength (dBm) measured at one meter
    #[arg(long, default_value_t = guardian_core::signal::DEFAULT_REFERENCE_SIGNAL, allow_negative_numbers = true)]
    pub reference_signal: f64,

    /// Path loss exponent of the environment, 2 in free space
    #[arg(long, default_value_t = guardian_core::signal::DEFAULT_PATH_LOSS_EXPONENT)]
    pub path_loss_exponent: f64,

    /// Advertised name of the tracked bracelet
    #[arg(long, default_value = "GuardianLink")]
    pub device_name: String,

    /// Events buffered per subscriber before it is dropped
    #[arg(long, default_value_t = bus::DEFAULT_CAPACITY)]
    pub bus_capacity: usize,
}

impl Default for Cli {
    fn default() -> Self {
        Cli::parse_from(["guardian-server"])
    }
}

/// Milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

pub type Session = Arc<Monitor>;

/// The tracker behind its lock, plus the bus its events go out on.
///
/// Every update takes the write lock, applies the sample and publishes the
/// resulting events before releasing it, so subscribers see events in the
/// same order the state changed and readers never see a partial update.
pub struct Monitor {
    key: String,
    tracker: RwLock<Tracker>,
    bus: EventBus,
}

impl Monitor {
    pub fn new(key: impl Into<String>, tracker: Tracker, bus: EventBus) -> Session {
        Arc::new(Monitor {
            key: key.into(),
            tracker: RwLock::new(tracker),
            bus,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    fn read(&self) -> RwLockReadGuard<'_, Tracker> {
        self.tracker.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tracker> {
        self.tracker.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.read().snapshot()
    }

    pub fn config(&self) -> TrackerConfig {
        *self.read().config()
    }

    /// Run one scan reading through the pipeline.
    pub fn apply_signal(&self, signal: i32, address: &str) -> Vec<Event> {
        let mut tracker = self.write();
        let events = tracker.apply_signal(signal, address, now_ms());
        log::trace!(
            "{}: {} dBm from {} -> {:?} at {:?} m",
            self.key,
            signal,
            address,
            tracker.state().proximity_zone,
            tracker.state().distance_meters
        );
        self.publish(&events);
        events
    }

    /// The scanner completed a cycle without hearing the device.
    pub fn mark_absent(&self) -> Vec<Event> {
        let mut tracker = self.write();
        let events = tracker.mark_absent(now_ms());
        self.publish(&events);
        events
    }

    /// Apply a sample that passed ingestion validation.
    pub fn ingest(&self, sample: Sample) -> Vec<Event> {
        let mut tracker = self.write();
        let events = tracker.apply_sample(sample, now_ms());
        self.publish(&events);
        events
    }

    pub fn set_observer(&self, pose: ObserverPose) -> Option<ProjectionFix> {
        let fix = self.write().set_observer(pose);
        log::debug!("{}: observer at {:?}, projection {:?}", self.key, pose, fix);
        fix
    }

    pub fn recalibrate(&self, signal: f64, actual_distance_meters: f64) -> CoreResult<f64> {
        let reference = self.write().recalibrate(signal, actual_distance_meters)?;
        log::info!(
            "{}: calibrated with {} dBm at {} m, reference signal now {:.1} dBm",
            self.key,
            signal,
            actual_distance_meters,
            reference
        );
        Ok(reference)
    }

    pub fn update_calibration(
        &self,
        reference_signal: Option<f64>,
        path_loss_exponent: Option<f64>,
    ) -> CoreResult<Calibration> {
        let calibration = self
            .write()
            .update_calibration(reference_signal, path_loss_exponent)?;
        log::info!("{}: calibration set to {:?}", self.key, calibration);
        Ok(calibration)
    }

    /// Raise a fall alert by hand.
    pub fn test_fall(&self) -> Event {
        // Held across publish so the event keeps its place in the stream
        let tracker = self.read();
        let event = tracker.manual_fall(now_ms());
        self.publish(std::slice::from_ref(&event));
        event
    }

    fn publish(&self, events: &[Event]) {
        for event in events {
            match &event.kind {
                EventKind::FallDetected { signal, source, .. } => {
                    log::warn!(
                        "{}: possible fall (signal {:?}, source {:?})",
                        self.key,
                        signal,
                        source
                    );
                }
                EventKind::DeviceDisconnected { last_location, .. } => {
                    log::warn!(
                        "{}: device out of range, last known location {:?}",
                        self.key,
                        last_location.position()
                    );
                }
                EventKind::Fall { device, severity, .. } => {
                    log::warn!("{}: {} reported a {:?} fall", self.key, device, severity);
                }
                _ => {}
            }
            self.bus.publish(event.clone());
        }
    }
}
