//! Device State Tracking
//!
//! This module holds the single authoritative [`DeviceState`] of the tracked
//! wearable, the [`LastKnownLocation`] and the [`Tracker`] that updates both.
//!
//! Every mutation goes through a `Tracker` method which runs to completion
//! before returning the events it produced. Wrap the tracker in one lock and
//! readers never observe a half-applied sample.

use serde::{Deserialize, Serialize};

use crate::error::{GuardianError, Result};
use crate::event::{
    Event, EventKind, Severity, REASON_OUT_OF_RANGE, SOURCE_INGEST, SOURCE_MANUAL_TEST,
};
use crate::fall::{detect_fall, DEFAULT_FALL_DROP, FALL_WINDOW};
use crate::geo::{bearing, project, Cardinal, Coordinate};
use crate::ingest::Sample;
use crate::proximity::{ProximityZone, ZoneColor, ZoneThresholds};
use crate::round_to;
use crate::signal::{Calibration, SignalHistory, SignalSample, DEFAULT_WINDOW};

/// Battery level reported until the device tells us otherwise
pub const DEFAULT_BATTERY_PERCENT: u8 = 85;

/// Position and compass heading of the person carrying the receiver
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObserverPose {
    pub lat: f64,
    pub lng: f64,
    /// Degrees clockwise from north, within [0, 360). No heading, no projection.
    pub heading: Option<f64>,
}

impl ObserverPose {
    pub fn new(lat: f64, lng: f64, heading: Option<f64>) -> Result<Self> {
        Coordinate::new(lat, lng)?;
        let heading = match heading {
            Some(h) if !h.is_finite() => {
                return Err(GuardianError::invalid_input(format!(
                    "heading must be a finite number, got {}",
                    h
                )))
            }
            Some(h) => Some(h.rem_euclid(360.0)),
            None => None,
        };
        Ok(ObserverPose { lat, lng, heading })
    }

    pub fn position(&self) -> Coordinate {
        Coordinate {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

/// Last projected position taken while the device was connected.
///
/// Survives disconnection so that alerts can point at the last trustworthy
/// fix. Never reset by a disconnect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LastKnownLocation {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Milliseconds since the Unix epoch
    pub timestamp: Option<u64>,
}

impl LastKnownLocation {
    pub fn position(&self) -> Option<Coordinate> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(Coordinate { lat, lng }),
            _ => None,
        }
    }
}

/// Complete device state
///
/// `connected` is true exactly when `proximity_zone` is not out of range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    pub connected: bool,

    /// Moving average of the raw signal, rounded to 0.1 dBm
    pub smoothed_signal: Option<f64>,

    /// Estimated distance in meters; `None` while unknown
    pub distance_meters: Option<f64>,

    pub proximity_zone: ProximityZone,

    pub zone_color: ZoneColor,

    /// Time of the last reading (milliseconds since epoch)
    pub last_seen: Option<u64>,

    pub device_address: Option<String>,

    /// Projected position of the wearer, updated even while disconnected
    pub child_location: Option<Coordinate>,

    pub observer_pose: Option<ObserverPose>,

    pub battery_percent: u8,
}

impl Default for DeviceState {
    fn default() -> Self {
        DeviceState {
            connected: false,
            smoothed_signal: None,
            distance_meters: None,
            proximity_zone: ProximityZone::OutOfRange,
            zone_color: ZoneColor::Red,
            last_seen: None,
            device_address: None,
            child_location: None,
            observer_pose: None,
            battery_percent: DEFAULT_BATTERY_PERCENT,
        }
    }
}

/// Read-only copy handed out to status queries
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub device: DeviceState,
    pub last_known_location: LastKnownLocation,
}

/// Result of re-projecting the wearer after the observer moved
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProjectionFix {
    pub lat: f64,
    pub lng: f64,
    pub distance: f64,
    /// Degrees from the observer, rounded to 0.1
    pub bearing: f64,
    pub direction: Cardinal,
}

/// Tunables of the update pipeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerConfig {
    pub calibration: Calibration,
    pub thresholds: ZoneThresholds,
    /// Samples in the moving average
    pub smoothing_window: usize,
    /// Drop in dB below the recent mean that counts as a fall
    pub fall_drop: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            calibration: Calibration::default(),
            thresholds: ZoneThresholds::default(),
            smoothing_window: DEFAULT_WINDOW,
            fall_drop: DEFAULT_FALL_DROP,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        self.calibration.validate()?;
        self.thresholds.validate()?;
        if self.smoothing_window == 0 {
            return Err(GuardianError::configuration(
                "smoothing window must hold at least one sample",
            ));
        }
        if !self.fall_drop.is_finite() || self.fall_drop <= 0.0 {
            return Err(GuardianError::configuration(format!(
                "fall drop must be positive, got {}",
                self.fall_drop
            )));
        }
        Ok(())
    }
}

/// Owner of all mutable tracking state.
pub struct Tracker {
    config: TrackerConfig,
    /// Smoothing window
    history: SignalHistory,
    /// Raw samples for fall detection, independent of the smoothing window
    recent: SignalHistory,
    state: DeviceState,
    last_known: LastKnownLocation,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Tracker {
            history: SignalHistory::new(config.smoothing_window),
            recent: SignalHistory::new(FALL_WINDOW),
            config,
            state: DeviceState::default(),
            last_known: LastKnownLocation::default(),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn last_known_location(&self) -> &LastKnownLocation {
        &self.last_known
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            device: self.state.clone(),
            last_known_location: self.last_known,
        }
    }

    /// Apply a validated sample from the ingestion boundary.
    pub fn apply_sample(&mut self, sample: Sample, now_ms: u64) -> Vec<Event> {
        match sample {
            Sample::Signal { signal, address } => self.apply_signal(signal, &address, now_ms),
            Sample::Location {
                device,
                position,
                signal,
            } => vec![self.report_location(device, position, signal, now_ms)],
            Sample::Fall {
                device,
                severity,
                meta,
            } => vec![Event::new(
                EventKind::Fall {
                    device,
                    severity,
                    meta,
                    source: SOURCE_INGEST.to_string(),
                },
                now_ms,
            )],
        }
    }

    /// Run one raw scan reading through the whole pipeline.
    ///
    /// Returns, in order: an optional `fall_detected`, an optional
    /// `device_disconnected` and always a final `status_update`.
    pub fn apply_signal(&mut self, signal: i32, address: &str, now_ms: u64) -> Vec<Event> {
        let mut events = Vec::with_capacity(3);

        // Judged against the history before this sample joins it
        let fall = detect_fall(&self.recent, signal, self.config.fall_drop);
        self.recent.push(SignalSample {
            value: signal,
            observed_at: now_ms,
        });

        let smoothed = self.history.smooth(signal, now_ms);
        let estimate = self.config.calibration.estimate_distance(smoothed);
        let distance = (estimate >= 0.0).then_some(estimate);
        let zone = self.config.thresholds.classify(smoothed);

        self.state.connected = zone.is_connected();
        self.state.smoothed_signal = Some(round_to(smoothed, 1));
        self.state.distance_meters = distance;
        self.state.proximity_zone = zone;
        self.state.zone_color = zone.color();
        self.state.last_seen = Some(now_ms);
        self.state.device_address = Some(address.to_string());

        if fall {
            events.push(Event::new(
                EventKind::FallDetected {
                    severity: Severity::High,
                    signal: Some(signal),
                    distance,
                    source: None,
                },
                now_ms,
            ));
        }

        if !self.state.connected {
            events.push(Event::new(
                EventKind::DeviceDisconnected {
                    distance,
                    reason: Some(REASON_OUT_OF_RANGE.to_string()),
                    last_location: self.last_known,
                },
                now_ms,
            ));
        }

        if let (Some(pose), Some(distance)) = (self.state.observer_pose, distance) {
            if let Some(heading) = pose.heading {
                let child = project(pose.position(), distance, heading);
                self.state.child_location = Some(child);
                // A projection made while disconnected is a guess, not a fix
                if self.state.connected {
                    self.remember_location(child, now_ms);
                }
            }
        }

        events.push(self.status_update(now_ms));
        events
    }

    /// The scanner finished a cycle without seeing the device.
    ///
    /// Only a connected device transitions; repeated absences are silent.
    pub fn mark_absent(&mut self, now_ms: u64) -> Vec<Event> {
        if !self.state.connected {
            return Vec::new();
        }
        self.state.connected = false;
        self.state.proximity_zone = ProximityZone::OutOfRange;
        self.state.zone_color = ProximityZone::OutOfRange.color();

        vec![
            Event::new(
                EventKind::DeviceDisconnected {
                    distance: None,
                    reason: Some(REASON_OUT_OF_RANGE.to_string()),
                    last_location: self.last_known,
                },
                now_ms,
            ),
            self.status_update(now_ms),
        ]
    }

    /// Record where the observer is and re-project the wearer.
    ///
    /// Returns the new fix when a distance estimate and a heading are
    /// available, `None` otherwise.
    pub fn set_observer(&mut self, pose: ObserverPose) -> Option<ProjectionFix> {
        self.state.observer_pose = Some(pose);

        let distance = self.state.distance_meters?;
        let heading = pose.heading?;
        let child = project(pose.position(), distance, heading);
        self.state.child_location = Some(child);

        let b = bearing(pose.position(), child);
        Some(ProjectionFix {
            lat: child.lat,
            lng: child.lng,
            distance,
            bearing: round_to(b, 1),
            direction: Cardinal::from_bearing(b),
        })
    }

    /// Adopt a new reference signal from a reading at a known distance.
    pub fn recalibrate(&mut self, signal: f64, actual_distance_meters: f64) -> Result<f64> {
        self.config
            .calibration
            .recalibrate(signal, actual_distance_meters)
    }

    /// Replace calibration parameters. Nothing changes unless the
    /// resulting calibration is valid.
    pub fn update_calibration(
        &mut self,
        reference_signal: Option<f64>,
        path_loss_exponent: Option<f64>,
    ) -> Result<Calibration> {
        let mut calibration = self.config.calibration;
        if let Some(reference) = reference_signal {
            calibration.reference_signal = reference;
        }
        if let Some(exponent) = path_loss_exponent {
            calibration.path_loss_exponent = exponent;
        }
        calibration.validate()?;
        self.config.calibration = calibration;
        Ok(calibration)
    }

    /// A fall injected by hand, e.g. to test alerting end to end.
    pub fn manual_fall(&self, now_ms: u64) -> Event {
        Event::new(
            EventKind::FallDetected {
                severity: Severity::High,
                signal: None,
                distance: None,
                source: Some(SOURCE_MANUAL_TEST.to_string()),
            },
            now_ms,
        )
    }

    /// A position reported by the device itself. It bypasses distance
    /// estimation and counts as a fix only while the device is connected.
    fn report_location(
        &mut self,
        device: String,
        position: Coordinate,
        signal: Option<i32>,
        now_ms: u64,
    ) -> Event {
        self.state.child_location = Some(position);
        if self.state.connected {
            self.remember_location(position, now_ms);
        }
        Event::new(
            EventKind::Location {
                device,
                lat: Some(position.lat),
                lng: Some(position.lng),
                signal,
                source: SOURCE_INGEST.to_string(),
            },
            now_ms,
        )
    }

    fn remember_location(&mut self, position: Coordinate, now_ms: u64) {
        self.last_known = LastKnownLocation {
            lat: Some(position.lat),
            lng: Some(position.lng),
            timestamp: Some(now_ms),
        };
    }

    fn status_update(&self, now_ms: u64) -> Event {
        Event::new(
            EventKind::StatusUpdate {
                connected: self.state.connected,
                signal: self.state.smoothed_signal,
                distance: self.state.distance_meters,
                location: self.state.child_location,
            },
            now_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

    fn tracker() -> Tracker {
        Tracker::new(TrackerConfig::default()).unwrap()
    }

    fn observer() -> ObserverPose {
        ObserverPose::new(37.7749, -122.4194, Some(90.0)).unwrap()
    }

    fn types(events: &[Event]) -> Vec<&'static str> {
        events.iter().map(|e| e.type_name()).collect()
    }

    #[test]
    fn test_first_sample() {
        let mut t = tracker();
        let events = t.apply_signal(-60, ADDRESS, 1000);

        let state = t.state();
        assert!(state.connected);
        assert_eq!(state.smoothed_signal, Some(-60.0));
        assert_eq!(state.distance_meters, Some(1.0));
        assert_eq!(state.proximity_zone, ProximityZone::VeryClose);
        assert_eq!(state.zone_color, ZoneColor::Green);
        assert_eq!(state.last_seen, Some(1000));
        assert_eq!(state.device_address.as_deref(), Some(ADDRESS));
        assert_eq!(types(&events), vec!["status_update"]);
    }

    #[test]
    fn test_connected_matches_zone() {
        let mut t = tracker();
        for (i, signal) in [-60, -70, -80, -90, -100, -95, -70, -50].iter().enumerate() {
            t.apply_signal(*signal, ADDRESS, i as u64);
            let state = t.state();
            assert_eq!(
                state.connected,
                state.proximity_zone != ProximityZone::OutOfRange
            );
            assert_eq!(state.zone_color, state.proximity_zone.color());
        }
    }

    #[test]
    fn test_fall_on_pre_update_history() {
        let mut t = tracker();
        for i in 0..3 {
            t.apply_signal(-60, ADDRESS, i);
        }
        let events = t.apply_signal(-80, ADDRESS, 3);
        assert_eq!(types(&events), vec!["fall_detected", "status_update"]);
        match &events[0].kind {
            EventKind::FallDetected {
                severity, signal, ..
            } => {
                assert_eq!(*severity, Severity::High);
                assert_eq!(*signal, Some(-80));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_no_fall_with_short_history() {
        let mut t = tracker();
        t.apply_signal(-50, ADDRESS, 0);
        t.apply_signal(-50, ADDRESS, 1);
        let events = t.apply_signal(-84, ADDRESS, 2);
        assert!(!types(&events).contains(&"fall_detected"));
    }

    #[test]
    fn test_fall_with_short_smoothing_window() {
        for window in [1, 2] {
            let mut t = Tracker::new(TrackerConfig {
                smoothing_window: window,
                ..TrackerConfig::default()
            })
            .unwrap();
            for i in 0..5 {
                t.apply_signal(-60, ADDRESS, i);
            }
            let events = t.apply_signal(-100, ADDRESS, 5);
            assert_eq!(types(&events)[0], "fall_detected", "window {}", window);
        }
    }

    #[test]
    fn test_fall_with_long_smoothing_window() {
        let mut t = Tracker::new(TrackerConfig {
            smoothing_window: 10,
            ..TrackerConfig::default()
        })
        .unwrap();
        // Older strong readings are outside the three compared against
        for (i, s) in [-40, -40, -40, -70, -70, -70].into_iter().enumerate() {
            t.apply_signal(s, ADDRESS, i as u64);
        }
        let events = t.apply_signal(-80, ADDRESS, 6);
        assert!(!types(&events).contains(&"fall_detected"));
    }

    #[test]
    fn test_disconnect_event() {
        let mut t = tracker();
        let events = t.apply_signal(-95, ADDRESS, 0);
        assert!(!t.state().connected);
        assert_eq!(types(&events), vec!["device_disconnected", "status_update"]);
    }

    #[test]
    fn test_projection_updates_last_known_while_connected() {
        let mut t = tracker();
        t.set_observer(observer());
        t.apply_signal(-60, ADDRESS, 5000);

        let child = t.state().child_location.unwrap();
        assert!(child.lng > -122.4194);
        let last = t.last_known_location();
        assert_eq!(last.position(), Some(child));
        assert_eq!(last.timestamp, Some(5000));
    }

    #[test]
    fn test_disconnect_keeps_last_known_location() {
        let mut t = tracker();
        t.set_observer(observer());
        for i in 0..3 {
            t.apply_signal(-60, ADDRESS, i);
        }
        // Average -76.7 dBm, far but still connected
        t.apply_signal(-110, ADDRESS, 3);
        assert!(t.state().connected);
        let before = *t.last_known_location();
        let child_before = t.state().child_location;
        assert_eq!(before.timestamp, Some(3));

        // Drag the average out of range
        let mut events = Vec::new();
        for i in 4..6 {
            events = t.apply_signal(-110, ADDRESS, i);
            assert!(!t.state().connected);
        }
        assert_eq!(*t.last_known_location(), before);

        // The projection itself still follows the (growing) distance
        assert_ne!(t.state().child_location, child_before);

        let disconnect = events
            .iter()
            .find(|e| e.type_name() == "device_disconnected")
            .unwrap();
        match &disconnect.kind {
            EventKind::DeviceDisconnected { last_location, .. } => {
                assert_eq!(*last_location, before)
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_no_projection_without_heading() {
        let mut t = tracker();
        t.set_observer(ObserverPose::new(37.0, -122.0, None).unwrap());
        t.apply_signal(-60, ADDRESS, 0);
        assert!(t.state().child_location.is_none());
        assert!(t.last_known_location().lat.is_none());
    }

    #[test]
    fn test_set_observer_without_distance() {
        let mut t = tracker();
        assert!(t.set_observer(observer()).is_none());
        assert_eq!(t.state().observer_pose, Some(observer()));
    }

    #[test]
    fn test_set_observer_reprojects() {
        let mut t = tracker();
        t.apply_signal(-60, ADDRESS, 0);
        let fix = t.set_observer(observer()).unwrap();
        assert_eq!(fix.distance, 1.0);
        assert!((fix.bearing - 90.0).abs() < 1.0);
        assert_eq!(fix.direction, Cardinal::East);
        assert_eq!(
            t.state().child_location,
            Some(Coordinate {
                lat: fix.lat,
                lng: fix.lng
            })
        );
    }

    #[test]
    fn test_mark_absent() {
        let mut t = tracker();
        t.apply_signal(-60, ADDRESS, 0);
        let events = t.mark_absent(1);
        assert_eq!(types(&events), vec!["device_disconnected", "status_update"]);
        assert!(!t.state().connected);
        assert_eq!(t.state().proximity_zone, ProximityZone::OutOfRange);
        assert_eq!(t.state().zone_color, ZoneColor::Red);

        // Already disconnected, nothing more to say
        assert!(t.mark_absent(2).is_empty());
    }

    #[test]
    fn test_recalibrate_affects_next_estimate() {
        let mut t = tracker();
        assert_eq!(t.recalibrate(-65.0, 1.0).unwrap(), -65.0);
        t.apply_signal(-65, ADDRESS, 0);
        assert_eq!(t.state().distance_meters, Some(1.0));
        assert!(t.recalibrate(-65.0, 0.0).is_err());
        assert_eq!(t.config().calibration.reference_signal, -65.0);
    }

    #[test]
    fn test_update_calibration_is_all_or_nothing() {
        let mut t = tracker();
        assert!(t.update_calibration(Some(-50.0), Some(-1.0)).is_err());
        assert_eq!(t.config().calibration, Calibration::default());

        let cal = t.update_calibration(None, Some(2.0)).unwrap();
        assert_eq!(cal.reference_signal, -60.0);
        assert_eq!(t.config().calibration.path_loss_exponent, 2.0);
    }

    #[test]
    fn test_location_report() {
        let mut t = tracker();
        let position = Coordinate::new(1.5, 2.5).unwrap();
        let events = t.apply_sample(
            Sample::Location {
                device: "DEV".to_string(),
                position,
                signal: None,
            },
            10,
        );
        assert_eq!(types(&events), vec!["location"]);
        assert_eq!(t.state().child_location, Some(position));
        // Not connected yet, so not a trusted fix
        assert!(t.last_known_location().lat.is_none());

        t.apply_signal(-60, ADDRESS, 11);
        t.apply_sample(
            Sample::Location {
                device: "DEV".to_string(),
                position,
                signal: Some(-60),
            },
            12,
        );
        assert_eq!(t.last_known_location().position(), Some(position));
    }

    #[test]
    fn test_fall_report_passes_through() {
        let mut t = tracker();
        let before = t.snapshot();
        let events = t.apply_sample(
            Sample::Fall {
                device: "DEV".to_string(),
                severity: Severity::Low,
                meta: serde_json::json!({"g": 2.4}),
            },
            10,
        );
        assert_eq!(types(&events), vec!["fall"]);
        assert_eq!(t.snapshot(), before);
    }

    #[test]
    fn test_config_validation() {
        let mut config = TrackerConfig::default();
        config.thresholds = ZoneThresholds {
            very_close: -80.0,
            near: -75.0,
            far: -85.0,
        };
        assert!(matches!(
            Tracker::new(config),
            Err(GuardianError::Configuration(_))
        ));

        let mut config = TrackerConfig::default();
        config.smoothing_window = 0;
        assert!(Tracker::new(config).is_err());

        let mut config = TrackerConfig::default();
        config.fall_drop = 0.0;
        assert!(Tracker::new(config).is_err());
    }

    #[test]
    fn test_snapshot_serialization() {
        let mut t = tracker();
        t.apply_signal(-70, ADDRESS, 0);
        let value = serde_json::to_value(t.snapshot()).unwrap();
        assert_eq!(value["device"]["proximityZone"], "near");
        assert_eq!(value["device"]["zoneColor"], "yellow");
        assert_eq!(value["device"]["batteryPercent"], 85);
        assert!(value["lastKnownLocation"]["lat"].is_null());
    }

    #[test]
    fn test_pose_validation() {
        assert!(ObserverPose::new(100.0, 0.0, Some(0.0)).is_err());
        assert!(ObserverPose::new(0.0, 0.0, Some(f64::INFINITY)).is_err());
        let pose = ObserverPose::new(0.0, 0.0, Some(-90.0)).unwrap();
        assert_eq!(pose.heading, Some(270.0));
    }
}
