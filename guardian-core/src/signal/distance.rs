//! Log-distance path-loss model
//!
//! `distance = 10 ^ ((reference - signal) / (10 * n))`
//!
//! where `reference` is the signal expected at one meter and `n` the
//! environment dependent path-loss exponent (2 in free space, 3-4 indoors).

use serde::{Deserialize, Serialize};

use crate::error::{GuardianError, Result};
use crate::round_to;

/// Returned when there is no reading to estimate from.
/// Negative distances mean "unavailable", never a physical distance.
pub const UNKNOWN_DISTANCE: f64 = -1.0;

/// Signal at one meter, measured against an ESP32 beacon
pub const DEFAULT_REFERENCE_SIGNAL: f64 = -60.0;

/// Indoor value
pub const DEFAULT_PATH_LOSS_EXPONENT: f64 = 3.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calibration {
    /// Expected signal strength (dBm) at one meter
    pub reference_signal: f64,
    pub path_loss_exponent: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Calibration {
            reference_signal: DEFAULT_REFERENCE_SIGNAL,
            path_loss_exponent: DEFAULT_PATH_LOSS_EXPONENT,
        }
    }
}

impl Calibration {
    pub fn new(reference_signal: f64, path_loss_exponent: f64) -> Result<Self> {
        let calibration = Calibration {
            reference_signal,
            path_loss_exponent,
        };
        calibration.validate()?;
        Ok(calibration)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.reference_signal.is_finite() {
            return Err(GuardianError::configuration(format!(
                "reference signal must be finite, got {}",
                self.reference_signal
            )));
        }
        if !self.path_loss_exponent.is_finite() || self.path_loss_exponent <= 0.0 {
            return Err(GuardianError::configuration(format!(
                "path loss exponent must be positive, got {}",
                self.path_loss_exponent
            )));
        }
        Ok(())
    }

    /// Distance in meters for `signal`, rounded to centimeters.
    pub fn estimate_distance(&self, signal: f64) -> f64 {
        estimate_distance(signal, self)
    }

    /// Solve the model for the reference signal given a reading taken at a
    /// known distance, and adopt it. Returns the new reference signal.
    pub fn recalibrate(&mut self, signal: f64, actual_distance_meters: f64) -> Result<f64> {
        if !signal.is_finite() {
            return Err(GuardianError::invalid_input(format!(
                "signal must be a finite number, got {}",
                signal
            )));
        }
        if !actual_distance_meters.is_finite() || actual_distance_meters <= 0.0 {
            return Err(GuardianError::invalid_input(format!(
                "actual distance must be greater than 0, got {}",
                actual_distance_meters
            )));
        }
        self.reference_signal =
            signal - 10.0 * self.path_loss_exponent * actual_distance_meters.log10();
        Ok(self.reference_signal)
    }
}

/// Estimate the distance in meters for a (smoothed) signal strength.
///
/// A signal of exactly 0 means "no reading" and yields [`UNKNOWN_DISTANCE`].
pub fn estimate_distance(signal: f64, calibration: &Calibration) -> f64 {
    if signal == 0.0 {
        return UNKNOWN_DISTANCE;
    }
    let ratio = (calibration.reference_signal - signal) / (10.0 * calibration.path_loss_exponent);
    round_to(10f64.powf(ratio), 2)
}
