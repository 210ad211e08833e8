//! Signal Strength Processing
//!
//! Raw RSSI readings from the scanner are noisy. The [`SignalHistory`] keeps
//! the last few raw samples and yields their mean, which is what distance
//! estimation and zone classification run on. Fall detection reads the same
//! history but works on the raw values, see [`crate::fall`].

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

mod distance;

pub use distance::{
    estimate_distance, Calibration, DEFAULT_PATH_LOSS_EXPONENT, DEFAULT_REFERENCE_SIGNAL,
    UNKNOWN_DISTANCE,
};

/// Number of samples averaged by default.
pub const DEFAULT_WINDOW: usize = 3;

/// One raw reading as delivered by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalSample {
    /// Signal strength in dBm
    pub value: i32,
    /// Milliseconds since the Unix epoch
    pub observed_at: u64,
}

/// Ring buffer of the most recent raw samples.
///
/// Never holds more than `capacity` samples; the oldest is evicted first.
#[derive(Debug, Clone)]
pub struct SignalHistory {
    samples: VecDeque<SignalSample>,
    capacity: usize,
}

impl Default for SignalHistory {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl SignalHistory {
    /// Create an empty history. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        SignalHistory {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Append a sample, evicting the oldest one when full.
    pub fn push(&mut self, sample: SignalSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Append `raw` and return the mean of everything now held.
    ///
    /// The append happens first, so the mean is always over at least one
    /// sample.
    pub fn smooth(&mut self, raw: i32, observed_at: u64) -> f64 {
        self.push(SignalSample {
            value: raw,
            observed_at,
        });
        let sum: i64 = self.samples.iter().map(|s| s.value as i64).sum();
        sum as f64 / self.samples.len() as f64
    }

    /// Raw values, oldest first.
    pub fn values(&self) -> impl DoubleEndedIterator<Item = i32> + ExactSizeIterator + '_ {
        self.samples.iter().map(|s| s.value)
    }

    pub fn latest(&self) -> Option<&SignalSample> {
        self.samples.back()
    }
}
