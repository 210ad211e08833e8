//! Fall Detection
//!
//! A wearer falling tends to shield the beacon with their body, which shows up
//! as a sharp drop in received signal. Smoothing would hide that transient, so
//! the check runs on raw samples, against the history as it was *before* the
//! new sample is appended.

use crate::signal::SignalHistory;

/// Samples needed in the history before a drop can be judged
pub const FALL_WINDOW: usize = 3;

/// Default drop (dB) that counts as a fall
pub const DEFAULT_FALL_DROP: f64 = 15.0;

/// Returns true when `new_raw` is at least `drop_threshold` below the mean
/// of the last three raw samples in `history`.
///
/// With fewer than three samples there is nothing to compare with, and the
/// answer is false.
pub fn detect_fall(history: &SignalHistory, new_raw: i32, drop_threshold: f64) -> bool {
    if history.len() < FALL_WINDOW {
        return false;
    }
    let recent: i64 = history.values().rev().take(FALL_WINDOW).map(i64::from).sum();
    let recent_mean = recent as f64 / FALL_WINDOW as f64;

    recent_mean - new_raw as f64 >= drop_threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_of(values: &[i32], capacity: usize) -> SignalHistory {
        let mut history = SignalHistory::new(capacity);
        for (i, v) in values.iter().enumerate() {
            history.smooth(*v, i as u64);
        }
        history
    }

    #[test]
    fn test_insufficient_history() {
        let empty = SignalHistory::new(3);
        assert!(!detect_fall(&empty, -120, 15.0));

        let short = history_of(&[-40, -40], 3);
        assert!(!detect_fall(&short, -120, 15.0));
    }

    #[test]
    fn test_sudden_drop() {
        let history = history_of(&[-60, -60, -60], 3);
        assert!(detect_fall(&history, -80, 15.0));
    }

    #[test]
    fn test_drop_exactly_at_threshold() {
        let history = history_of(&[-60, -60, -60], 3);
        assert!(detect_fall(&history, -75, 15.0));
        assert!(!detect_fall(&history, -74, 15.0));
    }

    #[test]
    fn test_gradual_change_is_not_a_fall() {
        let history = history_of(&[-60, -65, -70], 3);
        assert!(!detect_fall(&history, -75, 15.0));
        // Signal getting stronger is never a fall
        assert!(!detect_fall(&history, -40, 15.0));
    }

    #[test]
    fn test_uses_last_three_of_longer_history() {
        // Old -40 readings fall outside the window
        let history = history_of(&[-40, -40, -70, -70, -70], 5);
        assert!(!detect_fall(&history, -80, 15.0));
        assert!(detect_fall(&history, -85, 15.0));
    }
}
