//! Proximity Zones
//!
//! Smoothed signal strength is bucketed into four zones, strongest first.
//! Each boundary is a strict lower bound: a signal equal to a boundary falls
//! into the next weaker zone.
//!
//! | Signal (dBm)  | Zone           | Color  |
//! |---------------|----------------|--------|
//! | > -65         | `very_close`   | green  |
//! | (-75, -65]    | `near`         | yellow |
//! | (-85, -75]    | `far`          | orange |
//! | <= -85        | `out_of_range` | red    |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{GuardianError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityZone {
    VeryClose,
    Near,
    Far,
    OutOfRange,
}

impl Default for ProximityZone {
    fn default() -> Self {
        ProximityZone::OutOfRange
    }
}

impl ProximityZone {
    pub fn color(&self) -> ZoneColor {
        match self {
            ProximityZone::VeryClose => ZoneColor::Green,
            ProximityZone::Near => ZoneColor::Yellow,
            ProximityZone::Far => ZoneColor::Orange,
            ProximityZone::OutOfRange => ZoneColor::Red,
        }
    }

    pub fn is_connected(&self) -> bool {
        *self != ProximityZone::OutOfRange
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProximityZone::VeryClose => "very_close",
            ProximityZone::Near => "near",
            ProximityZone::Far => "far",
            ProximityZone::OutOfRange => "out_of_range",
        }
    }
}

impl fmt::Display for ProximityZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity color shown next to a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneColor {
    Green,
    Yellow,
    Orange,
    Red,
}

impl Default for ZoneColor {
    fn default() -> Self {
        ZoneColor::Red
    }
}

impl ZoneColor {
    /// CSS color used by the web client
    pub fn hex(&self) -> &'static str {
        match self {
            ZoneColor::Green => "#00ff00",
            ZoneColor::Yellow => "#ffff00",
            ZoneColor::Orange => "#ff8800",
            ZoneColor::Red => "#ff0000",
        }
    }
}

/// Zone boundaries in dBm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneThresholds {
    pub very_close: f64,
    pub near: f64,
    pub far: f64,
}

impl Default for ZoneThresholds {
    fn default() -> Self {
        ZoneThresholds {
            very_close: -65.0,
            near: -75.0,
            far: -85.0,
        }
    }
}

impl ZoneThresholds {
    /// Build a threshold table, rejecting one that is not strictly
    /// decreasing from `very_close` to `far`.
    pub fn new(very_close: f64, near: f64, far: f64) -> Result<Self> {
        let thresholds = ZoneThresholds {
            very_close,
            near,
            far,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.very_close.is_finite() && self.near.is_finite() && self.far.is_finite()) {
            return Err(GuardianError::configuration(
                "proximity thresholds must be finite numbers",
            ));
        }
        if !(self.very_close > self.near && self.near > self.far) {
            return Err(GuardianError::configuration(format!(
                "proximity thresholds must be strictly decreasing: very_close {} > near {} > far {}",
                self.very_close, self.near, self.far
            )));
        }
        Ok(())
    }

    pub fn classify(&self, smoothed_signal: f64) -> ProximityZone {
        if smoothed_signal > self.very_close {
            ProximityZone::VeryClose
        } else if smoothed_signal > self.near {
            ProximityZone::Near
        } else if smoothed_signal > self.far {
            ProximityZone::Far
        } else {
            ProximityZone::OutOfRange
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_zones() {
        let t = ZoneThresholds::default();
        assert_eq!(t.classify(-50.0), ProximityZone::VeryClose);
        assert_eq!(t.classify(-70.0), ProximityZone::Near);
        assert_eq!(t.classify(-80.0), ProximityZone::Far);
        assert_eq!(t.classify(-95.0), ProximityZone::OutOfRange);
    }

    #[test]
    fn test_classify_boundaries() {
        let t = ZoneThresholds::default();
        assert_eq!(t.classify(-64.9), ProximityZone::VeryClose);
        assert_eq!(t.classify(-65.0), ProximityZone::Near);
        assert_eq!(t.classify(-75.0), ProximityZone::Far);
        assert_eq!(t.classify(-85.0), ProximityZone::OutOfRange);
        assert_eq!(t.classify(-84.9), ProximityZone::Far);
    }

    #[test]
    fn test_classify_is_total() {
        let t = ZoneThresholds::default();
        let mut previous = ProximityZone::OutOfRange;
        // Walking from weak to strong only ever moves to a closer zone
        for tenth in -1200..0 {
            let zone = t.classify(tenth as f64 / 10.0);
            assert!(zone as u8 <= previous as u8);
            previous = zone;
        }
        assert_eq!(t.classify(f64::NEG_INFINITY), ProximityZone::OutOfRange);
        assert_eq!(t.classify(0.0), ProximityZone::VeryClose);
    }

    #[test]
    fn test_colors() {
        assert_eq!(ProximityZone::VeryClose.color(), ZoneColor::Green);
        assert_eq!(ProximityZone::Near.color(), ZoneColor::Yellow);
        assert_eq!(ProximityZone::Far.color(), ZoneColor::Orange);
        assert_eq!(ProximityZone::OutOfRange.color(), ZoneColor::Red);
        assert_eq!(ZoneColor::Orange.hex(), "#ff8800");
    }

    #[test]
    fn test_connected_only_in_range() {
        assert!(ProximityZone::Far.is_connected());
        assert!(!ProximityZone::OutOfRange.is_connected());
    }

    #[test]
    fn test_thresholds_must_be_ordered() {
        assert!(ZoneThresholds::new(-60.0, -70.0, -90.0).is_ok());
        assert!(matches!(
            ZoneThresholds::new(-75.0, -65.0, -85.0),
            Err(GuardianError::Configuration(_))
        ));
        assert!(ZoneThresholds::new(-65.0, -65.0, -85.0).is_err());
        assert!(ZoneThresholds::new(f64::NAN, -75.0, -85.0).is_err());
    }

    #[test]
    fn test_zone_serialization() {
        assert_eq!(
            serde_json::to_value(ProximityZone::OutOfRange).unwrap(),
            "out_of_range"
        );
        assert_eq!(serde_json::to_value(ZoneColor::Yellow).unwrap(), "yellow");
    }
}
