//! Great-circle Geometry
//!
//! Spherical earth model, good to a few meters over the distances a BLE
//! beacon can be heard at.
//!
//! - [`project`]: destination point from a start, distance and bearing
//!   (direct problem)
//! - [`bearing`]: initial bearing from one point to another (inverse problem)
//! - [`Cardinal`]: eight-way compass sector for a bearing

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{GuardianError, Result};
use crate::round_to;

/// Mean earth radius in meters
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    /// Create a coordinate, rejecting values that are not a position on earth.
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(GuardianError::invalid_input(format!(
                "latitude must be within [-90, 90], got {}",
                lat
            )));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(GuardianError::invalid_input(format!(
                "longitude must be within [-180, 180], got {}",
                lng
            )));
        }
        Ok(Coordinate { lat, lng })
    }
}

/// Position reached by travelling `distance_meters` from `origin` along a
/// great circle with initial bearing `bearing_degrees`.
///
/// The result is rounded to 6 decimals (about 0.11 m). The caller must not
/// pass a negative distance; an unknown distance has to be filtered out
/// before projecting.
pub fn project(origin: Coordinate, distance_meters: f64, bearing_degrees: f64) -> Coordinate {
    let lat1 = origin.lat.to_radians();
    let lng1 = origin.lng.to_radians();
    let theta = bearing_degrees.to_radians();
    let delta = distance_meters / EARTH_RADIUS;

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
    let lng2 = lng1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    Coordinate {
        lat: round_to(lat2.to_degrees(), 6),
        lng: round_to(lng2.to_degrees(), 6),
    }
}

/// Initial bearing from `from` to `to` in degrees, within `[0, 360)`.
pub fn bearing(from: Coordinate, to: Coordinate) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let dlng = (to.lng - from.lng).to_radians();

    let x = dlng.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();

    let b = (x.atan2(y).to_degrees() + 360.0) % 360.0;
    // -0.0 and rounding right below 360 both belong to north
    if b >= 360.0 || b == 0.0 {
        0.0
    } else {
        b
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinal {
    North,
    Northeast,
    East,
    Southeast,
    South,
    Southwest,
    West,
    Northwest,
}

const EIGHT_DIRECTIONS: [Cardinal; 8] = [
    Cardinal::North,
    Cardinal::Northeast,
    Cardinal::East,
    Cardinal::Southeast,
    Cardinal::South,
    Cardinal::Southwest,
    Cardinal::West,
    Cardinal::Northwest,
];

impl Cardinal {
    /// Compass sector of a bearing. Each sector spans 45 degrees centered on
    /// its direction; a bearing exactly between two sectors belongs to the
    /// clockwise one.
    pub fn from_bearing(bearing_degrees: f64) -> Cardinal {
        let b = bearing_degrees.rem_euclid(360.0);
        let index = (b / 45.0).round() as usize % 8;
        EIGHT_DIRECTIONS[index]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinal::North => "north",
            Cardinal::Northeast => "northeast",
            Cardinal::East => "east",
            Cardinal::Southeast => "southeast",
            Cardinal::South => "south",
            Cardinal::Southwest => "southwest",
            Cardinal::West => "west",
            Cardinal::Northwest => "northwest",
        }
    }
}

impl fmt::Display for Cardinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
