use serde::{Deserialize, Serialize};

use crate::models::Coordinates;

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const EARTH_RADIUS_MILES: f64 = 3959.0;

const METRES_PER_KM: f64 = 1000.0;
const FEET_PER_MILE: f64 = 5280.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceUnit {
    #[default]
    Kilometers,
    Miles,
}

impl DistanceUnit {
    fn earth_radius(&self) -> f64 {
        match self {
            DistanceUnit::Kilometers => EARTH_RADIUS_KM,
            DistanceUnit::Miles => EARTH_RADIUS_MILES,
        }
    }
}

/// Great-circle distance between two points using the haversine formula.
///
/// Latitude/longitude deltas are taken as absolute values so the result is
/// bit-for-bit symmetric in its arguments.
pub fn distance(from: Coordinates, to: Coordinates, unit: DistanceUnit) -> f64 {
    let delta_lat = (to.lat - from.lat).abs().to_radians();
    let delta_lng = (to.lng - from.lng).abs().to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + from.lat.to_radians().cos() * to.lat.to_radians().cos() * (delta_lng / 2.0).sin().powi(2);
    // Rounding can push `a` past 1.0 for near-antipodal points.
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    unit.earth_radius() * c
}

pub fn distance_km(from: Coordinates, to: Coordinates) -> f64 {
    distance(from, to, DistanceUnit::Kilometers)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Human readable distance: metres/feet below one unit, otherwise two decimals.
pub fn format_distance(distance: f64, unit: DistanceUnit) -> String {
    if !distance.is_finite() {
        return "Unknown distance".to_string();
    }

    match unit {
        DistanceUnit::Kilometers if distance < 1.0 => {
            format!("{}m", (distance * METRES_PER_KM).round())
        }
        DistanceUnit::Kilometers => format!("{}km", round_to(distance, 2)),
        DistanceUnit::Miles if distance < 1.0 => {
            format!("{}ft", (distance * FEET_PER_MILE).round())
        }
        DistanceUnit::Miles => format!("{} miles", round_to(distance, 2)),
    }
}
