use serde::{Deserialize, Serialize};

use crate::models::location::Location;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Fixed per-order distance used when exact geodesic distances are disabled.
pub const PLACEHOLDER_DISTANCE_KM: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMode {
    Haversine,
    Placeholder,
}

impl std::str::FromStr for DistanceMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "haversine" => Ok(DistanceMode::Haversine),
            "placeholder" => Ok(DistanceMode::Placeholder),
            other => Err(format!(
                "unknown distance mode {other}, expected haversine/placeholder"
            )),
        }
    }
}

impl DistanceMode {
    pub fn distance_km(self, from: &Location, to: &Location) -> f64 {
        match self {
            DistanceMode::Haversine => {
                haversine_km(from.latitude, from.longitude, to.latitude, to.longitude)
            }
            DistanceMode::Placeholder => PLACEHOLDER_DISTANCE_KM,
        }
    }
}

pub fn haversine_km(lat_a: f64, lng_a: f64, lat_b: f64, lng_b: f64) -> f64 {
    let lat1 = lat_a.to_radians();
    let lat2 = lat_b.to_radians();
    let delta_lat = (lat_b - lat_a).to_radians();
    let delta_lng = (lng_b - lng_a).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}
