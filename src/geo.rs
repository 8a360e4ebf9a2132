//! Great-circle distance on a spherical Earth.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::reading::TrackPoint;

/// Mean Earth radius used by the Haversine approximation (km).
pub const EARTH_RADIUS_KM: f64 = 6371.0;

const KM_PER_MILE: f64 = 1.609_344;

/// Output unit for accumulated distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    #[default]
    Kilometers,
    Miles,
}

impl DistanceUnit {
    pub fn convert_km(self, km: f64) -> f64 {
        match self {
            DistanceUnit::Kilometers => km,
            DistanceUnit::Miles => km / KM_PER_MILE,
        }
    }

    /// Converts a m/s speed to this unit per hour (km/h or mph).
    pub fn speed_per_hour(self, meters_per_sec: f64) -> f64 {
        self.convert_km(meters_per_sec * 3.6)
    }

    pub fn abbrev(self) -> &'static str {
        match self {
            DistanceUnit::Kilometers => "km",
            DistanceUnit::Miles => "mi",
        }
    }

    pub fn speed_abbrev(self) -> &'static str {
        match self {
            DistanceUnit::Kilometers => "km/h",
            DistanceUnit::Miles => "mph",
        }
    }
}

impl fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbrev())
    }
}

impl std::str::FromStr for DistanceUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "km" | "kilometers" => Ok(DistanceUnit::Kilometers),
            "mi" | "miles" => Ok(DistanceUnit::Miles),
            other => Err(format!("unknown distance unit '{}'", other)),
        }
    }
}

/// Haversine distance in kilometers. Spherical approximation, error ≤0.5%.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    EARTH_RADIUS_KM * c
}

pub fn distance_between(from: &TrackPoint, to: &TrackPoint, unit: DistanceUnit) -> f64 {
    unit.convert_km(haversine_km(
        from.latitude,
        from.longitude,
        to.latitude,
        to.longitude,
    ))
}

/// Sum of consecutive leg distances over a whole path.
pub fn path_length(points: &[TrackPoint], unit: DistanceUnit) -> f64 {
    points
        .windows(2)
        .map(|leg| distance_between(&leg[0], &leg[1], unit))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ::geo::{point, HaversineDistance};

    #[test]
    fn test_zero_distance() {
        assert_eq!(haversine_km(37.0, -122.0, 37.0, -122.0), 0.0);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        // 2*pi*R/360
        assert_relative_eq!(haversine_km(0.0, 0.0, 1.0, 0.0), 111.194_926_6, epsilon = 1e-6);
    }

    #[test]
    fn test_symmetry() {
        let a = haversine_km(37.7749, -122.4194, 34.0522, -118.2437);
        let b = haversine_km(34.0522, -118.2437, 37.7749, -122.4194);
        assert_relative_eq!(a, b, epsilon = 1e-9);
        assert!((a - 559.1).abs() < 1.0, "SF-LA was {a}");
    }

    #[test]
    fn test_matches_geo_crate() {
        let sf = point!(x: -122.4194, y: 37.7749);
        let la = point!(x: -118.2437, y: 34.0522);
        let reference_km = sf.haversine_distance(&la) / 1000.0;
        let ours = haversine_km(37.7749, -122.4194, 34.0522, -118.2437);
        // geo uses the 6371.0088 km mean radius
        assert_relative_eq!(ours, reference_km, max_relative = 1e-5);
    }

    #[test]
    fn test_miles_conversion() {
        assert_relative_eq!(DistanceUnit::Miles.convert_km(1.609_344), 1.0, epsilon = 1e-12);
        assert_relative_eq!(DistanceUnit::Kilometers.speed_per_hour(10.0), 36.0);
    }

    #[test]
    fn test_path_length_sums_legs() {
        let points = [
            TrackPoint::new(0.0, 0.0),
            TrackPoint::new(1.0, 0.0),
            TrackPoint::new(2.0, 0.0),
        ];
        assert_relative_eq!(
            path_length(&points, DistanceUnit::Kilometers),
            2.0 * haversine_km(0.0, 0.0, 1.0, 0.0),
            epsilon = 1e-9
        );
        assert_eq!(path_length(&points[..1], DistanceUnit::Kilometers), 0.0);
    }

    #[test]
    fn test_unit_parse() {
        assert_eq!("MI".parse::<DistanceUnit>().unwrap(), DistanceUnit::Miles);
        assert!("furlongs".parse::<DistanceUnit>().is_err());
    }
}
