use serde::{Deserialize, Serialize};
use std::fmt;

/// One raw fix from the location capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoReading {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius, meters
    pub accuracy: f64,
    /// Ground speed in m/s, `None` when the provider doesn't know it
    #[serde(default)]
    pub speed: Option<f64>,
    /// Epoch seconds
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude_accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
}

impl GeoReading {
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
            speed: None,
            timestamp,
            altitude: None,
            altitude_accuracy: None,
            heading: None,
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_altitude(mut self, altitude: f64, altitude_accuracy: Option<f64>) -> Self {
        self.altitude = Some(altitude);
        self.altitude_accuracy = altitude_accuracy;
        self
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    pub fn point(&self) -> TrackPoint {
        TrackPoint::new(self.latitude, self.longitude)
    }

    /// Multi-line dump used for the per-reading log entry.
    pub fn describe(&self) -> String {
        format!(
            "Latitude={}\nLongitude={}\nAccuracy={}m\nSpeed={}m/s\nAltitude={}\nAltitude Accuracy={}\nHeading={}\nTimestamp={}",
            self.latitude,
            self.longitude,
            self.accuracy.round(),
            display_opt(self.speed),
            display_opt(self.altitude),
            display_opt(self.altitude_accuracy.map(f64::round)),
            display_opt(self.heading),
            self.timestamp,
        )
    }
}

fn display_opt(value: Option<f64>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "null".to_string())
}

/// Retained lat/lng projection of an accepted reading.
///
/// Serializes as `{"lat": .., "lng": ..}`, the persisted blob record format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
}

impl TrackPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Exact coordinate equality, used for duplicate suppression.
    pub fn same_position(&self, latitude: f64, longitude: f64) -> bool {
        self.latitude == latitude && self.longitude == longitude
    }
}

impl fmt::Display for TrackPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Latitude={}, Longitude={}", self.latitude, self.longitude)
    }
}
