//! Running distance and speed totals for one trip.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::buffer::TrackBuffer;
use crate::geo::{distance_between, DistanceUnit};
use crate::reading::{GeoReading, TrackPoint};

/// Mutable state of the single trip a session tracks.
#[derive(Debug, Clone, Default)]
pub struct TripState {
    pub(crate) points: TrackBuffer,
    cumulative_distance: f64,
    speed_sum: f64,
    speed_sample_count: u32,
    last_accepted: Option<TrackPoint>,
    active: bool,
}

impl TripState {
    pub fn new(points: TrackBuffer) -> Self {
        TripState {
            points,
            ..Default::default()
        }
    }

    /// Clear totals and buffered points, keeping the buffer's threshold.
    pub fn reset(&mut self) {
        self.points.reset();
        self.cumulative_distance = 0.0;
        self.speed_sum = 0.0;
        self.speed_sample_count = 0;
        self.last_accepted = None;
        self.active = false;
    }

    pub fn points(&self) -> &TrackBuffer {
        &self.points
    }

    pub fn cumulative_distance(&self) -> f64 {
        self.cumulative_distance
    }

    pub fn speed_sum(&self) -> f64 {
        self.speed_sum
    }

    pub fn speed_sample_count(&self) -> u32 {
        self.speed_sample_count
    }

    pub fn last_accepted(&self) -> Option<&TrackPoint> {
        self.last_accepted.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Number of points accepted this trip, including flushed ones.
    pub fn accepted_count(&self) -> usize {
        self.points.total_pushed()
    }
}

/// Final distance/speed figures for a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripSummary {
    pub distance: f64,
    /// m/s
    pub average_speed: f64,
    pub unit: DistanceUnit,
    pub point_count: usize,
    pub speed_samples: u32,
}

impl fmt::Display for TripSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Distance traveled: {:.3} {}, average speed: {:.2} m/s ({:.1} {}) over {} points",
            self.distance,
            self.unit,
            self.average_speed,
            self.unit.speed_per_hour(self.average_speed),
            self.unit.speed_abbrev(),
            self.point_count,
        )
    }
}

/// Incremental distance/speed accumulator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator {
    unit: DistanceUnit,
}

impl Aggregator {
    pub fn new(unit: DistanceUnit) -> Self {
        Aggregator { unit }
    }

    /// Fold an accepted point into the running totals.
    ///
    /// Distance grows by the leg from the previous accepted point; it is never
    /// recomputed from the stored path, which may already have been flushed.
    pub fn accept(&self, state: &mut TripState, point: TrackPoint, reading: &GeoReading) {
        if let Some(previous) = state.last_accepted {
            state.cumulative_distance += distance_between(&previous, &point, self.unit);
        }

        if let Some(speed) = reading.speed {
            state.speed_sum += speed;
            state.speed_sample_count += 1;
        }

        state.last_accepted = Some(point);
    }

    pub fn summarize(&self, state: &TripState) -> TripSummary {
        TripSummary {
            distance: state.cumulative_distance,
            average_speed: state.speed_sum / state.speed_sample_count.max(1) as f64,
            unit: self.unit,
            point_count: state.accepted_count(),
            speed_samples: state.speed_sample_count,
        }
    }
}
