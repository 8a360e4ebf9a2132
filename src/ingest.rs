//! Reading acceptance: the filter chain a raw fix must pass before it
//! becomes part of the trip.

use std::fmt;

use crate::error::TrackerError;
use crate::reading::{GeoReading, TrackPoint};

/// Why a reading was kept out of the trip.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// Same latitude and longitude as the last accepted point
    Duplicate,
    AccuracyInsufficient { accuracy: f64, threshold: f64 },
}

impl Rejection {
    pub fn to_error(&self) -> Option<TrackerError> {
        match *self {
            Rejection::Duplicate => None,
            Rejection::AccuracyInsufficient {
                accuracy,
                threshold,
            } => Some(TrackerError::AccuracyInsufficient {
                accuracy,
                threshold,
            }),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Duplicate => f.write_str("duplicate position"),
            Rejection::AccuracyInsufficient {
                accuracy,
                threshold,
            } => write!(f, "accuracy {:.1}m worse than {:.1}m", accuracy, threshold),
        }
    }
}

/// Result of handing one reading to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    Accepted(TrackPoint),
    Rejected(Rejection),
    /// Session was not active; the reading was dropped unseen.
    Ignored,
}

/// One predicate in the acceptance chain.
pub trait ReadingFilter: Send {
    fn name(&self) -> &'static str;

    fn check(&self, reading: &GeoReading, last: Option<&TrackPoint>) -> Result<(), Rejection>;
}

/// Rejects a reading at exactly the last accepted position.
///
/// Comparison is exact float equality; GPS noise means it rarely fires on a
/// moving device, it mostly catches providers that re-report a cached fix.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateFilter;

impl ReadingFilter for DuplicateFilter {
    fn name(&self) -> &'static str {
        "duplicate"
    }

    fn check(&self, reading: &GeoReading, last: Option<&TrackPoint>) -> Result<(), Rejection> {
        match last {
            Some(point) if point.same_position(reading.latitude, reading.longitude) => {
                Err(Rejection::Duplicate)
            }
            _ => Ok(()),
        }
    }
}

/// Rejects readings whose accuracy radius is larger than `threshold` meters.
#[derive(Debug, Clone, Copy)]
pub struct AccuracyFilter {
    threshold: f64,
}

impl AccuracyFilter {
    pub fn new(threshold: f64) -> Self {
        AccuracyFilter { threshold }
    }
}

impl ReadingFilter for AccuracyFilter {
    fn name(&self) -> &'static str {
        "accuracy"
    }

    fn check(&self, reading: &GeoReading, _last: Option<&TrackPoint>) -> Result<(), Rejection> {
        if reading.accuracy > self.threshold {
            return Err(Rejection::AccuracyInsufficient {
                accuracy: reading.accuracy,
                threshold: self.threshold,
            });
        }
        Ok(())
    }
}

/// Ordered filter chain; the first rejection wins.
#[derive(Default)]
pub struct AcceptancePolicy {
    filters: Vec<Box<dyn ReadingFilter>>,
}

impl AcceptancePolicy {
    /// Empty chain, accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Duplicate suppression, plus accuracy filtering when a threshold is set.
    pub fn standard(accuracy_threshold: Option<f64>) -> Self {
        let policy = AcceptancePolicy::new().with(DuplicateFilter);
        match accuracy_threshold {
            Some(threshold) => policy.with(AccuracyFilter::new(threshold)),
            None => policy,
        }
    }

    pub fn with<F: ReadingFilter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn filter_names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn evaluate(
        &self,
        reading: &GeoReading,
        last: Option<&TrackPoint>,
    ) -> Result<TrackPoint, Rejection> {
        for filter in &self.filters {
            filter.check(reading, last)?;
        }
        Ok(reading.point())
    }
}

impl fmt::Debug for AcceptancePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcceptancePolicy")
            .field("filters", &self.filter_names())
            .finish()
    }
}
