use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregator::{Aggregator, TripState};
use crate::buffer::TrackBuffer;
use crate::config::TrackerConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::geo::DistanceUnit;
use crate::ingest::{AcceptancePolicy, Ingest};
use crate::output::OutputSink;
use crate::reading::GeoReading;
use crate::storage::{OverflowFlusher, TripExport};
use crate::store::{KeyValueStore, MemoryStore};

/// Shown when a trip ends without a single accepted point.
pub const NO_DATA_MESSAGE: &str = "The app was unable to collect GPS position coordinates.";

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No trip in progress
    Idle,
    /// Accepting readings
    Active,
}

/// What `stop()` produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    Completed(TripExport),
    /// Trip ended with zero accepted points; no summary was computed.
    NoDataCollected,
    /// Location capability missing, nothing was ever started.
    Unavailable,
    /// There was no active trip to stop.
    NotActive,
}

/// One tracking session: owns the trip state and runs every reading through
/// acceptance, aggregation and (optionally) overflow flushing.
pub struct TripSession {
    capability_available: bool,
    policy: AcceptancePolicy,
    aggregator: Aggregator,
    trip: TripState,
    flusher: Option<OverflowFlusher>,
    output: Box<dyn OutputSink>,
    session_id: String,
    started_at: Option<DateTime<Utc>>,
}

impl TripSession {
    /// Session without overflow flushing; all points stay in memory.
    pub fn new(
        capability_available: bool,
        policy: AcceptancePolicy,
        unit: DistanceUnit,
        output: Box<dyn OutputSink>,
    ) -> Self {
        if !capability_available {
            log::error!("Location capability unavailable, tracking disabled");
        }

        TripSession {
            capability_available,
            policy,
            aggregator: Aggregator::new(unit),
            trip: TripState::new(TrackBuffer::unbounded()),
            flusher: None,
            output,
            session_id: String::new(),
            started_at: None,
        }
    }

    /// Flush buffered points through `flusher` every `write_threshold` points.
    pub fn with_flusher(mut self, flusher: OverflowFlusher, write_threshold: usize) -> Self {
        self.trip = TripState::new(TrackBuffer::bounded(write_threshold));
        if let Some(bound) = self.trip.points().threshold() {
            log::info!("Flushing to '{}' every {} points", flusher.key(), bound);
        }
        self.flusher = Some(flusher);
        self
    }

    /// Build from a validated config. With flushing enabled and no store
    /// given, points are flushed into an in-process `MemoryStore`.
    pub fn from_config(
        config: &TrackerConfig,
        capability_available: bool,
        store: Option<Box<dyn KeyValueStore>>,
        output: Box<dyn OutputSink>,
    ) -> TrackerResult<Self> {
        config.validate()?;

        let session = TripSession::new(
            capability_available,
            AcceptancePolicy::standard(config.accuracy_threshold_m),
            config.unit,
            output,
        );

        match &config.flush {
            Some(flush) => {
                let store: Box<dyn KeyValueStore> = match store {
                    Some(store) => store,
                    None => Box::new(MemoryStore::new()),
                };
                let flusher = OverflowFlusher::new(store, flush.storage_key.clone());
                Ok(session.with_flusher(flusher, flush.write_threshold))
            }
            None => Ok(session),
        }
    }

    pub fn state(&self) -> SessionState {
        if self.trip.is_active() {
            SessionState::Active
        } else {
            SessionState::Idle
        }
    }

    pub fn trip(&self) -> &TripState {
        &self.trip
    }

    pub fn flusher(&self) -> Option<&OverflowFlusher> {
        self.flusher.as_ref()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Idle → Active. Without a location capability this only reports the
    /// problem on the output surface; the returned error is informational.
    pub fn start(&mut self) -> TrackerResult<()> {
        if !self.capability_available {
            let err = TrackerError::CapabilityUnavailable;
            self.output.line(&err.user_message());
            return Err(err);
        }

        if self.trip.is_active() {
            log::warn!("Trip {} already active, start ignored", self.session_id);
            return Ok(());
        }

        self.trip.reset();
        if let Some(flusher) = self.flusher.as_mut() {
            flusher.reset();
        }
        self.output.clear();

        let now = Utc::now();
        self.session_id = format!("trip_{}", now.timestamp_millis());
        self.started_at = Some(now);
        self.trip.set_active(true);

        log::info!("Trip {} started", self.session_id);
        Ok(())
    }

    /// Run one reading through the ingest pipeline.
    pub fn on_reading(&mut self, reading: &GeoReading) -> Ingest {
        if !self.trip.is_active() {
            log::debug!(
                "Ignoring reading at {} delivered while idle",
                reading.timestamp
            );
            return Ingest::Ignored;
        }

        let point = match self.policy.evaluate(reading, self.trip.last_accepted()) {
            Ok(point) => point,
            Err(rejection) => {
                match rejection.to_error() {
                    Some(reason) => log::debug!("Rejected reading: {}", reason),
                    None => log::trace!("Duplicate position {}", reading.point()),
                }
                return Ingest::Rejected(rejection);
            }
        };

        self.aggregator.accept(&mut self.trip, point, reading);

        let flusher = &mut self.flusher;
        self.trip.points.push(point, |batch| {
            if let Some(flusher) = flusher.as_mut() {
                flusher.flush(batch);
            }
        });

        log::info!("Accepted reading\n{}", reading.describe());
        self.output.line(&point.to_string());
        Ingest::Accepted(point)
    }

    /// A single acquisition failed; the trip carries on.
    pub fn on_error(&mut self, error: &TrackerError) {
        if !self.trip.is_active() {
            return;
        }
        log::warn!("Location acquisition failed: {}", error);
        self.output.line(&error.user_message());
    }

    /// Active → Idle, producing the trip summary.
    pub fn stop(&mut self) -> StopOutcome {
        if !self.capability_available {
            return StopOutcome::Unavailable;
        }
        if !self.trip.is_active() {
            return StopOutcome::NotActive;
        }

        self.trip.set_active(false);
        let stopped_at = Utc::now();

        if self.trip.accepted_count() == 0 {
            log::info!("Trip {} stopped with no data", self.session_id);
            self.output.line(NO_DATA_MESSAGE);
            return StopOutcome::NoDataCollected;
        }

        let remaining = self.trip.points().as_slice();
        let path = match self.flusher.as_mut() {
            Some(flusher) => flusher.finish(remaining),
            None => remaining.to_vec(),
        };

        let summary = self.aggregator.summarize(&self.trip);
        log::info!("Trip {} stopped: {}", self.session_id, summary);
        self.output.line(&summary.to_string());

        StopOutcome::Completed(TripExport {
            session_id: self.session_id.clone(),
            started_at: self
                .started_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            stopped_at: stopped_at.to_rfc3339(),
            summary,
            path,
        })
    }
}
