// Trip tracker
// Follows a device's position over one trip, accumulates great-circle
// distance and average speed, and summarizes the trip when it stops.

pub mod aggregator;
pub mod buffer;
pub mod config;
pub mod delivery;
pub mod error;
pub mod geo;
pub mod ingest;
pub mod location;
pub mod output;
pub mod reading;
pub mod session;
pub mod storage;
pub mod store;
pub mod tracker;

pub use aggregator::{Aggregator, TripState, TripSummary};
pub use config::{DeliveryConfig, FlushConfig, TrackerConfig};
pub use error::{TrackerError, TrackerResult};
pub use geo::DistanceUnit;
pub use ingest::{AcceptancePolicy, Ingest, Rejection};
pub use location::{LocationProvider, PositionOptions};
pub use reading::{GeoReading, TrackPoint};
pub use session::{SessionState, StopOutcome, TripSession};
pub use storage::{OverflowFlusher, TripExport};
pub use tracker::{Progress, TripTracker};
