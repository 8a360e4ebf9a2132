//! Async driver: binds a session to a delivery model and a provider.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::TrackerConfig;
use crate::delivery::{DeliveryHandle, DeliveryModel, LocationEvent, EVENT_CHANNEL_CAPACITY};
use crate::error::{TrackerError, TrackerResult};
use crate::ingest::Ingest;
use crate::location::{LocationProvider, PositionOptions};
use crate::output::OutputSink;
use crate::session::{StopOutcome, TripSession};
use crate::store::KeyValueStore;

/// What happened when the tracker processed one delivered event.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    Ingested(Ingest),
    AcquisitionFailed(TrackerError),
}

struct Feed {
    rx: mpsc::Receiver<LocationEvent>,
    handle: DeliveryHandle,
}

pub struct TripTracker {
    session: TripSession,
    provider: Arc<dyn LocationProvider>,
    delivery: Box<dyn DeliveryModel>,
    options: PositionOptions,
    feed: Option<Feed>,
}

impl TripTracker {
    pub fn new(
        session: TripSession,
        provider: Arc<dyn LocationProvider>,
        delivery: Box<dyn DeliveryModel>,
        options: PositionOptions,
    ) -> Self {
        TripTracker {
            session,
            provider,
            delivery,
            options,
            feed: None,
        }
    }

    pub fn from_config(
        config: &TrackerConfig,
        provider: Arc<dyn LocationProvider>,
        store: Option<Box<dyn KeyValueStore>>,
        output: Box<dyn OutputSink>,
    ) -> TrackerResult<Self> {
        let session = TripSession::from_config(config, provider.is_available(), store, output)?;
        Ok(TripTracker::new(
            session,
            provider,
            config.delivery.build(),
            config.position.clone(),
        ))
    }

    pub fn session(&self) -> &TripSession {
        &self.session
    }

    pub fn delivery_name(&self) -> &'static str {
        self.delivery.name()
    }

    /// True while a delivery feed is attached.
    pub fn is_running(&self) -> bool {
        self.feed.is_some()
    }

    /// Start a trip and its delivery feed. Needs a tokio runtime.
    pub fn start(&mut self) -> TrackerResult<()> {
        self.session.start()?;
        self.detach_feed();

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let handle = self
            .delivery
            .start(Arc::clone(&self.provider), self.options.clone(), tx);
        self.feed = Some(Feed { rx, handle });
        Ok(())
    }

    /// Wait for the next delivered event and apply it to the session.
    /// `None` once the feed has ended or when nothing is running; an ended
    /// feed is detached, so `is_running` turns false.
    pub async fn next(&mut self) -> Option<Progress> {
        let feed = self.feed.as_mut()?;
        let Some(event) = feed.rx.recv().await else {
            log::info!("{} delivery feed ended", self.delivery.name());
            self.feed = None;
            return None;
        };

        Some(match event {
            LocationEvent::Reading(reading) => {
                Progress::Ingested(self.session.on_reading(&reading))
            }
            LocationEvent::Failed(error) => {
                self.session.on_error(&error);
                Progress::AcquisitionFailed(error)
            }
        })
    }

    /// Process events until the feed ends on its own. Returns how many were handled.
    pub async fn run_to_end(&mut self) -> usize {
        let mut handled = 0;
        while self.next().await.is_some() {
            handled += 1;
        }
        handled
    }

    /// Cancel delivery, then finalize the trip. Anything still queued or in
    /// flight is dropped with the feed.
    pub fn stop(&mut self) -> StopOutcome {
        self.detach_feed();
        self.session.stop()
    }

    fn detach_feed(&mut self) {
        if let Some(feed) = self.feed.take() {
            feed.handle.cancel();
            log::info!("{} delivery cancelled", self.delivery.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeliveryConfig;
    use crate::location::{ReplayProvider, SimulatedProvider};
    use crate::output::TranscriptSink;
    use crate::reading::GeoReading;
    use std::time::Duration;
    use tokio::time::timeout;

    struct NoGps;

    impl LocationProvider for NoGps {
        fn is_available(&self) -> bool {
            false
        }

        fn get_once(&self, _: &PositionOptions) -> TrackerResult<GeoReading> {
            Err(TrackerError::CapabilityUnavailable)
        }
    }

    fn scenario() -> Arc<dyn LocationProvider> {
        Arc::new(ReplayProvider::from_readings(vec![
            GeoReading::new(37.0, -122.0, 10.0, 1).with_speed(1.0),
            GeoReading::new(37.001, -122.001, 10.0, 2).with_speed(3.0),
            GeoReading::new(37.002, -122.002, 500.0, 3).with_speed(50.0),
        ]))
    }

    #[tokio::test]
    async fn test_continuous_trip_end_to_end() {
        let config = TrackerConfig {
            delivery: DeliveryConfig::Continuous,
            ..Default::default()
        };
        let mut tracker =
            TripTracker::from_config(&config, scenario(), None, Box::new(TranscriptSink::new()))
                .unwrap();

        tracker.start().unwrap();
        assert!(tracker.is_running());
        assert_eq!(tracker.delivery_name(), "continuous");

        let handled = timeout(Duration::from_secs(5), tracker.run_to_end())
            .await
            .unwrap();
        assert_eq!(handled, 3);
        assert!(!tracker.is_running());

        match tracker.stop() {
            StopOutcome::Completed(trip) => {
                assert_eq!(trip.path.len(), 2);
                assert_eq!(trip.summary.speed_samples, 2);
                assert!((trip.summary.average_speed - 2.0).abs() < 1e-12);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(!tracker.is_running());
    }

    #[tokio::test]
    async fn test_polled_trip_with_failures() {
        let config = TrackerConfig {
            delivery: DeliveryConfig::Polled { interval_ms: 5 },
            ..Default::default()
        };
        let provider: Arc<dyn LocationProvider> = Arc::new(ReplayProvider::new(vec![
            Ok(GeoReading::new(1.0, 1.0, 5.0, 1)),
            Err(TrackerError::AcquisitionFailed("timeout".into())),
            Ok(GeoReading::new(1.001, 1.0, 5.0, 3)),
        ]));
        let transcript = TranscriptSink::new();
        let mut tracker =
            TripTracker::from_config(&config, provider, None, Box::new(transcript.clone()))
                .unwrap();

        tracker.start().unwrap();
        let mut progress = Vec::new();
        while let Ok(Some(p)) = timeout(Duration::from_secs(5), tracker.next()).await {
            progress.push(p);
        }

        assert_eq!(progress.len(), 3);
        assert!(matches!(progress[1], Progress::AcquisitionFailed(_)));
        assert!(transcript.contains("Geolocation service failed"));
        assert!(matches!(tracker.stop(), StopOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn test_zero_poll_interval_rejected_before_start() {
        let config = TrackerConfig {
            delivery: DeliveryConfig::Polled { interval_ms: 0 },
            ..Default::default()
        };
        let built =
            TripTracker::from_config(&config, scenario(), None, Box::new(TranscriptSink::new()));
        assert!(matches!(built, Err(TrackerError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn test_stop_drops_late_readings() {
        let provider: Arc<dyn LocationProvider> =
            Arc::new(SimulatedProvider::new(37.0, -122.0).with_cadence(Duration::from_millis(1)));
        let config = TrackerConfig {
            delivery: DeliveryConfig::Continuous,
            ..Default::default()
        };
        let mut tracker =
            TripTracker::from_config(&config, provider, None, Box::new(TranscriptSink::new()))
                .unwrap();

        tracker.start().unwrap();
        for _ in 0..3 {
            timeout(Duration::from_secs(5), tracker.next())
                .await
                .unwrap()
                .unwrap();
        }
        let accepted = tracker.session().trip().accepted_count();

        assert!(matches!(tracker.stop(), StopOutcome::Completed(_)));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(tracker.next().await.is_none());
        assert_eq!(tracker.session().trip().accepted_count(), accepted);
    }

    #[tokio::test]
    async fn test_start_then_immediate_stop() {
        let config = TrackerConfig::default();
        let mut tracker =
            TripTracker::from_config(&config, scenario(), None, Box::new(TranscriptSink::new()))
                .unwrap();
        tracker.start().unwrap();
        assert_eq!(tracker.stop(), StopOutcome::NoDataCollected);
    }

    #[tokio::test]
    async fn test_unavailable_capability_never_starts_delivery() {
        let transcript = TranscriptSink::new();
        let mut tracker = TripTracker::from_config(
            &TrackerConfig::default(),
            Arc::new(NoGps),
            None,
            Box::new(transcript.clone()),
        )
        .unwrap();

        assert_eq!(tracker.start(), Err(TrackerError::CapabilityUnavailable));
        assert!(!tracker.is_running());
        assert!(tracker.next().await.is_none());
        assert_eq!(tracker.stop(), StopOutcome::Unavailable);
        assert!(transcript.contains("doesn't support geolocation"));
    }
}
