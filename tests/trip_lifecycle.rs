use approx::assert_relative_eq;

use trip_tracker::geo::{haversine_km, path_length};
use trip_tracker::output::TranscriptSink;
use trip_tracker::session::NO_DATA_MESSAGE;
use trip_tracker::store::{FileStore, KeyValueStore};
use trip_tracker::{
    DistanceUnit, FlushConfig, GeoReading, Ingest, StopOutcome, TrackPoint, TrackerConfig,
    TripSession,
};

fn session(
    config: &TrackerConfig,
    store: Option<Box<dyn KeyValueStore>>,
) -> (TripSession, TranscriptSink) {
    let transcript = TranscriptSink::new();
    let session =
        TripSession::from_config(config, true, store, Box::new(transcript.clone())).unwrap();
    (session, transcript)
}

#[test]
fn inaccurate_reading_is_dropped_from_trip() {
    let config = TrackerConfig {
        accuracy_threshold_m: Some(150.0),
        unit: DistanceUnit::Miles,
        ..Default::default()
    };
    let (mut session, _) = session(&config, None);
    session.start().unwrap();

    session.on_reading(&GeoReading::new(37.0, -122.0, 10.0, 1));
    session.on_reading(&GeoReading::new(37.001, -122.001, 10.0, 6));
    let third = session.on_reading(&GeoReading::new(37.002, -122.002, 500.0, 11));
    assert!(matches!(third, Ingest::Rejected(_)));

    let StopOutcome::Completed(trip) = session.stop() else {
        panic!("trip should complete");
    };
    assert_eq!(trip.path.len(), 2);
    assert_relative_eq!(
        trip.summary.distance,
        haversine_km(37.0, -122.0, 37.001, -122.001) / 1.609_344,
        max_relative = 1e-12
    );
    assert_eq!(trip.summary.average_speed, 0.0);
}

#[test]
fn immediate_stop_reports_no_data() {
    let (mut session, transcript) = session(&TrackerConfig::default(), None);
    session.start().unwrap();

    assert_eq!(session.stop(), StopOutcome::NoDataCollected);
    assert_eq!(transcript.latest().as_deref(), Some(NO_DATA_MESSAGE));
}

#[test]
fn file_store_first_write_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let config = TrackerConfig {
        accuracy_threshold_m: None,
        flush: Some(FlushConfig {
            write_threshold: 3,
            storage_key: "trip".to_string(),
        }),
        ..Default::default()
    };
    let (mut session, _) = session(&config, Some(Box::new(store.clone())));
    session.start().unwrap();

    let readings: Vec<GeoReading> = (0..8)
        .map(|i| GeoReading::new(-33.86 + i as f64 * 0.0002, 151.2, 8.0, i))
        .collect();
    for r in &readings {
        session.on_reading(r);
    }

    // two flushes of three points so far
    let on_disk = store.get("trip").unwrap().unwrap();
    let persisted: Vec<TrackPoint> = serde_json::from_str(&on_disk).unwrap();
    assert_eq!(persisted.len(), 6);

    let StopOutcome::Completed(trip) = session.stop() else {
        panic!("trip should complete");
    };
    let expected: Vec<TrackPoint> = readings.iter().map(GeoReading::point).collect();
    assert_eq!(trip.path, expected);
    assert_relative_eq!(
        trip.summary.distance,
        path_length(&expected, DistanceUnit::Kilometers),
        max_relative = 1e-12
    );

    let reloaded: Vec<TrackPoint> =
        serde_json::from_str(&store.get("trip").unwrap().unwrap()).unwrap();
    assert_eq!(reloaded, expected);
}

#[test]
fn new_trip_clears_stored_points() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let config = TrackerConfig {
        flush: Some(FlushConfig {
            write_threshold: 1,
            ..Default::default()
        }),
        ..Default::default()
    };
    let (mut session, _) = session(&config, Some(Box::new(store.clone())));

    session.start().unwrap();
    session.on_reading(&GeoReading::new(1.0, 1.0, 1.0, 0));
    session.stop();

    session.start().unwrap();
    let key = session.flusher().unwrap().key().to_string();
    assert_eq!(store.get(&key).unwrap().as_deref(), Some("[]"));
}
