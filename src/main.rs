use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use trip_tracker::config::{DeliveryConfig, FlushConfig, TrackerConfig, DEFAULT_POLL_INTERVAL_MS};
use trip_tracker::location::{LocationProvider, ReplayProvider, SimulatedProvider, TermuxProvider};
use trip_tracker::output::ConsoleSink;
use trip_tracker::store::{FileStore, KeyValueStore};
use trip_tracker::{DistanceUnit, StopOutcome, TripTracker};

#[derive(Parser, Debug)]
#[command(name = "trip-tracker")]
#[command(about = "Track one trip and report distance and average speed", long_about = None)]
struct Args {
    /// Duration in seconds (0 = until the feed ends or Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// JSON config file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Location source
    #[arg(long, value_enum, default_value = "simulated")]
    provider: ProviderKind,

    /// Recorded readings for --provider replay (.json or .json.gz)
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Delay before each replayed reading in continuous mode (ms)
    #[arg(long, default_value = "0")]
    replay_pace_ms: u64,

    /// Delivery model
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Polling interval (ms), implies --mode polled
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Give up on a single fix after this long (ms)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Reject readings less accurate than this (meters)
    #[arg(long, conflicts_with = "no_accuracy_filter")]
    accuracy_threshold: Option<f64>,

    /// Accept readings regardless of accuracy
    #[arg(long)]
    no_accuracy_filter: bool,

    /// Distance unit (km, mi)
    #[arg(long)]
    unit: Option<DistanceUnit>,

    /// Flush points to the store every N accepted points
    #[arg(long)]
    write_threshold: Option<usize>,

    /// Directory for the file-backed point store (enables flushing)
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Write the finished trip as JSON
    #[arg(long)]
    export_json: Option<PathBuf>,

    /// Write the finished trip as GPX
    #[arg(long)]
    export_gpx: Option<PathBuf>,

    /// Simulated provider start latitude
    #[arg(long, default_value_t = 37.7749, allow_negative_numbers = true)]
    start_lat: f64,

    /// Simulated provider start longitude
    #[arg(long, default_value_t = -122.4194, allow_negative_numbers = true)]
    start_lon: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ProviderKind {
    Simulated,
    Replay,
    Termux,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Polled,
    Continuous,
}

fn build_config(args: &Args) -> Result<TrackerConfig> {
    let mut config = match &args.config {
        Some(path) => TrackerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TrackerConfig::default(),
    };

    let current_interval = match config.delivery {
        DeliveryConfig::Polled { interval_ms } => interval_ms,
        DeliveryConfig::Continuous => DEFAULT_POLL_INTERVAL_MS,
    };
    match (args.mode, args.interval_ms) {
        (Some(Mode::Continuous), _) => config.delivery = DeliveryConfig::Continuous,
        (Some(Mode::Polled), interval) | (None, interval @ Some(_)) => {
            config.delivery = DeliveryConfig::Polled {
                interval_ms: interval.unwrap_or(current_interval),
            }
        }
        (None, None) => {}
    }

    if args.timeout_ms.is_some() {
        config.position.timeout_ms = args.timeout_ms;
    }

    if args.no_accuracy_filter {
        config.accuracy_threshold_m = None;
    } else if let Some(threshold) = args.accuracy_threshold {
        config.accuracy_threshold_m = Some(threshold);
    }

    if let Some(unit) = args.unit {
        config.unit = unit;
    }

    if args.write_threshold.is_some() || args.store_dir.is_some() {
        let flush = config.flush.get_or_insert_with(FlushConfig::default);
        if let Some(threshold) = args.write_threshold {
            flush.write_threshold = threshold;
        }
    }

    config.validate()?;
    Ok(config)
}

fn build_provider(args: &Args) -> Result<Arc<dyn LocationProvider>> {
    let provider: Arc<dyn LocationProvider> = match args.provider {
        ProviderKind::Simulated => Arc::new(SimulatedProvider::new(args.start_lat, args.start_lon)),
        ProviderKind::Replay => {
            let Some(path) = &args.replay else {
                bail!("--replay <FILE> is required with --provider replay");
            };
            let mut replay = ReplayProvider::from_file(path)
                .with_context(|| format!("loading replay {}", path.display()))?;
            if args.replay_pace_ms > 0 {
                replay = replay.with_pace(Duration::from_millis(args.replay_pace_ms));
            }
            Arc::new(replay)
        }
        ProviderKind::Termux => Arc::new(TermuxProvider::new()),
    };
    Ok(provider)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = build_config(&args)?;
    let provider = build_provider(&args)?;
    let store: Option<Box<dyn KeyValueStore>> = match &args.store_dir {
        Some(dir) => Some(Box::new(FileStore::open(dir)?)),
        None => None,
    };

    println!("[{}] Trip Tracker Starting", ts_now());
    println!("  Duration: {} seconds (0=until feed ends)", args.duration);
    println!("  Provider: {:?}", args.provider);
    println!("  Delivery: {:?}", config.delivery);
    println!("  Accuracy threshold: {:?} m", config.accuracy_threshold_m);
    println!("  Unit: {}", config.unit);
    if let Some(flush) = &config.flush {
        println!(
            "  Flush: every {} points under '{}'",
            flush.write_threshold, flush.storage_key
        );
    }

    let mut tracker = TripTracker::from_config(&config, provider, store, Box::new(ConsoleSink))
        .context("Invalid tracker configuration")?;
    if let Err(e) = tracker.start() {
        println!("[{}] Tracking not started: {}", ts_now(), e);
        return Ok(());
    }

    let deadline = tokio::time::sleep(Duration::from_secs(args.duration));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            progress = tracker.next() => {
                if progress.is_none() {
                    println!("[{}] Location feed ended, stopping...", ts_now());
                    break;
                }
            }
            _ = &mut deadline, if args.duration > 0 => {
                println!("[{}] Duration reached, stopping...", ts_now());
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                println!("[{}] Interrupted, stopping...", ts_now());
                break;
            }
        }
    }

    match tracker.stop() {
        StopOutcome::Completed(trip) => {
            println!("\n=== Trip Summary ===");
            println!("Trip: {}", trip.session_id);
            println!("Points: {}", trip.path.len());
            println!("Distance: {:.3} {}", trip.summary.distance, trip.summary.unit);
            println!(
                "Average speed: {:.2} m/s ({:.1} {})",
                trip.summary.average_speed,
                trip.summary.unit.speed_per_hour(trip.summary.average_speed),
                trip.summary.unit.speed_abbrev()
            );
            if let Some(start) = trip.start_marker() {
                println!("Start: {}", start);
            }
            if let Some(end) = trip.end_marker() {
                println!("End: {}", end);
            }

            if let Some(path) = &args.export_json {
                std::fs::write(path, trip.to_json()?)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("[{}] Trip written to {}", ts_now(), path.display());
            }
            if let Some(path) = &args.export_gpx {
                std::fs::write(path, trip.to_gpx_xml())
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("[{}] GPX written to {}", ts_now(), path.display());
            }
        }
        StopOutcome::NoDataCollected => {
            println!("\nNo position data collected, nothing to summarize.");
        }
        StopOutcome::Unavailable | StopOutcome::NotActive => {}
    }

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
