//! Location capability: where raw readings come from.

use std::collections::VecDeque;
use std::env;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};

use crate::error::{TrackerError, TrackerResult};
use crate::reading::GeoReading;

/// Options passed through to the capability untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    /// Max time a single acquisition may take, ms. `None` means no limit.
    pub timeout_ms: Option<u64>,
    /// Max age of a cached fix the provider may return, ms.
    pub maximum_age_ms: u64,
}

impl Default for PositionOptions {
    fn default() -> Self {
        PositionOptions {
            enable_high_accuracy: true,
            timeout_ms: None,
            maximum_age_ms: 0,
        }
    }
}

/// A source of position fixes.
///
/// Calls may block; delivery models run them off the async executor.
pub trait LocationProvider: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }

    /// Single-shot query, used by polled delivery.
    fn get_once(&self, options: &PositionOptions) -> TrackerResult<GeoReading>;

    /// Wait for the next fix at the provider's own cadence, used by
    /// continuous delivery. `None` ends the feed.
    fn next_update(&self, options: &PositionOptions) -> Option<TrackerResult<GeoReading>> {
        if self.is_exhausted() {
            return None;
        }
        Some(self.get_once(options))
    }

    /// True once a finite provider has nothing more to give.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Plays back a recorded sequence of fixes and failures.
pub struct ReplayProvider {
    steps: Mutex<VecDeque<TrackerResult<GeoReading>>>,
    pace: Option<Duration>,
}

impl ReplayProvider {
    pub fn new(steps: Vec<TrackerResult<GeoReading>>) -> Self {
        ReplayProvider {
            steps: Mutex::new(steps.into()),
            pace: None,
        }
    }

    pub fn from_readings(readings: Vec<GeoReading>) -> Self {
        Self::new(readings.into_iter().map(Ok).collect())
    }

    /// Load a JSON array of readings, gzip-compressed if the name ends in `.gz`.
    pub fn from_file(path: &Path) -> TrackerResult<Self> {
        let file = File::open(path)?;
        let readings: Vec<GeoReading> =
            if path.extension().map(|e| e == "gz").unwrap_or(false) {
                serde_json::from_reader(BufReader::new(GzDecoder::new(file)))?
            } else {
                serde_json::from_reader(BufReader::new(file))?
            };
        log::info!("Loaded {} readings from {}", readings.len(), path.display());
        Ok(Self::from_readings(readings))
    }

    /// Delay before each continuous update.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    pub fn remaining(&self) -> usize {
        self.steps.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn pop(&self) -> Option<TrackerResult<GeoReading>> {
        match self.steps.lock() {
            Ok(mut steps) => steps.pop_front(),
            Err(_) => Some(Err(TrackerError::AcquisitionFailed(
                "replay state poisoned".to_string(),
            ))),
        }
    }
}

impl LocationProvider for ReplayProvider {
    fn get_once(&self, _options: &PositionOptions) -> TrackerResult<GeoReading> {
        self.pop().unwrap_or_else(|| {
            Err(TrackerError::AcquisitionFailed(
                "replay exhausted".to_string(),
            ))
        })
    }

    fn next_update(&self, _options: &PositionOptions) -> Option<TrackerResult<GeoReading>> {
        if let Some(pace) = self.pace {
            std::thread::sleep(pace);
        }
        self.pop()
    }

    fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

/// Deterministic synthetic walk heading north-east from a start position.
pub struct SimulatedProvider {
    origin: (f64, f64),
    step_deg: f64,
    counter: AtomicU64,
    cadence: Duration,
}

impl SimulatedProvider {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        SimulatedProvider {
            origin: (latitude, longitude),
            step_deg: 0.00005,
            counter: AtomicU64::new(0),
            cadence: Duration::from_secs(1),
        }
    }

    /// Interval between continuous updates.
    pub fn with_cadence(mut self, cadence: Duration) -> Self {
        self.cadence = cadence;
        self
    }

    fn sample(&self) -> GeoReading {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) as f64;
        let (lat, lon) = self.origin;
        GeoReading::new(
            lat + seq * self.step_deg,
            lon + seq * self.step_deg * (1.0 + (seq * 0.3).sin() * 0.2),
            5.0 + (seq * 0.1).sin().abs() * 4.0,
            Utc::now().timestamp(),
        )
        .with_speed(1.4 + (seq * 0.5).sin() * 0.4)
    }
}

impl LocationProvider for SimulatedProvider {
    fn get_once(&self, _options: &PositionOptions) -> TrackerResult<GeoReading> {
        Ok(self.sample())
    }

    fn next_update(&self, _options: &PositionOptions) -> Option<TrackerResult<GeoReading>> {
        std::thread::sleep(self.cadence);
        Some(Ok(self.sample()))
    }
}

/// How often a running `termux-location` is checked against its deadline.
const CHILD_POLL: Duration = Duration::from_millis(20);

/// Reads fixes from Termux:API's `termux-location` command.
///
/// `timeout_ms` bounds each command run; an overdue child is killed.
/// A non-zero `maximum_age_ms` first asks for the last known fix and only
/// falls back to a fresh one when that fix is older than allowed.
pub struct TermuxProvider {
    command: String,
}

#[derive(Debug, Deserialize)]
struct TermuxFix {
    latitude: f64,
    longitude: f64,
    accuracy: f64,
    altitude: Option<f64>,
    vertical_accuracy: Option<f64>,
    bearing: Option<f64>,
    speed: Option<f64>,
    #[serde(rename = "elapsedMs")]
    elapsed_ms: Option<u64>,
}

impl TermuxProvider {
    pub fn new() -> Self {
        TermuxProvider {
            command: "termux-location".to_string(),
        }
    }

    /// Use another executable in place of `termux-location`.
    pub fn with_command(command: impl Into<String>) -> Self {
        TermuxProvider {
            command: command.into(),
        }
    }

    fn parse(output: &str) -> TrackerResult<TermuxFix> {
        serde_json::from_str(output.trim()).map_err(|e| {
            TrackerError::AcquisitionFailed(format!("unreadable termux-location output: {}", e))
        })
    }

    fn parse_fix(output: &str) -> TrackerResult<GeoReading> {
        Ok(Self::reading_from(Self::parse(output)?))
    }

    fn reading_from(fix: TermuxFix) -> GeoReading {
        let mut reading = GeoReading::new(
            fix.latitude,
            fix.longitude,
            fix.accuracy,
            Utc::now().timestamp(),
        );
        reading.speed = fix.speed;
        reading.altitude = fix.altitude;
        reading.altitude_accuracy = fix.vertical_accuracy;
        reading.heading = fix.bearing;
        reading
    }

    /// Run the command once and collect its stdout, killing it if it is
    /// still running when `timeout` elapses.
    fn run(&self, source: &str, request: &str, timeout: Option<Duration>) -> TrackerResult<String> {
        let mut child = Command::new(&self.command)
            .args(["-p", source, "-r", request])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| TrackerError::AcquisitionFailed(e.to_string()))?;

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if let Some(limit) = timeout {
                        if started.elapsed() >= limit {
                            let _ = child.kill();
                            let _ = child.wait();
                            log::warn!("{} killed after {:?}", self.command, limit);
                            return Err(TrackerError::AcquisitionFailed(format!(
                                "{} timed out after {} ms",
                                self.command,
                                limit.as_millis()
                            )));
                        }
                    }
                    thread::sleep(CHILD_POLL);
                }
                Err(e) => {
                    let _ = child.kill();
                    return Err(TrackerError::AcquisitionFailed(e.to_string()));
                }
            }
        };

        if !status.success() {
            return Err(TrackerError::AcquisitionFailed(format!(
                "{} exited with {}",
                self.command, status
            )));
        }

        let mut stdout = String::new();
        if let Some(mut pipe) = child.stdout.take() {
            pipe.read_to_string(&mut stdout)
                .map_err(|e| TrackerError::AcquisitionFailed(e.to_string()))?;
        }
        Ok(stdout)
    }

    /// Last known fix, if there is one no older than `max_age_ms`.
    fn cached_fix(
        &self,
        source: &str,
        max_age_ms: u64,
        timeout: Option<Duration>,
    ) -> Option<GeoReading> {
        let output = match self.run(source, "last", timeout) {
            Ok(output) => output,
            Err(e) => {
                log::debug!("No cached fix: {}", e);
                return None;
            }
        };
        let fix = Self::parse(&output).ok()?;
        match fix.elapsed_ms {
            Some(age) if age <= max_age_ms => Some(Self::reading_from(fix)),
            age => {
                log::debug!("Cached fix too old ({:?} ms > {} ms)", age, max_age_ms);
                None
            }
        }
    }
}

impl Default for TermuxProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationProvider for TermuxProvider {
    fn is_available(&self) -> bool {
        env::var_os("PATH")
            .map(|paths| env::split_paths(&paths).any(|dir| dir.join(&self.command).is_file()))
            .unwrap_or(false)
    }

    fn get_once(&self, options: &PositionOptions) -> TrackerResult<GeoReading> {
        let source = if options.enable_high_accuracy {
            "gps"
        } else {
            "network"
        };
        let timeout = options.timeout_ms.map(Duration::from_millis);

        if options.maximum_age_ms > 0 {
            if let Some(reading) = self.cached_fix(source, options.maximum_age_ms, timeout) {
                return Ok(reading);
            }
        }

        let output = self.run(source, "once", timeout)?;
        Self::parse_fix(&output)
    }
}
