//! How readings reach the session: polled on a timer or pushed by a
//! continuous watch. Both run as tokio tasks feeding an mpsc channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::Sender;
use tokio::task::{self, JoinError, JoinHandle};
use tokio::time::{self, interval_at, Instant, MissedTickBehavior};

use crate::error::TrackerError;
use crate::location::{LocationProvider, PositionOptions};
use crate::reading::GeoReading;

/// Capacity of the reading channel between delivery task and session
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    Reading(GeoReading),
    Failed(TrackerError),
}

/// Running delivery task. Cancelling (or dropping) the handle stops it;
/// a fix already being acquired is discarded.
#[derive(Debug)]
pub struct DeliveryHandle {
    task: JoinHandle<()>,
}

impl DeliveryHandle {
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for DeliveryHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Await one blocking capability call. `None` if it outlives `timeout_ms`;
/// the call itself is left to finish on the blocking pool.
async fn within<T>(
    timeout_ms: Option<u64>,
    call: JoinHandle<T>,
) -> Option<Result<T, JoinError>> {
    match timeout_ms {
        Some(ms) => time::timeout(Duration::from_millis(ms), call).await.ok(),
        None => Some(call.await),
    }
}

fn timed_out(timeout_ms: Option<u64>) -> TrackerError {
    TrackerError::AcquisitionFailed(format!(
        "timed out after {} ms",
        timeout_ms.unwrap_or_default()
    ))
}

pub trait DeliveryModel: Send {
    fn name(&self) -> &'static str;

    /// Spawn the delivery task. Must be called from within a tokio runtime.
    fn start(
        &self,
        provider: Arc<dyn LocationProvider>,
        options: PositionOptions,
        tx: Sender<LocationEvent>,
    ) -> DeliveryHandle;
}

/// One single-shot query per fixed interval tick.
#[derive(Debug, Clone, Copy)]
pub struct Polled {
    period: Duration,
}

impl Polled {
    pub fn new(period: Duration) -> Self {
        Polled { period }
    }
}

impl DeliveryModel for Polled {
    fn name(&self) -> &'static str {
        "polled"
    }

    fn start(
        &self,
        provider: Arc<dyn LocationProvider>,
        options: PositionOptions,
        tx: Sender<LocationEvent>,
    ) -> DeliveryHandle {
        let period = self.period;
        let worker = tokio::spawn(async move {
            if period.is_zero() {
                log::error!("Polled delivery needs a non-zero interval");
                let _ = tx
                    .send(LocationEvent::Failed(TrackerError::InvalidParameters(
                        "polling interval must be greater than zero".to_string(),
                    )))
                    .await;
                return;
            }

            // First query after one full period, like a plain repeating timer.
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut polls = 0u64;

            loop {
                ticker.tick().await;

                if provider.is_exhausted() {
                    log::info!("Location feed ended after {} polls", polls);
                    break;
                }

                let source = provider.clone();
                let opts = options.clone();
                let call = task::spawn_blocking(move || source.get_once(&opts));
                let event = match within(options.timeout_ms, call).await {
                    Some(Ok(Ok(reading))) => LocationEvent::Reading(reading),
                    Some(Ok(Err(e))) => LocationEvent::Failed(e),
                    Some(Err(e)) => {
                        LocationEvent::Failed(TrackerError::AcquisitionFailed(e.to_string()))
                    }
                    None => LocationEvent::Failed(timed_out(options.timeout_ms)),
                };
                polls += 1;

                if tx.send(event).await.is_err() {
                    log::debug!("Polled delivery receiver gone after {} polls", polls);
                    break;
                }
            }
        });

        log::info!("Polled delivery started ({:?} interval)", self.period);
        DeliveryHandle { task: worker }
    }
}

/// Forwards every fix the provider pushes, at whatever rate it pushes them.
#[derive(Debug, Clone, Copy, Default)]
pub struct Continuous;

impl DeliveryModel for Continuous {
    fn name(&self) -> &'static str {
        "continuous"
    }

    fn start(
        &self,
        provider: Arc<dyn LocationProvider>,
        options: PositionOptions,
        tx: Sender<LocationEvent>,
    ) -> DeliveryHandle {
        let worker = tokio::spawn(async move {
            let mut updates = 0u64;

            loop {
                let source = provider.clone();
                let opts = options.clone();
                let call = task::spawn_blocking(move || source.next_update(&opts));
                let event = match within(options.timeout_ms, call).await {
                    Some(Ok(Some(Ok(reading)))) => LocationEvent::Reading(reading),
                    Some(Ok(Some(Err(e)))) => LocationEvent::Failed(e),
                    Some(Ok(None)) => {
                        log::info!("Location watch ended after {} updates", updates);
                        break;
                    }
                    None => LocationEvent::Failed(timed_out(options.timeout_ms)),
                    Some(Err(e)) => {
                        log::warn!("Location watch aborted: {}", e);
                        let _ = tx
                            .send(LocationEvent::Failed(TrackerError::AcquisitionFailed(
                                e.to_string(),
                            )))
                            .await;
                        break;
                    }
                };
                updates += 1;

                if tx.send(event).await.is_err() {
                    log::debug!("Watch receiver gone after {} updates", updates);
                    break;
                }
            }
        });

        log::info!("Continuous delivery started");
        DeliveryHandle { task: worker }
    }
}
