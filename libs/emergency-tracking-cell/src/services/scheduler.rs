use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::models::PollResource;
use crate::services::backend::EmergencyBackend;
use crate::services::store::{EmergencyStateStore, SessionTag, UpdateOutcome};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Stretches the polling period while the backend keeps failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_multiplier: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { max_multiplier: 4 }
    }
}

impl BackoffPolicy {
    /// Poll on every tick regardless of failures.
    pub fn disabled() -> Self {
        Self { max_multiplier: 1 }
    }

    /// Ticks between polls after `consecutive_failures` failures: 1, 2, 4, ... capped.
    pub fn ticks_between_polls(&self, consecutive_failures: u32) -> u32 {
        if consecutive_failures == 0 {
            return 1;
        }
        let exponent = consecutive_failures.min(16);
        (1u32 << exponent).min(self.max_multiplier.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollOutcome {
    /// Response arrived and was offered to the store.
    Updated(UpdateOutcome),
    /// Response carried nothing to apply.
    NoData,
    /// Request failed; logged and counted.
    Failed,
    /// A request for this resource is already outstanding.
    InFlight,
    /// Session closed or terminal; nothing was requested.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub status: PollOutcome,
    pub location: PollOutcome,
}

/// Outstanding requests, keyed by session generation and resource. A request
/// left over from a closed session never blocks the next session.
type InFlightSet = Arc<Mutex<HashSet<(u64, PollResource)>>>;

fn lock_in_flight(set: &InFlightSet) -> MutexGuard<'_, HashSet<(u64, PollResource)>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct InFlightGuard {
    set: InFlightSet,
    key: (u64, PollResource),
}

impl InFlightGuard {
    fn try_acquire(set: &InFlightSet, tag: &SessionTag, resource: PollResource) -> Option<Self> {
        let key = (tag.generation(), resource);
        if !lock_in_flight(set).insert(key) {
            return None;
        }
        Some(Self {
            set: Arc::clone(set),
            key,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock_in_flight(&self.set).remove(&self.key);
    }
}

#[derive(Clone)]
struct Poller {
    backend: Arc<dyn EmergencyBackend>,
    store: Arc<EmergencyStateStore>,
    in_flight: InFlightSet,
}

impl Poller {
    async fn poll_status(&self, tag: &SessionTag) -> PollOutcome {
        if !self.store.is_live(tag) {
            return PollOutcome::Skipped;
        }
        let Some(_guard) = InFlightGuard::try_acquire(&self.in_flight, tag, PollResource::Status) else {
            debug!("Status request for {} still in flight; skipping", tag.id());
            return PollOutcome::InFlight;
        };

        match self.backend.fetch_status(tag.id()).await {
            Ok(report) => {
                let outcome = self
                    .store
                    .apply_status_update(tag, report.status, report.estimated_arrival_minutes);
                self.store.record_poll_result(tag, PollResource::Status, true);
                PollOutcome::Updated(outcome)
            }
            Err(e) => {
                warn!("Error updating status for {}: {}", tag.id(), e);
                self.store.record_poll_result(tag, PollResource::Status, false);
                PollOutcome::Failed
            }
        }
    }

    async fn poll_location(&self, tag: &SessionTag) -> PollOutcome {
        if !self.store.is_live(tag) {
            return PollOutcome::Skipped;
        }
        let Some(_guard) = InFlightGuard::try_acquire(&self.in_flight, tag, PollResource::Location) else {
            debug!("Location request for {} still in flight; skipping", tag.id());
            return PollOutcome::InFlight;
        };

        match self.backend.fetch_ambulance_location(tag.id()).await {
            Ok(report) => {
                self.store.record_poll_result(tag, PollResource::Location, true);
                match report.location {
                    Some(location) => PollOutcome::Updated(self.store.apply_location_update(tag, location)),
                    None => PollOutcome::NoData,
                }
            }
            Err(e) => {
                warn!("Error updating ambulance location for {}: {}", tag.id(), e);
                self.store.record_poll_result(tag, PollResource::Location, false);
                PollOutcome::Failed
            }
        }
    }

    async fn poll_both(&self, tag: &SessionTag) -> RefreshReport {
        let (status, location) = futures::join!(self.poll_status(tag), self.poll_location(tag));
        RefreshReport { status, location }
    }
}

struct RunningPoll {
    tag: SessionTag,
    handle: JoinHandle<()>,
}

/// Periodically refreshes status and ambulance location for one session.
///
/// Each tick fires both requests without waiting for the previous tick's
/// requests. `stop` cancels the timer only; outstanding requests finish and
/// their results are filtered by the store's session check.
pub struct PollingScheduler {
    poller: Poller,
    backoff: BackoffPolicy,
    running: Mutex<Option<RunningPoll>>,
}

impl PollingScheduler {
    pub fn new(backend: Arc<dyn EmergencyBackend>, store: Arc<EmergencyStateStore>, backoff: BackoffPolicy) -> Self {
        Self {
            poller: Poller {
                backend,
                store,
                in_flight: InFlightSet::default(),
            },
            backoff,
            running: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<EmergencyStateStore> {
        &self.poller.store
    }

    pub fn backend(&self) -> &Arc<dyn EmergencyBackend> {
        &self.poller.backend
    }

    /// Begins the fixed-interval loop for `tag`, replacing any previous loop.
    /// Must be called from within a tokio runtime.
    pub fn start(&self, tag: SessionTag, interval: Duration) {
        self.stop();

        let period = if interval.is_zero() {
            warn!("Poll interval must be positive; using {:?}", DEFAULT_POLL_INTERVAL);
            DEFAULT_POLL_INTERVAL
        } else {
            interval
        };

        info!("Starting polling for {} every {:?}", tag.id(), period);
        let handle = tokio::spawn(run_loop(self.poller.clone(), tag.clone(), period, self.backoff));

        *self.lock_running() = Some(RunningPoll { tag, handle });
    }

    /// Cancels the timer. Safe to call repeatedly.
    pub fn stop(&self) {
        if let Some(running) = self.lock_running().take() {
            running.handle.abort();
            info!("Stopped polling for {}", running.tag.id());
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock_running()
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    pub fn tracked(&self) -> Option<SessionTag> {
        self.lock_running().as_ref().map(|running| running.tag.clone())
    }

    /// One out-of-band status + location refresh, awaited.
    #[instrument(skip(self, tag), fields(emergency_id = %tag.id()))]
    pub async fn refresh_once(&self, tag: &SessionTag) -> RefreshReport {
        self.poller.poll_both(tag).await
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<RunningPoll>> {
        self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(poller: Poller, tag: SessionTag, period: Duration, backoff: BackoffPolicy) {
    let mut updates = poller.store.subscribe();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks_since_poll = 0u32;

    loop {
        if !poller.store.is_live(&tag) {
            info!("Polling for {} ended: session closed or emergency finished", tag.id());
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {
                ticks_since_poll += 1;
                let wait = backoff.ticks_between_polls(poller.store.consecutive_failures());
                if ticks_since_poll < wait {
                    debug!("Backing off: tick {}/{} for {}", ticks_since_poll, wait, tag.id());
                    continue;
                }
                ticks_since_poll = 0;

                debug!("Polling status and location for {}", tag.id());
                let status_poller = poller.clone();
                let status_tag = tag.clone();
                tokio::spawn(async move {
                    status_poller.poll_status(&status_tag).await;
                });
                let location_poller = poller.clone();
                let location_tag = tag.clone();
                tokio::spawn(async move {
                    location_poller.poll_location(&location_tag).await;
                });
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
