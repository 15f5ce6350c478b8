use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use shared_config::AppConfig;

use crate::error::TrackingError;
use crate::models::{Coordinates, DataSource, EmergencyId, EmergencyStatus};
use crate::services::backend::EmergencyBackend;
use crate::services::fallback::FallbackDataProvider;
use crate::services::geolocation::GeolocationAcquirer;
use crate::services::scheduler::{BackoffPolicy, PollingScheduler, RefreshReport};
use crate::services::store::{EmergencyStateStore, SessionTag, TrackerState, UpdateOutcome};
use crate::view::TrackerView;

pub const CANCEL_PROMPT: &str = "Are you sure you want to cancel this emergency request?";

/// Yes/no prompt shown before an emergency is cancelled.
#[async_trait]
pub trait ConfirmCancellation: Send + Sync {
    async fn confirm(&self, prompt: &str) -> bool;
}

/// A pre-answered prompt, e.g. from a request body.
#[async_trait]
impl ConfirmCancellation for bool {
    async fn confirm(&self, _prompt: &str) -> bool {
        *self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Cancelled,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactLink {
    pub label: String,
    pub phone: String,
    pub uri: String,
}

impl ContactLink {
    fn tel(label: &str, phone: &str) -> Option<Self> {
        let dialable: String = phone
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '+')
            .collect();
        if dialable.is_empty() {
            return None;
        }
        Some(Self {
            label: label.to_string(),
            phone: phone.to_string(),
            uri: format!("tel:{}", dialable),
        })
    }
}

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub poll_interval: Duration,
    pub backoff: BackoffPolicy,
    pub lost_after_failures: u32,
    pub fallback_location: Coordinates,
    pub geolocation_timeout: Duration,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl TrackerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            backoff: BackoffPolicy {
                max_multiplier: config.max_backoff_multiplier,
            },
            lost_after_failures: config.lost_after_failures,
            fallback_location: Coordinates::new(config.fallback_location_lat, config.fallback_location_lng),
            geolocation_timeout: Duration::from_millis(config.geolocation_timeout_ms),
        }
    }
}

/// Composition root for one tracker view: wires the initial load, geolocation,
/// and polling into the store and exposes the user actions.
pub struct TrackerController {
    store: Arc<EmergencyStateStore>,
    scheduler: Arc<PollingScheduler>,
    geolocation: GeolocationAcquirer,
    fallback: FallbackDataProvider,
    poll_interval: Duration,
    geolocation_task: Mutex<Option<JoinHandle<()>>>,
}

impl TrackerController {
    /// The scheduler carries the store and backend the controller works with.
    pub fn new(scheduler: Arc<PollingScheduler>, geolocation: GeolocationAcquirer, poll_interval: Duration) -> Self {
        Self {
            store: Arc::clone(scheduler.store()),
            scheduler,
            geolocation,
            fallback: FallbackDataProvider::new(),
            poll_interval,
            geolocation_task: Mutex::new(None),
        }
    }

    pub fn with_backend(
        backend: Arc<dyn EmergencyBackend>,
        geolocation: GeolocationAcquirer,
        settings: &TrackerSettings,
    ) -> Self {
        let store = Arc::new(EmergencyStateStore::new(settings.lost_after_failures));
        let scheduler = Arc::new(PollingScheduler::new(backend, store, settings.backoff));
        Self::new(scheduler, geolocation, settings.poll_interval)
    }

    pub fn store(&self) -> &Arc<EmergencyStateStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<PollingScheduler> {
        &self.scheduler
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackerState> {
        self.store.subscribe()
    }

    pub fn view(&self) -> TrackerView {
        TrackerView::render(&self.store.current())
    }

    /// Loads the emergency (remote snapshot, or synthetic data if the backend is
    /// unreachable) and starts geolocation and polling.
    #[instrument(skip(self), fields(emergency_id = %id))]
    pub async fn open(&self, id: EmergencyId) -> Result<TrackerView, TrackingError> {
        if let Some(current) = self.store.current_tag() {
            if current.id() == &id {
                debug!("Already tracking {}", id);
                return Ok(self.view());
            }
            info!("Switching tracker from {} to {}", current.id(), id);
            self.close();
        }

        let tag = self.store.begin_session(id.clone());
        self.spawn_geolocation(&tag);

        let (snapshot, source) = match self.scheduler.backend().fetch_snapshot(&id).await {
            Ok(snapshot) => (snapshot, DataSource::Remote),
            Err(e) => {
                warn!("Error fetching emergency data for {}: {}; using fallback data", id, e);
                (self.fallback.snapshot(&id, Utc::now()), DataSource::Fallback)
            }
        };

        if self.store.initialize(&tag, snapshot, source)? != UpdateOutcome::Applied {
            return Err(TrackingError::SessionClosed(id.to_string()));
        }

        if self.store.is_live(&tag) {
            self.scheduler.start(tag, self.poll_interval);
        } else {
            info!("Emergency {} is already finished; not polling", id);
        }

        Ok(self.view())
    }

    /// Cancels after confirmation. Local state only changes once the backend
    /// acknowledges the cancellation.
    #[instrument(skip(self, confirmation))]
    pub async fn cancel(&self, confirmation: &dyn ConfirmCancellation) -> Result<CancelOutcome, TrackingError> {
        let tag = self.active_tag()?;
        let status = self.current_status(&tag)?;
        if status.is_terminal() {
            return Err(TrackingError::AlreadyTerminal {
                id: tag.id().to_string(),
                status,
            });
        }

        if !confirmation.confirm(CANCEL_PROMPT).await {
            info!("Cancellation of {} declined", tag.id());
            return Ok(CancelOutcome::Declined);
        }

        let ack = self
            .scheduler
            .backend()
            .cancel_emergency(tag.id())
            .await
            .map_err(|e| {
                error!("Error cancelling emergency {}: {}", tag.id(), e);
                TrackingError::CancellationFailed(e)
            })?;

        if !ack.success {
            let reason = ack.message.unwrap_or_else(|| "no reason given".to_string());
            error!("Backend refused to cancel {}: {}", tag.id(), reason);
            return Err(TrackingError::CancellationRejected(reason));
        }

        let outcome = self
            .store
            .apply_status_update(&tag, EmergencyStatus::Cancelled, None);
        self.scheduler.stop();
        info!("Emergency {} cancelled ({:?})", tag.id(), outcome);

        Ok(CancelOutcome::Cancelled)
    }

    /// One status + location refresh outside the timer cadence.
    pub async fn refresh_now(&self) -> Result<RefreshReport, TrackingError> {
        let tag = self.active_tag()?;
        self.current_status(&tag)?;
        Ok(self.scheduler.refresh_once(&tag).await)
    }

    /// Stops polling and geolocation and clears the store. Callable in any state.
    pub fn close(&self) {
        self.scheduler.stop();
        if let Some(task) = self.lock_geolocation().take() {
            task.abort();
        }
        self.store.reset();
    }

    pub fn contact_ambulance(&self) -> Option<ContactLink> {
        let state = self.store.current();
        let ambulance = state.record?.ambulance?;
        let phone = ambulance.phone?;
        ContactLink::tel(&format!("Ambulance {}", ambulance.id), &phone)
    }

    pub fn contact_hospital(&self) -> Option<ContactLink> {
        let state = self.store.current();
        let hospital = state.record?.assigned_hospital?;
        let phone = hospital.phone?;
        ContactLink::tel(&hospital.name, &phone)
    }

    fn active_tag(&self) -> Result<SessionTag, TrackingError> {
        self.store.current_tag().ok_or(TrackingError::NotOpen)
    }

    fn current_status(&self, tag: &SessionTag) -> Result<EmergencyStatus, TrackingError> {
        let state = self.store.current();
        match state.record {
            Some(record) if state.session.as_ref() == Some(tag) => Ok(record.status),
            _ => Err(TrackingError::NotReady(tag.id().to_string())),
        }
    }

    fn spawn_geolocation(&self, tag: &SessionTag) {
        let acquirer = self.geolocation.clone();
        let store = Arc::clone(&self.store);
        let tag = tag.clone();

        let task = tokio::spawn(async move {
            let location = acquirer.acquire().await;
            store.set_viewer_location(&tag, location);
        });

        if let Some(previous) = self.lock_geolocation().replace(task) {
            previous.abort();
        }
    }

    fn lock_geolocation(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.geolocation_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for TrackerController {
    fn drop(&mut self) {
        self.close();
    }
}
