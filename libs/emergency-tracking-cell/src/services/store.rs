use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::TrackingError;
use crate::models::{
    Coordinates, DataSource, EmergencyId, EmergencyRecord, EmergencySnapshot, EmergencyStatus, LinkHealth,
    PollResource, StatusEntry, StatusTransition,
};
use crate::services::distance::distance_km;

/// Identifies one tracking session. Re-opening the same emergency after a
/// reset produces a new generation, so responses requested by the earlier
/// session never match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SessionTag {
    id: EmergencyId,
    generation: u64,
}

impl SessionTag {
    pub fn id(&self) -> &EmergencyId {
        &self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// State changed and observers were notified.
    Applied,
    /// Nothing to change.
    Unchanged,
    /// Reported status is behind the committed one.
    Stale,
    /// Record is terminal; nothing may change.
    Closed,
    /// Response belongs to another session or the record is not loaded.
    Discarded,
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied)
    }
}

/// Everything observers render from.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerState {
    pub session: Option<SessionTag>,
    pub record: Option<EmergencyRecord>,
    pub source: Option<DataSource>,
    pub viewer_location: Option<Coordinates>,
    pub ambulance_distance_km: Option<f64>,
    pub status_failures: u32,
    pub location_failures: u32,
    pub link_health: LinkHealth,
    /// Bumped once per notified mutation.
    pub revision: u64,
}

impl Default for TrackerState {
    fn default() -> Self {
        Self {
            session: None,
            record: None,
            source: None,
            viewer_location: None,
            ambulance_distance_km: None,
            status_failures: 0,
            location_failures: 0,
            link_health: LinkHealth::Connected,
            revision: 0,
        }
    }
}

impl TrackerState {
    pub fn is_terminal(&self) -> bool {
        self.record.as_ref().is_some_and(|r| r.status.is_terminal())
    }

    /// Session is current, loaded, and still accepting updates.
    pub fn is_live(&self, tag: &SessionTag) -> bool {
        self.owns(tag) && self.record.is_some() && !self.is_terminal()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.status_failures.max(self.location_failures)
    }

    fn owns(&self, tag: &SessionTag) -> bool {
        self.session.as_ref() == Some(tag)
    }

    fn recompute_distance(&mut self) {
        let ambulance = self.record.as_ref().and_then(EmergencyRecord::ambulance_location);
        self.ambulance_distance_km = match (self.viewer_location, ambulance) {
            (Some(viewer), Some(ambulance)) => Some(distance_km(viewer, ambulance)),
            _ => None,
        };
    }
}

/// Single owner of the tracked emergency. Every write goes through here and is
/// checked against the session tag and the status ordering before it commits.
pub struct EmergencyStateStore {
    state: watch::Sender<TrackerState>,
    generation: AtomicU64,
    lost_after_failures: u32,
}

impl EmergencyStateStore {
    pub fn new(lost_after_failures: u32) -> Self {
        let (state, _) = watch::channel(TrackerState::default());
        Self {
            state,
            generation: AtomicU64::new(0),
            lost_after_failures,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackerState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> TrackerState {
        self.state.borrow().clone()
    }

    pub fn current_tag(&self) -> Option<SessionTag> {
        self.state.borrow().session.clone()
    }

    pub fn is_live(&self, tag: &SessionTag) -> bool {
        self.state.borrow().is_live(tag)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.borrow().is_terminal()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.borrow().consecutive_failures()
    }

    /// Starts a new session for `id`, dropping whatever was tracked before.
    pub fn begin_session(&self, id: EmergencyId) -> SessionTag {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let tag = SessionTag { id, generation };

        let session = tag.clone();
        self.state.send_modify(|state| {
            let revision = state.revision + 1;
            *state = TrackerState {
                session: Some(session),
                revision,
                ..TrackerState::default()
            };
        });

        debug!("Began tracking session {} (generation {})", tag.id, tag.generation);
        tag
    }

    /// Loads the full record. Fails if the session already holds one.
    pub fn initialize(
        &self,
        tag: &SessionTag,
        snapshot: EmergencySnapshot,
        source: DataSource,
    ) -> Result<UpdateOutcome, TrackingError> {
        let mut result = Ok(UpdateOutcome::Discarded);

        self.state.send_if_modified(|state| {
            if !state.owns(tag) {
                debug!("Discarding snapshot for closed session {}", tag.id);
                return false;
            }
            if state.record.is_some() {
                result = Err(TrackingError::AlreadyInitialized(tag.id.to_string()));
                return false;
            }
            if snapshot.id != tag.id {
                warn!("Snapshot id {} does not match tracked id {}", snapshot.id, tag.id);
            }

            let record = EmergencyRecord::from_snapshot(tag.id.clone(), snapshot, Utc::now());
            info!(
                "Loaded emergency {} ({:?}) with status {} and {} history entries",
                record.id,
                source,
                record.status,
                record.status_history.len()
            );
            state.record = Some(record);
            state.source = Some(source);
            state.recompute_distance();
            state.revision += 1;
            result = Ok(UpdateOutcome::Applied);
            true
        });

        result
    }

    pub fn apply_status_update(
        &self,
        tag: &SessionTag,
        status: EmergencyStatus,
        estimated_arrival_minutes: Option<f64>,
    ) -> UpdateOutcome {
        self.commit(|state| {
            if !state.owns(tag) {
                debug!("Discarding {} status for closed session {}", status, tag.id);
                return (UpdateOutcome::Discarded, false);
            }
            let Some(record) = state.record.as_mut() else {
                return (UpdateOutcome::Discarded, false);
            };

            match record.status.classify(status) {
                StatusTransition::Unchanged => {
                    let eta_changed = !record.status.is_terminal()
                        && estimated_arrival_minutes.is_some()
                        && estimated_arrival_minutes != record.estimated_arrival_minutes;
                    if eta_changed {
                        record.estimated_arrival_minutes = estimated_arrival_minutes;
                    }
                    (UpdateOutcome::Unchanged, eta_changed)
                }
                StatusTransition::Stale => {
                    warn!(
                        "Rejecting stale status {} for {}; already {}",
                        status, record.id, record.status
                    );
                    (UpdateOutcome::Stale, false)
                }
                StatusTransition::Closed => {
                    debug!("Ignoring status {} for {}; already {}", status, record.id, record.status);
                    (UpdateOutcome::Closed, false)
                }
                StatusTransition::Advance => {
                    info!("Emergency {} moved {} -> {}", record.id, record.status, status);
                    record.status = status;
                    record.status_history.push(StatusEntry {
                        status,
                        timestamp: Utc::now(),
                    });
                    if estimated_arrival_minutes.is_some() {
                        record.estimated_arrival_minutes = estimated_arrival_minutes;
                    }
                    if status.is_terminal() {
                        record.is_tracking = false;
                    }
                    (UpdateOutcome::Applied, true)
                }
            }
        })
    }

    /// Most recent location wins; no ordering check.
    pub fn apply_location_update(&self, tag: &SessionTag, location: Coordinates) -> UpdateOutcome {
        self.commit(|state| {
            if !state.owns(tag) {
                debug!("Discarding ambulance location for closed session {}", tag.id);
                return (UpdateOutcome::Discarded, false);
            }
            if !location.is_valid() {
                warn!("Discarding out-of-range ambulance location {:?}", location);
                return (UpdateOutcome::Discarded, false);
            }
            let Some(record) = state.record.as_mut() else {
                return (UpdateOutcome::Discarded, false);
            };
            if record.status.is_terminal() {
                return (UpdateOutcome::Closed, false);
            }
            let Some(ambulance) = record.ambulance.as_mut() else {
                debug!("No ambulance assigned to {}; ignoring location", record.id);
                return (UpdateOutcome::Discarded, false);
            };
            if ambulance.location == Some(location) {
                return (UpdateOutcome::Unchanged, false);
            }

            ambulance.location = Some(location);
            state.recompute_distance();
            (UpdateOutcome::Applied, true)
        })
    }

    /// Viewer position may arrive before the snapshot does.
    pub fn set_viewer_location(&self, tag: &SessionTag, location: Coordinates) -> UpdateOutcome {
        self.commit(|state| {
            if !state.owns(tag) {
                return (UpdateOutcome::Discarded, false);
            }
            if state.viewer_location == Some(location) {
                return (UpdateOutcome::Unchanged, false);
            }
            state.viewer_location = Some(location);
            state.recompute_distance();
            (UpdateOutcome::Applied, true)
        })
    }

    /// Updates the consecutive-failure counters. Observers are only notified
    /// when the resulting link health changes.
    pub fn record_poll_result(&self, tag: &SessionTag, resource: PollResource, succeeded: bool) -> Option<LinkHealth> {
        let lost_after = self.lost_after_failures;
        let mut health = None;

        self.state.send_if_modified(|state| {
            if !state.owns(tag) {
                return false;
            }

            let counter = match resource {
                PollResource::Status => &mut state.status_failures,
                PollResource::Location => &mut state.location_failures,
            };
            *counter = if succeeded { 0 } else { counter.saturating_add(1) };

            let next = LinkHealth::from_failures(state.consecutive_failures(), lost_after);
            health = Some(next);
            if next == state.link_health {
                return false;
            }

            match next {
                LinkHealth::Lost { consecutive_failures } => {
                    warn!("Tracking link for {} lost after {} failures", tag.id, consecutive_failures)
                }
                LinkHealth::Connected => info!("Tracking link for {} restored", tag.id),
                LinkHealth::Degraded { .. } => {}
            }
            state.link_health = next;
            state.revision += 1;
            true
        });

        health
    }

    /// Clears the record and ends the session.
    pub fn reset(&self) {
        self.state.send_modify(|state| {
            if let Some(session) = &state.session {
                debug!("Resetting tracking session {}", session.id);
            }
            let revision = state.revision + 1;
            *state = TrackerState {
                revision,
                ..TrackerState::default()
            };
        });
    }

    fn commit<F>(&self, update: F) -> UpdateOutcome
    where
        F: FnOnce(&mut TrackerState) -> (UpdateOutcome, bool),
    {
        let mut outcome = UpdateOutcome::Discarded;
        self.state.send_if_modified(|state| {
            let (result, changed) = update(state);
            outcome = result;
            if changed {
                state.revision += 1;
            }
            changed
        });
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;

    use crate::models::Ambulance;
    use crate::services::fallback::FallbackDataProvider;

    fn id(raw: &str) -> EmergencyId {
        EmergencyId::parse(raw).unwrap()
    }

    fn snapshot_with(raw_id: &str, status: EmergencyStatus) -> EmergencySnapshot {
        let created_at = Utc::now() - Duration::minutes(1);
        EmergencySnapshot {
            id: id(raw_id),
            status,
            created_at,
            patient_name: "Jane Doe".to_string(),
            emergency_type: "Cardiac".to_string(),
            priority: "High".to_string(),
            assigned_hospital: None,
            ambulance: Some(Ambulance {
                id: "AMB-7".to_string(),
                driver_name: "Sam".to_string(),
                phone: None,
                location: None,
            }),
            estimated_arrival_minutes: None,
            status_history: vec![StatusEntry { status, timestamp: created_at }],
            nearby_hospitals: Vec::new(),
        }
    }

    fn loaded(status: EmergencyStatus) -> (EmergencyStateStore, SessionTag) {
        let store = EmergencyStateStore::new(3);
        let tag = store.begin_session(id("E-1"));
        store
            .initialize(&tag, snapshot_with("E-1", status), DataSource::Remote)
            .unwrap();
        (store, tag)
    }

    fn history(store: &EmergencyStateStore) -> Vec<EmergencyStatus> {
        store
            .current()
            .record
            .unwrap()
            .status_history
            .iter()
            .map(|e| e.status)
            .collect()
    }

    #[test]
    fn pending_to_dispatched_appends_one_entry() {
        let (store, tag) = loaded(EmergencyStatus::Pending);
        assert_eq!(history(&store).len(), 1);

        let outcome = store.apply_status_update(&tag, EmergencyStatus::Dispatched, Some(12.0));

        assert_eq!(outcome, UpdateOutcome::Applied);
        let record = store.current().record.unwrap();
        assert_eq!(record.status_history.len(), 2);
        assert_eq!(record.status_history[1].status, EmergencyStatus::Dispatched);
        assert_eq!(record.status, EmergencyStatus::Dispatched);
        assert_eq!(record.estimated_arrival_minutes, Some(12.0));
    }

    #[test]
    fn late_pending_does_not_regress_en_route() {
        let (store, tag) = loaded(EmergencyStatus::EnRoute);
        let before = store.current();

        let outcome = store.apply_status_update(&tag, EmergencyStatus::Pending, None);

        assert_eq!(outcome, UpdateOutcome::Stale);
        assert_eq!(store.current(), before);
    }

    #[test]
    fn repeated_status_is_idempotent() {
        let (store, tag) = loaded(EmergencyStatus::Pending);

        store.apply_status_update(&tag, EmergencyStatus::Dispatched, None);
        let outcome = store.apply_status_update(&tag, EmergencyStatus::Dispatched, None);

        assert_eq!(outcome, UpdateOutcome::Unchanged);
        assert_eq!(
            history(&store),
            vec![EmergencyStatus::Pending, EmergencyStatus::Dispatched]
        );
    }

    #[test]
    fn history_grows_by_at_most_one_and_tracks_status() {
        use EmergencyStatus::*;
        let sequence = [
            Dispatched, Dispatched, Pending, EnRoute, Dispatched, EnRoute, Arrived, Pending, Completed,
            Cancelled, Arrived,
        ];
        let (store, tag) = loaded(Pending);

        for status in sequence {
            let before = store.current().record.unwrap();
            let outcome = store.apply_status_update(&tag, status, None);
            let after = store.current().record.unwrap();

            let grew = after.status_history.len() - before.status_history.len();
            assert!(grew <= 1);
            assert_eq!(grew == 1, outcome.is_applied());
            if grew == 1 {
                assert_ne!(before.status, status);
            }
            assert_eq!(after.status_history[..before.status_history.len()], before.status_history[..]);
            assert_eq!(after.status_history.last().unwrap().status, after.status);
        }

        assert_eq!(history(&store), vec![Pending, Dispatched, EnRoute, Arrived, Completed]);
    }

    #[test]
    fn skipping_ahead_is_accepted() {
        let (store, tag) = loaded(EmergencyStatus::Pending);
        assert_eq!(
            store.apply_status_update(&tag, EmergencyStatus::Arrived, None),
            UpdateOutcome::Applied
        );
        assert_eq!(store.current().record.unwrap().status, EmergencyStatus::Arrived);
    }

    #[test]
    fn terminal_record_accepts_nothing_further() {
        let (store, tag) = loaded(EmergencyStatus::Dispatched);
        store.apply_location_update(&tag, Coordinates::new(-1.3, 36.8));

        assert!(store.apply_status_update(&tag, EmergencyStatus::Cancelled, None).is_applied());
        let record = store.current().record.unwrap();
        assert!(!record.is_tracking);

        let frozen = store.current();
        assert_eq!(
            store.apply_status_update(&tag, EmergencyStatus::Completed, Some(3.0)),
            UpdateOutcome::Closed
        );
        assert_eq!(
            store.apply_status_update(&tag, EmergencyStatus::Cancelled, Some(3.0)),
            UpdateOutcome::Unchanged
        );
        assert_eq!(
            store.apply_location_update(&tag, Coordinates::new(-1.4, 36.9)),
            UpdateOutcome::Closed
        );
        assert_eq!(store.current(), frozen);
        assert!(store.is_terminal());
        assert!(!store.is_live(&tag));
    }

    #[test]
    fn responses_for_other_sessions_are_discarded() {
        let (store, old_tag) = loaded(EmergencyStatus::Pending);

        store.reset();
        let new_tag = store.begin_session(id("E-1"));
        store
            .initialize(&new_tag, snapshot_with("E-1", EmergencyStatus::Pending), DataSource::Remote)
            .unwrap();
        let before = store.current();

        assert_eq!(
            store.apply_status_update(&old_tag, EmergencyStatus::Dispatched, None),
            UpdateOutcome::Discarded
        );
        assert_eq!(
            store.apply_location_update(&old_tag, Coordinates::new(0.0, 0.0)),
            UpdateOutcome::Discarded
        );
        assert_eq!(store.record_poll_result(&old_tag, PollResource::Status, false), None);
        assert_eq!(store.current(), before);
        assert_ne!(old_tag, new_tag);
    }

    #[test]
    fn initialize_twice_is_an_error() {
        let (store, tag) = loaded(EmergencyStatus::Pending);
        let second = store.initialize(
            &tag,
            FallbackDataProvider::new().snapshot(tag.id(), Utc::now()),
            DataSource::Fallback,
        );
        assert_matches!(second, Err(TrackingError::AlreadyInitialized(_)));
        assert_eq!(store.current().source, Some(DataSource::Remote));
    }

    #[test]
    fn initialize_after_reset_is_discarded() {
        let store = EmergencyStateStore::new(3);
        let tag = store.begin_session(id("E-1"));
        store.reset();

        let outcome = store
            .initialize(&tag, snapshot_with("E-1", EmergencyStatus::Pending), DataSource::Remote)
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Discarded);
        assert!(store.current().record.is_none());
    }

    #[test]
    fn location_updates_recompute_distance() {
        let (store, tag) = loaded(EmergencyStatus::EnRoute);
        let here = Coordinates::new(-1.2921, 36.8219);

        assert!(store.set_viewer_location(&tag, here).is_applied());
        assert_eq!(store.current().ambulance_distance_km, None);

        assert!(store.apply_location_update(&tag, here).is_applied());
        assert_eq!(store.current().ambulance_distance_km, Some(0.0));

        store.apply_location_update(&tag, Coordinates::new(-1.3, 36.83));
        let km = store.current().ambulance_distance_km.unwrap();
        assert!(km > 0.5 && km < 2.0, "got {}", km);

        assert_eq!(
            store.apply_location_update(&tag, Coordinates::new(-1.3, 36.83)),
            UpdateOutcome::Unchanged
        );
    }

    #[test]
    fn each_change_notifies_once() {
        let (store, tag) = loaded(EmergencyStatus::Pending);
        let mut rx = store.subscribe();
        let start = rx.borrow_and_update().revision;

        store.apply_status_update(&tag, EmergencyStatus::Pending, None);
        assert!(!rx.has_changed().unwrap());

        store.apply_status_update(&tag, EmergencyStatus::Dispatched, None);
        store.apply_location_update(&tag, Coordinates::new(-1.3, 36.8));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().revision, start + 2);

        store.apply_status_update(&tag, EmergencyStatus::Pending, None);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn eta_refresh_on_same_status() {
        let (store, tag) = loaded(EmergencyStatus::EnRoute);
        let outcome = store.apply_status_update(&tag, EmergencyStatus::EnRoute, Some(4.0));
        assert_eq!(outcome, UpdateOutcome::Unchanged);

        let record = store.current().record.unwrap();
        assert_eq!(record.estimated_arrival_minutes, Some(4.0));
        assert_eq!(record.status_history.len(), 1);
    }

    #[test]
    fn link_health_degrades_and_recovers() {
        let (store, tag) = loaded(EmergencyStatus::EnRoute);

        assert_eq!(
            store.record_poll_result(&tag, PollResource::Status, false),
            Some(LinkHealth::Degraded { consecutive_failures: 1 })
        );
        store.record_poll_result(&tag, PollResource::Status, false);
        assert_eq!(
            store.record_poll_result(&tag, PollResource::Status, false),
            Some(LinkHealth::Lost { consecutive_failures: 3 })
        );
        // A healthy location poll does not hide a failing status poll.
        assert_eq!(
            store.record_poll_result(&tag, PollResource::Location, true),
            Some(LinkHealth::Lost { consecutive_failures: 3 })
        );
        assert_eq!(
            store.record_poll_result(&tag, PollResource::Status, true),
            Some(LinkHealth::Connected)
        );
    }
}
