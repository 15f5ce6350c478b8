#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use emergency_tracking_cell::models::{
    Ambulance, AmbulanceLocationReport, CancelAck, Coordinates, EmergencyId, EmergencySnapshot, EmergencyStatus,
    Hospital, StatusEntry, StatusReport,
};
use emergency_tracking_cell::services::EmergencyBackend;
use shared_backend::ApiError;

pub const AMBULANCE_START: Coordinates = Coordinates::new(-1.30, 36.80);

pub fn emergency_id(raw: &str) -> EmergencyId {
    EmergencyId::parse(raw).unwrap()
}

pub fn snapshot(raw_id: &str, status: EmergencyStatus) -> EmergencySnapshot {
    let created_at = Utc::now() - ChronoDuration::minutes(3);
    EmergencySnapshot {
        id: emergency_id(raw_id),
        status,
        created_at,
        patient_name: "Jane Roe".to_string(),
        emergency_type: "Cardiac".to_string(),
        priority: "Critical".to_string(),
        assigned_hospital: Some(Hospital {
            id: None,
            name: "Riverside Hospital".to_string(),
            address: "4 River Road".to_string(),
            phone: Some("(020) 555-0100".to_string()),
            distance_label: None,
            location: None,
        }),
        ambulance: Some(Ambulance {
            id: "AMB-42".to_string(),
            driver_name: "Sam Otieno".to_string(),
            phone: Some("+254 711 000 042".to_string()),
            location: Some(AMBULANCE_START),
        }),
        estimated_arrival_minutes: Some(12.0),
        status_history: vec![StatusEntry {
            status,
            timestamp: created_at,
        }],
        nearby_hospitals: Vec::new(),
    }
}

fn unavailable() -> ApiError {
    ApiError::Status {
        status: 503,
        body: "service unavailable".to_string(),
    }
}

/// In-memory backend with settable responses. `None` means the request fails.
pub struct ScriptedBackend {
    snapshot: Mutex<Option<EmergencySnapshot>>,
    status: Mutex<Option<StatusReport>>,
    location: Mutex<Option<AmbulanceLocationReport>>,
    cancel: Mutex<Option<CancelAck>>,
    status_delay: Mutex<Duration>,
    pub snapshot_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub location_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
    status_outstanding: AtomicUsize,
    pub max_status_outstanding: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(snapshot: EmergencySnapshot) -> Self {
        let status = StatusReport {
            status: snapshot.status,
            estimated_arrival_minutes: snapshot.estimated_arrival_minutes,
        };
        let location = AmbulanceLocationReport {
            location: snapshot.ambulance.as_ref().and_then(|a| a.location),
        };
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            status: Mutex::new(Some(status)),
            location: Mutex::new(Some(location)),
            cancel: Mutex::new(Some(CancelAck::accepted())),
            status_delay: Mutex::new(Duration::ZERO),
            snapshot_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            location_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            status_outstanding: AtomicUsize::new(0),
            max_status_outstanding: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        let backend = Self::new(snapshot("E-0", EmergencyStatus::Pending));
        backend.fail_snapshot();
        backend.fail_polls();
        backend.fail_cancel();
        backend
    }

    pub fn set_snapshot(&self, snapshot: EmergencySnapshot) {
        *self.snapshot.lock().unwrap() = Some(snapshot);
    }

    pub fn fail_snapshot(&self) {
        *self.snapshot.lock().unwrap() = None;
    }

    pub fn report_status(&self, status: EmergencyStatus, eta: Option<f64>) {
        *self.status.lock().unwrap() = Some(StatusReport {
            status,
            estimated_arrival_minutes: eta,
        });
    }

    pub fn report_location(&self, location: Option<Coordinates>) {
        *self.location.lock().unwrap() = Some(AmbulanceLocationReport { location });
    }

    pub fn fail_polls(&self) {
        *self.status.lock().unwrap() = None;
        *self.location.lock().unwrap() = None;
    }

    pub fn acknowledge_cancel(&self, ack: CancelAck) {
        *self.cancel.lock().unwrap() = Some(ack);
    }

    pub fn fail_cancel(&self) {
        *self.cancel.lock().unwrap() = None;
    }

    pub fn delay_status(&self, delay: Duration) {
        *self.status_delay.lock().unwrap() = delay;
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn location_calls(&self) -> usize {
        self.location_calls.load(Ordering::SeqCst)
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmergencyBackend for ScriptedBackend {
    async fn fetch_snapshot(&self, id: &EmergencyId) -> Result<EmergencySnapshot, ApiError> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.snapshot.lock().unwrap().clone();
        snapshot
            .map(|mut snapshot| {
                snapshot.id = id.clone();
                snapshot
            })
            .ok_or_else(unavailable)
    }

    async fn fetch_status(&self, _id: &EmergencyId) -> Result<StatusReport, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let outstanding = self.status_outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_status_outstanding.fetch_max(outstanding, Ordering::SeqCst);

        let delay = *self.status_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.status_outstanding.fetch_sub(1, Ordering::SeqCst);
        let report = self.status.lock().unwrap().clone();
        report.ok_or_else(unavailable)
    }

    async fn fetch_ambulance_location(&self, _id: &EmergencyId) -> Result<AmbulanceLocationReport, ApiError> {
        self.location_calls.fetch_add(1, Ordering::SeqCst);
        let report = self.location.lock().unwrap().clone();
        report.ok_or_else(unavailable)
    }

    async fn cancel_emergency(&self, _id: &EmergencyId) -> Result<CancelAck, ApiError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        let ack = self.cancel.lock().unwrap().clone();
        ack.ok_or_else(unavailable)
    }
}
