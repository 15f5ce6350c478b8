use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Coordinates, DataSource, EmergencyId, EmergencyRecord, EmergencyStatus, Hospital, LinkHealth};
use crate::services::distance::{distance_km, format_distance, round_to, DistanceUnit};
use crate::services::store::TrackerState;

/// What the host renders for a tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TrackerView {
    Idle,
    Loading { id: EmergencyId },
    Tracking(Box<TrackingDetails>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingDetails {
    pub id: EmergencyId,
    pub status: EmergencyStatus,
    pub status_label: String,
    pub status_message: String,
    pub estimated_arrival_minutes: Option<f64>,
    pub eta_label: Option<String>,
    pub patient_name: String,
    pub emergency_type: String,
    pub priority: String,
    pub created_at: DateTime<Utc>,
    pub requested_at: String,
    pub assigned_hospital: Option<Hospital>,
    pub ambulance: Option<AmbulanceView>,
    pub history: Vec<HistoryItem>,
    pub nearby_hospitals: Vec<NearbyHospital>,
    pub viewer_location: Option<Coordinates>,
    pub can_cancel: bool,
    pub is_tracking: bool,
    pub data_source: Option<DataSource>,
    pub link_health: LinkHealth,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmbulanceView {
    pub id: String,
    pub driver_name: String,
    pub phone: Option<String>,
    pub location: Option<Coordinates>,
    /// Kilometres from the viewer, one decimal.
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub status: EmergencyStatus,
    pub label: String,
    pub timestamp: DateTime<Utc>,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyHospital {
    #[serde(flatten)]
    pub hospital: Hospital,
    pub distance_km: Option<f64>,
    pub distance_text: Option<String>,
}

impl TrackerView {
    pub fn render(state: &TrackerState) -> Self {
        match (&state.session, &state.record) {
            (_, Some(record)) => TrackerView::Tracking(Box::new(TrackingDetails::render(record, state))),
            (Some(tag), None) => TrackerView::Loading { id: tag.id().clone() },
            (None, None) => TrackerView::Idle,
        }
    }

    pub fn details(&self) -> Option<&TrackingDetails> {
        match self {
            TrackerView::Tracking(details) => Some(&**details),
            _ => None,
        }
    }
}

impl TrackingDetails {
    fn render(record: &EmergencyRecord, state: &TrackerState) -> Self {
        let ambulance = record.ambulance.as_ref().map(|ambulance| AmbulanceView {
            id: ambulance.id.clone(),
            driver_name: ambulance.driver_name.clone(),
            phone: ambulance.phone.clone(),
            location: ambulance.location,
            distance_km: state.ambulance_distance_km.map(|km| round_to(km, 1)),
        });

        let history = record
            .status_history
            .iter()
            .map(|entry| HistoryItem {
                status: entry.status,
                label: entry.status.label(),
                timestamp: entry.timestamp,
                time: format_time(entry.timestamp),
            })
            .collect();

        Self {
            id: record.id.clone(),
            status: record.status,
            status_label: record.status.label(),
            status_message: record.status.message().to_string(),
            estimated_arrival_minutes: record.estimated_arrival_minutes,
            eta_label: record
                .estimated_arrival_minutes
                .map(|minutes| format!("ETA: {} minutes", round_to(minutes, 0))),
            patient_name: record.patient_name.clone(),
            emergency_type: record.emergency_type.clone(),
            priority: record.priority.clone(),
            created_at: record.created_at,
            requested_at: format_time(record.created_at),
            assigned_hospital: record.assigned_hospital.clone(),
            ambulance,
            history,
            nearby_hospitals: sort_by_distance(state.viewer_location, &record.nearby_hospitals),
            viewer_location: state.viewer_location,
            can_cancel: !record.status.is_terminal(),
            is_tracking: record.is_tracking,
            data_source: state.source,
            link_health: state.link_health,
        }
    }
}

fn format_time(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%I:%M %p").to_string()
}

/// Hospitals with a known location first, nearest first; the rest keep their order.
fn sort_by_distance(viewer: Option<Coordinates>, hospitals: &[Hospital]) -> Vec<NearbyHospital> {
    let mut nearby: Vec<NearbyHospital> = hospitals
        .iter()
        .map(|hospital| {
            let distance = match (viewer, hospital.location) {
                (Some(viewer), Some(location)) => Some(distance_km(viewer, location)),
                _ => None,
            };
            NearbyHospital {
                hospital: hospital.clone(),
                distance_km: distance.map(|km| round_to(km, 2)),
                distance_text: distance.map(|km| format_distance(km, DistanceUnit::Kilometers)),
            }
        })
        .collect();

    nearby.sort_by(|a, b| match (a.distance_km, b.distance_km) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    nearby
}
