use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TrackingError;

// ==============================================================================
// IDENTIFIERS & COORDINATES
// ==============================================================================

/// Opaque emergency identifier as issued by the backend (e.g. `E-123`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmergencyId(String);

impl EmergencyId {
    /// Accepts any non-empty identifier that is safe to place in a URL path segment.
    pub fn parse(raw: &str) -> Result<Self, TrackingError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TrackingError::InvalidId("identifier is empty".to_string()));
        }
        if trimmed
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '%'))
        {
            return Err(TrackingError::InvalidId(format!(
                "identifier {:?} contains reserved characters",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmergencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hospital ids arrive as numbers from some backends and strings from others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Number(i64),
    Text(String),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Number(n) => write!(f, "{}", n),
            EntityId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude")]
    pub lng: f64,
}

impl Coordinates {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

// ==============================================================================
// STATUS STATE MACHINE
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyStatus {
    Pending,
    Dispatched,
    EnRoute,
    Arrived,
    Completed,
    Cancelled,
}

/// How a remotely reported status relates to the committed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    /// Moves forward (possibly skipping steps) or cancels.
    Advance,
    /// Same status as committed.
    Unchanged,
    /// Earlier than the committed status; a late response.
    Stale,
    /// Committed status is terminal; nothing may follow it.
    Closed,
}

impl EmergencyStatus {
    pub const ALL: [EmergencyStatus; 6] = [
        EmergencyStatus::Pending,
        EmergencyStatus::Dispatched,
        EmergencyStatus::EnRoute,
        EmergencyStatus::Arrived,
        EmergencyStatus::Completed,
        EmergencyStatus::Cancelled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, EmergencyStatus::Completed | EmergencyStatus::Cancelled)
    }

    /// Position along `pending < dispatched < en_route < arrived < completed`.
    /// `cancelled` sits outside the progression.
    pub fn rank(&self) -> Option<u8> {
        match self {
            EmergencyStatus::Pending => Some(0),
            EmergencyStatus::Dispatched => Some(1),
            EmergencyStatus::EnRoute => Some(2),
            EmergencyStatus::Arrived => Some(3),
            EmergencyStatus::Completed => Some(4),
            EmergencyStatus::Cancelled => None,
        }
    }

    /// Direct successors in the transition table.
    pub fn allowed_next(&self) -> &'static [EmergencyStatus] {
        use EmergencyStatus::*;
        match self {
            Pending => &[Dispatched, Cancelled],
            Dispatched => &[EnRoute, Cancelled],
            EnRoute => &[Arrived, Cancelled],
            Arrived => &[Completed, Cancelled],
            Completed | Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, target: &EmergencyStatus) -> bool {
        self.allowed_next().contains(target)
    }

    /// Classifies a remote update. Skipping intermediate steps is accepted as long
    /// as the progression never moves backwards.
    pub fn classify(&self, reported: EmergencyStatus) -> StatusTransition {
        if *self == reported {
            return StatusTransition::Unchanged;
        }
        if self.is_terminal() {
            return StatusTransition::Closed;
        }
        match (self.rank(), reported.rank()) {
            (_, None) => StatusTransition::Advance,
            (Some(current), Some(next)) if next > current => StatusTransition::Advance,
            _ => StatusTransition::Stale,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmergencyStatus::Pending => "pending",
            EmergencyStatus::Dispatched => "dispatched",
            EmergencyStatus::EnRoute => "en_route",
            EmergencyStatus::Arrived => "arrived",
            EmergencyStatus::Completed => "completed",
            EmergencyStatus::Cancelled => "cancelled",
        }
    }

    pub fn label(&self) -> String {
        self.as_str().replace('_', " ").to_uppercase()
    }

    pub fn message(&self) -> &'static str {
        match self {
            EmergencyStatus::Pending => "Emergency request received. Finding nearest ambulance...",
            EmergencyStatus::Dispatched => "Ambulance dispatched. Help is on the way!",
            EmergencyStatus::EnRoute => "Ambulance is en route to your location.",
            EmergencyStatus::Arrived => "Ambulance has arrived at your location.",
            EmergencyStatus::Completed => "Emergency response completed.",
            EmergencyStatus::Cancelled => "Emergency request was cancelled.",
        }
    }
}

impl fmt::Display for EmergencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==============================================================================
// WIRE TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: EmergencyStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hospital {
    #[serde(default)]
    pub id: Option<EntityId>,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, rename = "distance", alias = "distanceLabel")]
    pub distance_label: Option<String>,
    #[serde(default)]
    pub location: Option<Coordinates>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ambulance {
    pub id: String,
    #[serde(default)]
    pub driver_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub location: Option<Coordinates>,
}

/// Full emergency state as returned by `GET /emergency/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencySnapshot {
    pub id: EmergencyId,
    pub status: EmergencyStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub patient_name: String,
    #[serde(default)]
    pub emergency_type: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub assigned_hospital: Option<Hospital>,
    #[serde(default)]
    pub ambulance: Option<Ambulance>,
    #[serde(default, alias = "estimatedArrival")]
    pub estimated_arrival_minutes: Option<f64>,
    #[serde(default)]
    pub status_history: Vec<StatusEntry>,
    #[serde(default)]
    pub nearby_hospitals: Vec<Hospital>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: EmergencyStatus,
    #[serde(default, alias = "estimatedArrival")]
    pub estimated_arrival_minutes: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbulanceLocationReport {
    #[serde(default)]
    pub location: Option<Coordinates>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelAck {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

impl CancelAck {
    pub fn accepted() -> Self {
        Self { success: true, message: None }
    }
}

// ==============================================================================
// DOMAIN STATE
// ==============================================================================

/// Canonical state of the tracked emergency. Only `EmergencyStateStore` mutates it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyRecord {
    pub id: EmergencyId,
    pub status: EmergencyStatus,
    pub created_at: DateTime<Utc>,
    pub patient_name: String,
    pub emergency_type: String,
    pub priority: String,
    pub assigned_hospital: Option<Hospital>,
    pub ambulance: Option<Ambulance>,
    pub estimated_arrival_minutes: Option<f64>,
    pub status_history: Vec<StatusEntry>,
    pub nearby_hospitals: Vec<Hospital>,
    pub is_tracking: bool,
}

impl EmergencyRecord {
    /// Builds a record whose history ends in its current status.
    pub(crate) fn from_snapshot(id: EmergencyId, snapshot: EmergencySnapshot, now: DateTime<Utc>) -> Self {
        let mut status_history = snapshot.status_history;
        match status_history.last() {
            None => status_history.push(StatusEntry {
                status: snapshot.status,
                timestamp: snapshot.created_at,
            }),
            Some(last) if last.status != snapshot.status => status_history.push(StatusEntry {
                status: snapshot.status,
                timestamp: now,
            }),
            Some(_) => {}
        }

        Self {
            id,
            status: snapshot.status,
            created_at: snapshot.created_at,
            patient_name: snapshot.patient_name,
            emergency_type: snapshot.emergency_type,
            priority: snapshot.priority,
            assigned_hospital: snapshot.assigned_hospital,
            ambulance: snapshot.ambulance,
            estimated_arrival_minutes: snapshot.estimated_arrival_minutes,
            status_history,
            nearby_hospitals: snapshot.nearby_hospitals,
            is_tracking: !snapshot.status.is_terminal(),
        }
    }

    pub fn ambulance_location(&self) -> Option<Coordinates> {
        self.ambulance.as_ref().and_then(|a| a.location)
    }
}

/// Where the committed record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Remote,
    Fallback,
}

/// Resources refreshed on every poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollResource {
    Status,
    Location,
}

impl fmt::Display for PollResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollResource::Status => f.write_str("status"),
            PollResource::Location => f.write_str("location"),
        }
    }
}

/// Backend reachability as seen by the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LinkHealth {
    Connected,
    Degraded { consecutive_failures: u32 },
    Lost { consecutive_failures: u32 },
}

impl LinkHealth {
    pub fn from_failures(consecutive_failures: u32, lost_after: u32) -> Self {
        match consecutive_failures {
            0 => LinkHealth::Connected,
            n if n >= lost_after.max(1) => LinkHealth::Lost { consecutive_failures: n },
            n => LinkHealth::Degraded { consecutive_failures: n },
        }
    }
}
