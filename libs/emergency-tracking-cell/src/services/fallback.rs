use chrono::{DateTime, Duration, Utc};

use crate::models::{
    Ambulance, Coordinates, EmergencyId, EmergencySnapshot, EmergencyStatus, EntityId, Hospital, StatusEntry,
};

/// Synthetic snapshot loaded only when the initial remote fetch fails, so the
/// tracker stays usable while the backend is unreachable.
#[derive(Debug, Clone, Default)]
pub struct FallbackDataProvider;

impl FallbackDataProvider {
    pub const AMBULANCE_LOCATION: Coordinates = Coordinates::new(-1.2921, 36.8219);

    pub fn new() -> Self {
        Self
    }

    /// Deterministic for a given `id` and `now`.
    pub fn snapshot(&self, id: &EmergencyId, now: DateTime<Utc>) -> EmergencySnapshot {
        let history = vec![
            StatusEntry {
                status: EmergencyStatus::Pending,
                timestamp: now - Duration::minutes(5),
            },
            StatusEntry {
                status: EmergencyStatus::Dispatched,
                timestamp: now - Duration::minutes(4),
            },
            StatusEntry {
                status: EmergencyStatus::EnRoute,
                timestamp: now - Duration::minutes(2),
            },
        ];

        EmergencySnapshot {
            id: id.clone(),
            status: EmergencyStatus::EnRoute,
            created_at: now - Duration::minutes(5),
            patient_name: "John Doe".to_string(),
            emergency_type: "Medical Emergency".to_string(),
            priority: "High".to_string(),
            assigned_hospital: Some(Hospital {
                id: Some(EntityId::Number(1)),
                name: "City General Hospital".to_string(),
                address: "123 Health Street, Nairobi".to_string(),
                phone: Some("+254-700-123456".to_string()),
                distance_label: Some("2.3 km".to_string()),
                location: None,
            }),
            ambulance: Some(Ambulance {
                id: "AMB-001".to_string(),
                driver_name: "Dr. Sarah Johnson".to_string(),
                phone: Some("+254-700-789012".to_string()),
                location: Some(Self::AMBULANCE_LOCATION),
            }),
            estimated_arrival_minutes: None,
            status_history: history,
            nearby_hospitals: Vec::new(),
        }
    }
}
