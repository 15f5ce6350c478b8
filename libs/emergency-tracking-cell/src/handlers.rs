use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::error::TrackingError;
use crate::models::{Coordinates, EmergencyId};
use crate::services::backend::{EmergencyBackend, HttpEmergencyBackend};
use crate::services::controller::{CancelOutcome, ContactLink, TrackerController, TrackerSettings};
use crate::services::geolocation::{FixedLocationProvider, GeolocationAcquirer};
use crate::services::scheduler::RefreshReport;
use crate::view::TrackerView;

// ==============================================================================
// REQUEST / RESPONSE BODIES
// ==============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenTrackerRequest {
    /// Position the host already knows; otherwise the configured fallback is used.
    pub viewer_location: Option<Coordinates>,
}

#[derive(Debug, Deserialize)]
pub struct CancelTrackerRequest {
    pub confirmed: bool,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub report: RefreshReport,
    pub view: TrackerView,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub outcome: CancelOutcome,
    pub view: TrackerView,
}

#[derive(Debug, Serialize)]
pub struct ContactsResponse {
    pub ambulance: Option<ContactLink>,
    pub hospital: Option<ContactLink>,
}

// ==============================================================================
// HANDLER STATE
// ==============================================================================

/// One controller per open emergency.
pub struct TrackingHandlers {
    settings: TrackerSettings,
    backend: Arc<dyn EmergencyBackend>,
    trackers: RwLock<HashMap<EmergencyId, Arc<TrackerController>>>,
}

impl TrackingHandlers {
    pub fn new(config: Arc<AppConfig>) -> Result<Self, TrackingError> {
        if !config.is_configured() {
            warn!("EMERGENCY_API_URL is empty; every tracker will show fallback data");
        }

        let backend = HttpEmergencyBackend::new(&config)
            .map_err(|e| TrackingError::Configuration(format!("Failed to build emergency API client: {}", e)))?;

        Ok(Self::with_backend(
            Arc::new(backend),
            TrackerSettings::from_config(&config),
        ))
    }

    pub fn with_backend(backend: Arc<dyn EmergencyBackend>, settings: TrackerSettings) -> Self {
        Self {
            settings,
            backend,
            trackers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn open_count(&self) -> usize {
        self.trackers.read().await.len()
    }

    async fn tracker(&self, id: &EmergencyId) -> Result<Arc<TrackerController>, AppError> {
        self.trackers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("No tracker open for emergency {}", id)))
    }

    fn geolocation(&self, viewer_location: Option<Coordinates>) -> GeolocationAcquirer {
        let fallback = self.settings.fallback_location;
        match viewer_location {
            Some(location) => GeolocationAcquirer::new(
                Arc::new(FixedLocationProvider(location)),
                fallback,
                self.settings.geolocation_timeout,
            ),
            None => GeolocationAcquirer::unsupported(fallback),
        }
    }
}

fn parse_id(raw: &str) -> Result<EmergencyId, AppError> {
    EmergencyId::parse(raw).map_err(AppError::from)
}

// ==============================================================================
// TRACKER HANDLERS
// ==============================================================================

#[instrument(skip(handlers, request))]
pub async fn open_tracker(
    State(handlers): State<Arc<TrackingHandlers>>,
    Path(emergency_id): Path<String>,
    Json(request): Json<OpenTrackerRequest>,
) -> Result<Json<TrackerView>, AppError> {
    let id = parse_id(&emergency_id)?;

    let controller = {
        let mut trackers = handlers.trackers.write().await;
        let controller = trackers.entry(id.clone()).or_insert_with(|| {
            Arc::new(TrackerController::with_backend(
                Arc::clone(&handlers.backend),
                handlers.geolocation(request.viewer_location),
                &handlers.settings,
            ))
        });
        Arc::clone(controller)
    };

    let view = controller.open(id).await?;
    Ok(Json(view))
}

#[instrument(skip(handlers))]
pub async fn get_tracker(
    State(handlers): State<Arc<TrackingHandlers>>,
    Path(emergency_id): Path<String>,
) -> Result<Json<TrackerView>, AppError> {
    let id = parse_id(&emergency_id)?;
    let controller = handlers.tracker(&id).await?;
    Ok(Json(controller.view()))
}

#[instrument(skip(handlers))]
pub async fn refresh_tracker(
    State(handlers): State<Arc<TrackingHandlers>>,
    Path(emergency_id): Path<String>,
) -> Result<Json<RefreshResponse>, AppError> {
    let id = parse_id(&emergency_id)?;
    let controller = handlers.tracker(&id).await?;

    let report = controller.refresh_now().await?;
    Ok(Json(RefreshResponse {
        report,
        view: controller.view(),
    }))
}

#[instrument(skip(handlers, request))]
pub async fn cancel_tracker(
    State(handlers): State<Arc<TrackingHandlers>>,
    Path(emergency_id): Path<String>,
    Json(request): Json<CancelTrackerRequest>,
) -> Result<Json<CancelResponse>, AppError> {
    let id = parse_id(&emergency_id)?;
    let controller = handlers.tracker(&id).await?;

    let outcome = controller.cancel(&request.confirmed).await?;
    Ok(Json(CancelResponse {
        outcome,
        view: controller.view(),
    }))
}

#[instrument(skip(handlers))]
pub async fn get_contacts(
    State(handlers): State<Arc<TrackingHandlers>>,
    Path(emergency_id): Path<String>,
) -> Result<Json<ContactsResponse>, AppError> {
    let id = parse_id(&emergency_id)?;
    let controller = handlers.tracker(&id).await?;

    Ok(Json(ContactsResponse {
        ambulance: controller.contact_ambulance(),
        hospital: controller.contact_hospital(),
    }))
}

/// Closing an unknown or already-closed tracker is not an error.
#[instrument(skip(handlers))]
pub async fn close_tracker(
    State(handlers): State<Arc<TrackingHandlers>>,
    Path(emergency_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&emergency_id)?;

    if let Some(controller) = handlers.trackers.write().await.remove(&id) {
        controller.close();
        info!("Closed tracker for {}", id);
    }

    Ok(StatusCode::NO_CONTENT)
}
