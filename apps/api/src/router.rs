use std::sync::Arc;

use axum::{routing::get, Router};

use emergency_tracking_cell::router::emergency_tracking_routes;
use emergency_tracking_cell::TrackingError;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Result<Router, TrackingError> {
    Ok(Router::new()
        .route("/", get(|| async { "MediLink API is running!" }))
        .nest("/emergency", emergency_tracking_routes(state)?))
}
