use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;

use crate::error::TrackingError;
use crate::handlers::*;

/// Tracker routes, meant to be nested under `/emergency`.
pub fn emergency_tracking_routes(config: Arc<AppConfig>) -> Result<Router, TrackingError> {
    let handlers = Arc::new(TrackingHandlers::new(config)?);
    Ok(tracking_router(handlers))
}

pub fn tracking_router(handlers: Arc<TrackingHandlers>) -> Router {
    Router::new()
        .route(
            "/trackers/{emergency_id}",
            post(open_tracker).get(get_tracker).delete(close_tracker),
        )
        .route("/trackers/{emergency_id}/refresh", post(refresh_tracker))
        .route("/trackers/{emergency_id}/cancel", post(cancel_tracker))
        .route("/trackers/{emergency_id}/contacts", get(get_contacts))
        .with_state(handlers)
}
