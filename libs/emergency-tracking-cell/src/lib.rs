//! # Emergency Tracking Cell
//!
//! Live tracking of an emergency request: its status lifecycle, the assigned
//! ambulance's position, and the viewer's distance to it.
//!
//! ## Features
//!
//! - **Status Lifecycle**: `pending -> dispatched -> en_route -> arrived -> completed`,
//!   with `cancelled` reachable from any open state. Stale reports never move a status back.
//! - **Periodic Polling**: status and ambulance location refreshed on a fixed interval
//!   until the emergency is finished or the tracker is closed
//! - **Fallback Data**: a synthetic record is shown when the backend is unreachable
//! - **Viewer Geolocation**: one-shot position lookup with a configured fallback
//! - **Cancellation**: confirmed, backend-acknowledged cancellation
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------+
//! |                Emergency Tracking Cell              |
//! +-----------------------------------------------------+
//! |  handlers.rs    |  HTTP endpoint handlers           |
//! |  router.rs      |  Route definitions                |
//! |  models.rs      |  Domain types & wire DTOs         |
//! |  view.rs        |  Render model for the host        |
//! |  services/      |  Business logic layer             |
//! |    backend.rs   |  Emergency REST API client        |
//! |    store.rs     |  Session-tagged state store       |
//! |    scheduler.rs |  Polling loop                     |
//! |    controller.rs|  Open / cancel / refresh / close  |
//! +-----------------------------------------------------+
//! ```
//!
//! ## API Endpoints
//!
//! - `POST /emergency/trackers/{id}` - Open a tracker
//! - `GET /emergency/trackers/{id}` - Current view
//! - `POST /emergency/trackers/{id}/refresh` - Refresh status and location now
//! - `POST /emergency/trackers/{id}/cancel` - Cancel the emergency
//! - `GET /emergency/trackers/{id}/contacts` - Ambulance and hospital `tel:` links
//! - `DELETE /emergency/trackers/{id}` - Close the tracker
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use emergency_tracking_cell::router::emergency_tracking_routes;
//! use shared_config::AppConfig;
//! use std::sync::Arc;
//!
//! let config = Arc::new(AppConfig::from_env());
//! let routes = emergency_tracking_routes(config).expect("emergency routes");
//! ```
//!
//! ## Configuration
//!
//! - `EMERGENCY_API_URL` - Emergency API base URL
//! - `EMERGENCY_API_TOKEN` - Bearer token (optional)
//! - `TRACKER_POLL_INTERVAL_SECONDS` - Polling period (default 30)

pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod view;

pub use error::TrackingError;
pub use models::{
    Ambulance, Coordinates, DataSource, EmergencyId, EmergencyRecord, EmergencySnapshot, EmergencyStatus,
    Hospital, LinkHealth, StatusEntry,
};
pub use services::{
    EmergencyBackend, EmergencyStateStore, HttpEmergencyBackend, PollingScheduler, TrackerController,
    TrackerSettings,
};
pub use view::{TrackerView, TrackingDetails};

pub use router::emergency_tracking_routes;
