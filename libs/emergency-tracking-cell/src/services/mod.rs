pub mod backend;
pub mod controller;
pub mod distance;
pub mod fallback;
pub mod geolocation;
pub mod scheduler;
pub mod store;

pub use backend::{EmergencyBackend, HttpEmergencyBackend};
pub use controller::{CancelOutcome, ConfirmCancellation, ContactLink, TrackerController, TrackerSettings};
pub use fallback::FallbackDataProvider;
pub use geolocation::{FixedLocationProvider, GeolocationAcquirer, GeolocationError, LocationProvider};
pub use scheduler::{BackoffPolicy, PollOutcome, PollingScheduler, RefreshReport};
pub use store::{EmergencyStateStore, SessionTag, TrackerState, UpdateOutcome};
