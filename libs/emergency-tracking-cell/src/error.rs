use thiserror::Error;

use shared_backend::ApiError;
use shared_models::error::AppError;

use crate::models::EmergencyStatus;

#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Invalid emergency identifier: {0}")]
    InvalidId(String),

    #[error("No emergency is being tracked")]
    NotOpen,

    #[error("Emergency {0} has not finished loading")]
    NotReady(String),

    #[error("Tracking session for {0} was closed before the operation completed")]
    SessionClosed(String),

    #[error("Emergency {0} is already initialized; reset before loading another snapshot")]
    AlreadyInitialized(String),

    #[error("Emergency {id} is already {status}")]
    AlreadyTerminal { id: String, status: EmergencyStatus },

    #[error("Cancellation request failed: {0}")]
    CancellationFailed(#[source] ApiError),

    #[error("Cancellation was rejected by the backend: {0}")]
    CancellationRejected(String),

    #[error("Backend error: {0}")]
    Remote(#[from] ApiError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<TrackingError> for AppError {
    fn from(err: TrackingError) -> Self {
        match err {
            TrackingError::InvalidId(_) => AppError::BadRequest(err.to_string()),
            TrackingError::NotOpen | TrackingError::SessionClosed(_) => AppError::NotFound(err.to_string()),
            TrackingError::NotReady(_)
            | TrackingError::AlreadyInitialized(_)
            | TrackingError::AlreadyTerminal { .. } => AppError::Conflict(err.to_string()),
            TrackingError::CancellationFailed(_)
            | TrackingError::CancellationRejected(_)
            | TrackingError::Remote(_) => AppError::ExternalService(err.to_string()),
            TrackingError::Configuration(_) => AppError::Internal(err.to_string()),
        }
    }
}
