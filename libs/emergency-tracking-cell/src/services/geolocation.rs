use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::models::Coordinates;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeolocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable: {0}")]
    PositionUnavailable(String),

    #[error("location request timed out")]
    Timeout,
}

/// Source of the viewer's device position.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, GeolocationError>;
}

/// Position reported by the host (e.g. forwarded from the browser).
#[derive(Debug, Clone, Copy)]
pub struct FixedLocationProvider(pub Coordinates);

#[async_trait]
impl LocationProvider for FixedLocationProvider {
    async fn current_position(&self) -> Result<Coordinates, GeolocationError> {
        Ok(self.0)
    }
}

/// One-shot acquisition of the viewer's coordinates. Never fails: denial,
/// timeout, invalid readings, or a missing provider all yield the fallback.
#[derive(Clone)]
pub struct GeolocationAcquirer {
    provider: Option<Arc<dyn LocationProvider>>,
    fallback: Coordinates,
    timeout: Duration,
}

impl GeolocationAcquirer {
    pub fn new(provider: Arc<dyn LocationProvider>, fallback: Coordinates, timeout: Duration) -> Self {
        Self {
            provider: Some(provider),
            fallback,
            timeout,
        }
    }

    /// Acquirer for hosts without any location capability.
    pub fn unsupported(fallback: Coordinates) -> Self {
        Self {
            provider: None,
            fallback,
            timeout: Duration::ZERO,
        }
    }

    pub fn fallback(&self) -> Coordinates {
        self.fallback
    }

    pub async fn acquire(&self) -> Coordinates {
        let Some(provider) = &self.provider else {
            warn!("Geolocation is not supported, using fallback location");
            return self.fallback;
        };

        let outcome = match tokio::time::timeout(self.timeout, provider.current_position()).await {
            Ok(result) => result,
            Err(_) => Err(GeolocationError::Timeout),
        };

        match outcome {
            Ok(coords) if coords.is_valid() => {
                debug!("Acquired viewer location {:?}", coords);
                coords
            }
            Ok(coords) => {
                warn!("Ignoring out-of-range location {:?}, using fallback", coords);
                self.fallback
            }
            Err(e) => {
                warn!("Error getting location: {}; using fallback", e);
                self.fallback
            }
        }
    }
}
