use async_trait::async_trait;
use tracing::{debug, instrument};

use shared_backend::{ApiClient, ApiError, Method};
use shared_config::AppConfig;

use crate::models::{AmbulanceLocationReport, CancelAck, EmergencyId, EmergencySnapshot, StatusReport};

/// Remote collaborator consumed by the tracker.
#[async_trait]
pub trait EmergencyBackend: Send + Sync {
    async fn fetch_snapshot(&self, id: &EmergencyId) -> Result<EmergencySnapshot, ApiError>;

    async fn fetch_status(&self, id: &EmergencyId) -> Result<StatusReport, ApiError>;

    async fn fetch_ambulance_location(&self, id: &EmergencyId) -> Result<AmbulanceLocationReport, ApiError>;

    async fn cancel_emergency(&self, id: &EmergencyId) -> Result<CancelAck, ApiError>;
}

/// `EmergencyBackend` over the REST API:
///
/// - `GET  /emergency/{id}`
/// - `GET  /emergency/{id}/status`
/// - `GET  /emergency/{id}/ambulance/location`
/// - `POST /emergency/{id}/cancel`
pub struct HttpEmergencyBackend {
    client: ApiClient,
}

impl HttpEmergencyBackend {
    pub fn new(config: &AppConfig) -> Result<Self, ApiError> {
        Ok(Self {
            client: ApiClient::new(config)?,
        })
    }

    pub fn base_url(&self) -> &str {
        self.client.get_base_url()
    }
}

#[async_trait]
impl EmergencyBackend for HttpEmergencyBackend {
    #[instrument(skip(self), fields(emergency_id = %id))]
    async fn fetch_snapshot(&self, id: &EmergencyId) -> Result<EmergencySnapshot, ApiError> {
        self.client
            .request(Method::GET, &format!("/emergency/{}", id), None)
            .await
    }

    async fn fetch_status(&self, id: &EmergencyId) -> Result<StatusReport, ApiError> {
        self.client
            .request(Method::GET, &format!("/emergency/{}/status", id), None)
            .await
    }

    async fn fetch_ambulance_location(&self, id: &EmergencyId) -> Result<AmbulanceLocationReport, ApiError> {
        self.client
            .request(Method::GET, &format!("/emergency/{}/ambulance/location", id), None)
            .await
    }

    #[instrument(skip(self), fields(emergency_id = %id))]
    async fn cancel_emergency(&self, id: &EmergencyId) -> Result<CancelAck, ApiError> {
        let ack = self
            .client
            .request_optional::<CancelAck>(Method::POST, &format!("/emergency/{}/cancel", id), None)
            .await?;

        // Any 2xx without a body counts as an acknowledgement.
        let ack = ack.unwrap_or_else(CancelAck::accepted);
        debug!("Cancellation acknowledged: {:?}", ack);
        Ok(ack)
    }
}
