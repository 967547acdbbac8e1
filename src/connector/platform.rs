use super::{network_error, timeout_message, ConnectorError, RegistryConnector};
use crate::draft::RegistryPayload;
use crate::platform_api::{PlatformApi, PlatformApiError};
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

/// Lets the platform run the probe through its validation endpoint, for
/// deployments where only the platform can reach the registries.
#[derive(Debug, Clone)]
pub struct PlatformConnector {
    api: Arc<PlatformApi>,
    timeout: Duration,
}

impl PlatformConnector {
    pub fn new(api: Arc<PlatformApi>, timeout: Duration) -> Self {
        Self { api, timeout }
    }
}

#[async_trait]
impl RegistryConnector for PlatformConnector {
    async fn test_connection(&self, payload: &RegistryPayload) -> Result<(), ConnectorError> {
        debug!(
            "Delegating {} probe to the platform",
            payload.provider_kind
        );
        match tokio::time::timeout(self.timeout, self.api.validate_registry(payload)).await {
            Err(_) => Err(ConnectorError::NetworkError(timeout_message(self.timeout))),
            Ok(Ok(())) => Ok(()),
            Ok(Err(PlatformApiError::RequestError(e))) => Err(network_error(e, self.timeout)),
            Ok(Err(PlatformApiError::UnauthorizedError(error))) => {
                Err(ConnectorError::AuthError(error))
            }
            Ok(Err(PlatformApiError::ApiStatusError(error))) => {
                Err(ConnectorError::UpstreamError(error))
            }
            Ok(Err(PlatformApiError::DeserializationError(message))) => {
                Err(ConnectorError::NetworkError(message))
            }
        }
    }
}
