use super::{endpoint, ConnectorError, ProbeClient, RegistryConnector};
use crate::draft::RegistryPayload;
use async_trait::async_trait;
use log::debug;

/// Logs in against Docker Hub's account API.
#[derive(Debug, Clone)]
pub struct DockerHubConnector {
    probe: ProbeClient,
}

impl DockerHubConnector {
    pub fn new(probe: ProbeClient) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl RegistryConnector for DockerHubConnector {
    async fn test_connection(&self, payload: &RegistryPayload) -> Result<(), ConnectorError> {
        let url = endpoint(payload.field("address"), "v2/users/login")?;
        debug!("Probing Docker Hub at {}", url);

        let builder = self.probe.http().post(url).json(&serde_json::json!({
            "username": payload.field("username"),
            "password": payload.field("password"),
        }));
        self.probe.send(builder).await
    }
}
