use super::{endpoint, ConnectorError, ProbeClient, RegistryConnector};
use crate::draft::RegistryPayload;
use async_trait::async_trait;
use log::debug;

/// Lists one repository of an Azure Container Registry with basic auth.
#[derive(Debug, Clone)]
pub struct AzureConnector {
    probe: ProbeClient,
}

impl AzureConnector {
    pub fn new(probe: ProbeClient) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl RegistryConnector for AzureConnector {
    async fn test_connection(&self, payload: &RegistryPayload) -> Result<(), ConnectorError> {
        let url = endpoint(payload.field("address"), "v2/_catalog?n=1")?;
        debug!("Probing Azure registry at {}", url.path());

        let builder = self
            .probe
            .http()
            .get(url)
            .basic_auth(payload.field("username"), Some(payload.field("password")));
        self.probe.send(builder).await
    }
}
