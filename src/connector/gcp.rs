use super::{endpoint, ConnectorError, ProbeClient, RegistryConnector};
use crate::draft::RegistryPayload;
use async_trait::async_trait;
use log::debug;

// Google registries accept a service account key as the basic auth password
// of this fixed user.
const JSON_KEY_USER: &str = "_json_key";

/// Lists the tags under the project of a Google container registry.
#[derive(Debug, Clone)]
pub struct GcpConnector {
    probe: ProbeClient,
}

impl GcpConnector {
    pub fn new(probe: ProbeClient) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl RegistryConnector for GcpConnector {
    async fn test_connection(&self, payload: &RegistryPayload) -> Result<(), ConnectorError> {
        let project = payload.field("organization").trim();
        let url = endpoint(
            payload.field("address"),
            &format!("v2/{}/tags/list", project),
        )?;
        debug!("Probing GCP registry for project {}", project);

        let builder = self
            .probe
            .http()
            .get(url)
            .basic_auth(JSON_KEY_USER, Some(payload.field("jsonKey")));
        self.probe.send(builder).await
    }
}
