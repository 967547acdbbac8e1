use super::config::Config;
use crate::draft::RegistryPayload;
use crate::error_translator::{decode_response, DomainError};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use thiserror::Error;

const REGISTRY_COLLECTION: &str = "moove/config/registry";

#[derive(Debug, Error)]
pub enum PlatformApiError {
    #[error("Request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("{0}")]
    UnauthorizedError(DomainError),

    #[error("{0}")]
    ApiStatusError(DomainError),

    #[error("DeserializationError: {0}")]
    DeserializationError(String),
}

impl PlatformApiError {
    /// The translated upstream error, when the platform answered at all.
    pub fn domain_error(&self) -> Option<&DomainError> {
        match self {
            PlatformApiError::UnauthorizedError(error) | PlatformApiError::ApiStatusError(error) => {
                Some(error)
            }
            _ => None,
        }
    }
}

/// A registry configuration as stored by the platform.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfiguration {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Where verified credentials end up. The server re-validates independently,
/// so a verified draft may still be refused here.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn create(&self, payload: &RegistryPayload)
        -> Result<RegistryConfiguration, PlatformApiError>;

    async fn revalidate(&self, configuration_id: &str) -> Result<(), PlatformApiError>;
}

/// Client for the deployment platform's registry configuration API.
#[derive(Debug, Clone)]
pub struct PlatformApi {
    api_url: String,
    api_token: Option<String>,
    workspace_id: Option<String>,
    client: reqwest::Client,
}

pub fn from_config(config: &Config) -> Result<PlatformApi, PlatformApiError> {
    PlatformApi::new(
        config.api_url.clone(),
        config.api_token.clone(),
        config.workspace_id.clone(),
    )
}

impl PlatformApi {
    pub fn new(
        api_url: String,
        api_token: Option<String>,
        workspace_id: Option<String>,
    ) -> Result<Self, PlatformApiError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("registry-gate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_token,
            workspace_id,
            client,
        })
    }

    /// Asks the platform to probe the registry with the given values.
    pub async fn validate_registry(&self, payload: &RegistryPayload) -> Result<(), PlatformApiError> {
        let res = self
            .post(&format!("{}/validation", REGISTRY_COLLECTION))
            .json(payload)
            .send()
            .await?;
        if res.status().is_success() {
            Ok(())
        } else {
            Err(process_api_status_error_from_response(res).await)
        }
    }

    /// Persists a registry configuration.
    pub async fn create_registry(
        &self,
        payload: &RegistryPayload,
    ) -> Result<RegistryConfiguration, PlatformApiError> {
        let res = self.post(REGISTRY_COLLECTION).json(payload).send().await?;
        if res.status().is_success() {
            res.json::<RegistryConfiguration>()
                .await
                .map_err(|e| PlatformApiError::DeserializationError(e.to_string()))
        } else {
            Err(process_api_status_error_from_response(res).await)
        }
    }

    /// Re-checks the connectivity of an already persisted configuration.
    pub async fn validate_configuration(
        &self,
        configuration_id: &str,
    ) -> Result<(), PlatformApiError> {
        let res = self
            .post(&format!("{}/connection-validation", REGISTRY_COLLECTION))
            .json(&serde_json::json!({ "configurationId": configuration_id }))
            .send()
            .await?;
        if res.status().is_success() {
            Ok(())
        } else {
            Err(process_api_status_error_from_response(res).await)
        }
    }

    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        debug!("POST {}/{}", self.api_url, path);
        let mut builder = self.client.post(format!("{}/{}", self.api_url, path));
        if let Some(token) = &self.api_token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        if let Some(workspace_id) = &self.workspace_id {
            builder = builder.header("x-workspace-id", workspace_id);
        }
        builder
    }
}

#[async_trait]
impl PersistenceGateway for PlatformApi {
    async fn create(
        &self,
        payload: &RegistryPayload,
    ) -> Result<RegistryConfiguration, PlatformApiError> {
        self.create_registry(payload).await
    }

    async fn revalidate(&self, configuration_id: &str) -> Result<(), PlatformApiError> {
        self.validate_configuration(configuration_id).await
    }
}

pub async fn process_api_status_error_from_response(res: reqwest::Response) -> PlatformApiError {
    let status = res.status().as_u16();
    let error = match decode_response(res).await {
        Ok(error) => error,
        Err(e) => return PlatformApiError::RequestError(e),
    };
    if status == 401 || status == 403 {
        PlatformApiError::UnauthorizedError(error)
    } else {
        PlatformApiError::ApiStatusError(error)
    }
}
