use std::sync::Arc;

// Wires configuration, platform client and connectors together, so the
// binary and the tests drive forms the same way.
use super::config::{Config, CredentialArgs, ProviderArgs};
use crate::connector::{ConnectorError, Connectors};
use crate::gate::{ConnectionTestResult, TestStatus};
use crate::platform_api::{self, PlatformApi, PlatformApiError, RegistryConfiguration};
use crate::provider::{ProviderKind, SchemaVariant};
use crate::schema::{self, FieldError, FieldKind, FieldSpec};
use crate::session::{FormSession, SessionError, SubmitError};
use log::{debug, info};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryGateError {
    #[error("Api Error: ({0})")]
    PlatformApiError(#[from] PlatformApiError),
    #[error("{0}")]
    SessionError(#[from] SessionError),
    #[error("{0}")]
    SubmitError(#[from] SubmitError),
    #[error("Connection test failed: {0}")]
    ConnectionTestFailed(ConnectorError),
}

pub struct RegistryGate {
    config: Config,
    api: Arc<PlatformApi>,
    connectors: Arc<Connectors>,
}

impl RegistryGate {
    pub fn new(config: Config) -> Result<Self, RegistryGateError> {
        debug!("Config read: {:?}", config);
        let api = Arc::new(platform_api::from_config(&config)?);
        let connectors = Connectors::from_config(&config, Arc::clone(&api))
            .map_err(PlatformApiError::from)?;
        Ok(Self {
            config,
            api,
            connectors: Arc::new(connectors),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn open_session(&self) -> FormSession {
        FormSession::new(Arc::clone(&self.connectors), self.api.clone())
    }

    /// Opens a session with every value from `args` entered.
    pub fn fill(&self, args: &CredentialArgs) -> Result<FormSession, RegistryGateError> {
        let mut session = self.open_session();
        session.select_provider(args.provider.provider);
        if let Some(mode) = args.provider.aws_auth_mode {
            session.set_aws_auth_mode(mode)?;
        }
        for (key, value) in args.fields.iter() {
            session.set_field(key, value.as_str())?;
        }
        Ok(session)
    }

    pub fn validate(&self, args: &CredentialArgs) -> Result<Vec<FieldError>, RegistryGateError> {
        Ok(self.fill(args)?.field_errors())
    }

    pub async fn test(&self, args: &CredentialArgs) -> Result<ConnectionTestResult, RegistryGateError> {
        let mut session = self.fill(args)?;
        session.request_test()?;
        session.wait_for_probe().await;
        session
            .result()
            .cloned()
            .ok_or(RegistryGateError::SessionError(SessionError::NoProviderSelected))
    }

    /// Tests the connection and persists the registry only if it passed.
    pub async fn create(
        &self,
        args: &CredentialArgs,
    ) -> Result<RegistryConfiguration, RegistryGateError> {
        let mut session = self.fill(args)?;
        session.request_test()?;
        if session.wait_for_probe().await != Some(TestStatus::Verified) {
            let detail = session
                .result()
                .and_then(|result| result.error_detail.clone())
                .unwrap_or_else(|| {
                    ConnectorError::NetworkError("Connection test did not finish".to_string())
                });
            return Err(RegistryGateError::ConnectionTestFailed(detail));
        }

        let created = session.submit().await?;
        info!("Registry {} created", created.id);
        Ok(created)
    }

    pub async fn revalidate(&self, configuration_id: &str) -> Result<(), RegistryGateError> {
        self.open_session().revalidate(configuration_id).await?;
        info!("Registry {} is reachable", configuration_id);
        Ok(())
    }
}

/// Describes the fields a provider asks for.
pub fn describe_schema(args: &ProviderArgs) -> Value {
    let variant = match (args.provider, args.aws_auth_mode) {
        (ProviderKind::Aws, Some(mode)) => SchemaVariant::Aws(mode),
        (provider, _) => SchemaVariant::default_for(provider),
    };
    json!({
        "provider": variant.provider(),
        "authMode": variant.aws_auth_mode(),
        "fields": schema::get_schema(variant).iter().map(describe_field).collect::<Vec<_>>(),
    })
}

fn describe_field(spec: &FieldSpec) -> Value {
    let (kind, options) = match spec.kind {
        FieldKind::Text => ("text", None),
        FieldKind::Secret => ("secret", None),
        FieldKind::Enum(options) => ("enum", Some(options)),
        FieldKind::Json => ("json", None),
    };
    json!({
        "key": spec.key,
        "label": spec.label,
        "kind": kind,
        "required": spec.required,
        "maxLength": spec.max_length,
        "pattern": spec.pattern.map(|pattern| pattern.name()),
        "options": options,
    })
}
