//! Connectivity probes, one variant per registry provider.
//!
//! A probe is a single authenticated, lightweight management call. Any 2xx
//! answer is a success; every other status goes through
//! [`crate::error_translator::decode`]. Probes are bounded by a fixed budget
//! and never retried here: a retry is a new test request from the operator.

mod aws;
mod azure;
mod docker_hub;
mod gcp;
mod platform;
mod sigv4;

pub use aws::{AwsConnector, AwsCredentials};
pub use azure::AzureConnector;
pub use docker_hub::DockerHubConnector;
pub use gcp::GcpConnector;
pub use platform::PlatformConnector;

use crate::config::{Config, ProbeMode};
use crate::draft::RegistryPayload;
use crate::error_translator::{decode, DomainError};
use crate::platform_api::PlatformApi;
use crate::provider::ProviderKind;
use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectorError {
    /// Upstream rejected the credentials (401/403).
    #[error("{0}")]
    AuthError(DomainError),
    /// Transport failure, timeout or unreachable endpoint.
    #[error("{0}")]
    NetworkError(String),
    #[error("Registry provider {0} is not supported")]
    UnsupportedError(ProviderKind),
    /// Any other non-2xx answer, already translated.
    #[error("{0}")]
    UpstreamError(DomainError),
}

#[async_trait]
pub trait RegistryConnector: Send + Sync {
    async fn test_connection(&self, payload: &RegistryPayload) -> Result<(), ConnectorError>;
}

/// Dispatch table from provider kind to its connector.
#[derive(Clone, Default)]
pub struct Connectors {
    table: HashMap<ProviderKind, Arc<dyn RegistryConnector>>,
}

impl Connectors {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: ProviderKind, connector: Arc<dyn RegistryConnector>) -> Self {
        self.table.insert(kind, connector);
        self
    }

    /// Probes every provider's management API straight from this process.
    pub fn direct(probe: ProbeClient) -> Self {
        Self::empty()
            .register(
                ProviderKind::Aws,
                Arc::new(AwsConnector::new(probe.clone(), AwsCredentials::from_env())),
            )
            .register(ProviderKind::Gcp, Arc::new(GcpConnector::new(probe.clone())))
            .register(ProviderKind::Azure, Arc::new(AzureConnector::new(probe.clone())))
            .register(ProviderKind::DockerHub, Arc::new(DockerHubConnector::new(probe)))
    }

    /// Delegates every probe to the platform's validation endpoint.
    pub fn platform(api: Arc<PlatformApi>, timeout: Duration) -> Self {
        let connector: Arc<dyn RegistryConnector> = Arc::new(PlatformConnector::new(api, timeout));
        ProviderKind::ALL
            .iter()
            .fold(Self::empty(), |connectors, kind| {
                connectors.register(*kind, Arc::clone(&connector))
            })
    }

    pub fn from_config(config: &Config, api: Arc<PlatformApi>) -> Result<Self, reqwest::Error> {
        let timeout = config.probe_timeout();
        Ok(match config.probe_mode {
            ProbeMode::Direct => Self::direct(ProbeClient::new(timeout)?),
            ProbeMode::Platform => Self::platform(api, timeout),
        })
    }

    pub async fn test_connection(&self, payload: &RegistryPayload) -> Result<(), ConnectorError> {
        match self.table.get(&payload.provider_kind) {
            Some(connector) => connector.test_connection(payload).await,
            None => Err(ConnectorError::UnsupportedError(payload.provider_kind)),
        }
    }
}

/// HTTP client shared by the direct connectors, with the probe budget applied
/// to every request.
#[derive(Debug, Clone)]
pub struct ProbeClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl ProbeClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("registry-gate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, timeout })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub async fn send(&self, builder: reqwest::RequestBuilder) -> Result<(), ConnectorError> {
        self.send_classified(builder, |_| false).await
    }

    /// Like [`ProbeClient::send`], for upstreams that also reject credentials
    /// with statuses other than 401/403. `rejects_credentials` inspects the
    /// raw error body.
    pub async fn send_classified<F>(
        &self,
        builder: reqwest::RequestBuilder,
        rejects_credentials: F,
    ) -> Result<(), ConnectorError>
    where
        F: Fn(&str) -> bool + Send,
    {
        let res = builder
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| network_error(e, self.timeout))?;

        let status = res.status();
        debug!("Probe answered with {}", status);
        if status.is_success() {
            return Ok(());
        }

        let body = res
            .text()
            .await
            .map_err(|e| network_error(e, self.timeout))?;
        let error = decode(status.as_u16(), &body);
        if status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
            || rejects_credentials(&body)
        {
            Err(ConnectorError::AuthError(error))
        } else {
            Err(ConnectorError::UpstreamError(error))
        }
    }
}

pub(crate) fn network_error(e: reqwest::Error, timeout: Duration) -> ConnectorError {
    if e.is_timeout() {
        ConnectorError::NetworkError(timeout_message(timeout))
    } else {
        // URLs may carry credentials in their query string.
        ConnectorError::NetworkError(e.without_url().to_string())
    }
}

pub(crate) fn timeout_message(timeout: Duration) -> String {
    format!(
        "Registry did not answer within {} ms",
        timeout.as_millis()
    )
}

/// Resolves `path` against the registry address entered by the operator.
pub(crate) fn endpoint(address: &str, path: &str) -> Result<Url, ConnectorError> {
    let mut base = Url::parse(address.trim())
        .map_err(|e| ConnectorError::NetworkError(format!("Invalid registry address: {}", e)))?;
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path)
        .map_err(|e| ConnectorError::NetworkError(format!("Invalid registry address: {}", e)))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::draft::FieldMap;
    use crate::test_utils::*;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use serde_json::json;

    #[test]
    fn endpoint_joins_paths() {
        assert_eq!(
            endpoint("http://fake-host", "v2/_catalog").unwrap().as_str(),
            "http://fake-host/v2/_catalog"
        );
        assert_eq!(
            endpoint("https://fake-host/prefix", "v2/").unwrap().as_str(),
            "https://fake-host/prefix/v2/"
        );
        assert!(matches!(
            endpoint("fake-host", "v2/"),
            Err(ConnectorError::NetworkError(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 10)]
    async fn unsupported_provider() {
        let connectors = Connectors::empty();
        let payload = RegistryPayload {
            provider_kind: ProviderKind::Gcp,
            auth_mode: None,
            field_map: FieldMap::new(),
        };
        assert_eq!(
            connectors.test_connection(&payload).await,
            Err(ConnectorError::UnsupportedError(ProviderKind::Gcp))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 10)]
    async fn dispatches_by_provider() {
        let azure = Arc::new(StubConnector::succeeding());
        let connectors = Connectors::empty().register(ProviderKind::Azure, azure.clone());

        let payload = RegistryPayload {
            provider_kind: ProviderKind::Azure,
            auth_mode: None,
            field_map: FieldMap::new(),
        };
        assert!(connectors.test_connection(&payload).await.is_ok());
        assert_eq!(azure.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 10)]
    async fn send_classifies_statuses() {
        initialize_tests();
        let server_test = ServerTest::new(
            Router::new()
                .route("/ok", get(|| async { (StatusCode::NO_CONTENT, "") }))
                .route(
                    "/denied",
                    get(|| async {
                        (
                            StatusCode::UNAUTHORIZED,
                            Json(json!({"status": "401", "message": "bad credentials"})),
                        )
                    }),
                )
                .route(
                    "/missing",
                    get(|| async {
                        (
                            StatusCode::NOT_FOUND,
                            Json(json!({"status": "404", "message": "invalid registry"})),
                        )
                    }),
                ),
        )
        .await;
        let probe = ProbeClient::new(DEFAULT_PROBE_TIMEOUT).unwrap();

        let ok = probe.send(probe.http().get(server_test.url_for("/ok"))).await;
        assert!(ok.is_ok());

        let denied = probe.send(probe.http().get(server_test.url_for("/denied"))).await;
        assert_eq!(
            denied,
            Err(ConnectorError::AuthError(DomainError::UnknownFailure(
                "bad credentials".to_string()
            )))
        );

        let missing = probe.send(probe.http().get(server_test.url_for("/missing"))).await;
        assert_eq!(
            missing.unwrap_err().to_string(),
            "invalid registry".to_string()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 10)]
    async fn send_times_out() {
        let server_test = ServerTest::new(Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        ))
        .await;
        let probe = ProbeClient::new(Duration::from_millis(200)).unwrap();

        let result = probe.send(probe.http().get(server_test.url_for("/slow"))).await;
        assert_eq!(
            result,
            Err(ConnectorError::NetworkError(timeout_message(
                Duration::from_millis(200)
            )))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 10)]
    async fn send_reports_truncated_error_body() {
        let address = truncated_server("404 Not Found").await;
        let probe = ProbeClient::new(DEFAULT_PROBE_TIMEOUT).unwrap();

        let result = probe
            .send(probe.http().get(format!("{}/v2/", address)))
            .await;
        assert!(matches!(result, Err(ConnectorError::NetworkError(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 10)]
    async fn send_unreachable() {
        let probe = ProbeClient::new(Duration::from_secs(2)).unwrap();
        let result = probe.send(probe.http().get("http://127.0.0.1:1/v2/")).await;
        assert!(matches!(result, Err(ConnectorError::NetworkError(_))));
    }
}
