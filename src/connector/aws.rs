use super::sigv4::{self, SignableRequest};
use super::{ConnectorError, ProbeClient, RegistryConnector};
use crate::draft::RegistryPayload;
use crate::error_translator::DomainError;
use crate::provider::AwsAuthMode;
use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use std::fmt;
use url::{Position, Url};

const SERVICE: &str = "ecr";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const TARGET: &str = "AmazonEC2ContainerRegistry_V20150921.DescribeRepositories";
const BODY: &[u8] = br#"{"maxResults":1}"#;

// ECR answers 400 for these, but they all mean the key pair was refused.
const CREDENTIAL_FAULTS: &[&str] = &[
    "UnrecognizedClientException",
    "InvalidSignatureException",
    "AccessDeniedException",
    "ExpiredTokenException",
];

#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    /// Credentials of the role this process runs with, from the standard
    /// environment variables.
    pub fn from_env() -> Option<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok()?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok()?;
        Some(Self {
            access_key_id,
            secret_access_key,
            session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
        })
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Describes at most one ECR repository with a SigV4-signed request.
#[derive(Debug, Clone)]
pub struct AwsConnector {
    probe: ProbeClient,
    ambient: Option<AwsCredentials>,
    endpoint: Option<Url>,
}

impl AwsConnector {
    pub fn new(probe: ProbeClient, ambient: Option<AwsCredentials>) -> Self {
        Self {
            probe,
            ambient,
            endpoint: None,
        }
    }

    /// Sends probes to `endpoint` instead of the regional ECR API, e.g. a VPC
    /// endpoint.
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    fn credentials(&self, payload: &RegistryPayload) -> Result<AwsCredentials, ConnectorError> {
        match payload.auth_mode.unwrap_or_default() {
            AwsAuthMode::AccessKeys => Ok(AwsCredentials {
                access_key_id: payload.field("accessKey").trim().to_string(),
                secret_access_key: payload.field("secretKey").trim().to_string(),
                session_token: None,
            }),
            AwsAuthMode::ImplicitRole => self.ambient.clone().ok_or_else(|| {
                ConnectorError::AuthError(DomainError::UnknownFailure(
                    "No AWS credentials are available for the implicit role".to_string(),
                ))
            }),
        }
    }

    fn url(&self, region: &str) -> Result<Url, ConnectorError> {
        match &self.endpoint {
            Some(endpoint) => Ok(endpoint.clone()),
            None => Url::parse(&format!("https://api.{}.{}.amazonaws.com/", SERVICE, region))
                .map_err(|e| ConnectorError::NetworkError(format!("Invalid AWS region: {}", e))),
        }
    }
}

#[async_trait]
impl RegistryConnector for AwsConnector {
    async fn test_connection(&self, payload: &RegistryPayload) -> Result<(), ConnectorError> {
        let region = payload.field("region").trim();
        let credentials = self.credentials(payload)?;
        let url = self.url(region)?;
        let host = url[Position::BeforeHost..Position::AfterPort].to_string();
        debug!(
            "Probing ECR in {} with {}",
            region,
            payload.auth_mode.unwrap_or_default()
        );

        let signed = sigv4::sign(
            &credentials,
            &SignableRequest {
                host: &host,
                region,
                service: SERVICE,
                content_type: CONTENT_TYPE,
                target: TARGET,
                body: BODY,
            },
            Utc::now(),
        );

        let mut builder = self
            .probe
            .http()
            .post(url)
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-target", TARGET)
            .body(BODY);
        for (name, value) in signed {
            builder = builder.header(name, value);
        }

        self.probe
            .send_classified(builder, |body| {
                CREDENTIAL_FAULTS.iter().any(|fault| body.contains(fault))
            })
            .await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::connector::DEFAULT_PROBE_TIMEOUT;
    use crate::provider::ProviderKind;
    use crate::test_utils::*;
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::post,
        Router,
    };

    async fn describe_repositories(headers: HeaderMap) -> (StatusCode, &'static str) {
        let target = headers.get("x-amz-target").and_then(|v| v.to_str().ok());
        let authorization = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if target != Some(TARGET) {
            return (StatusCode::BAD_REQUEST, r#"{"message":"unknown operation"}"#);
        }
        if authorization.starts_with("AWS4-HMAC-SHA256 Credential=good-key/") {
            (StatusCode::OK, r#"{"repositories":[]}"#)
        } else {
            (
                StatusCode::BAD_REQUEST,
                r#"{"__type":"UnrecognizedClientException","message":"The security token included in the request is invalid."}"#,
            )
        }
    }

    fn aws_payload(mode: AwsAuthMode, access_key: &str) -> RegistryPayload {
        let mut payload = payload(
            ProviderKind::Aws,
            &[
                ("name", "fake-name"),
                ("address", "http://fake-host"),
                ("region", "us-east-1"),
                ("accessKey", access_key),
                ("secretKey", "s"),
            ],
        );
        payload.auth_mode = Some(mode);
        payload
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 10)]
    async fn access_keys() {
        let server_test =
            ServerTest::new(Router::new().route("/", post(describe_repositories))).await;
        let connector = AwsConnector::new(ProbeClient::new(DEFAULT_PROBE_TIMEOUT).unwrap(), None)
            .with_endpoint(Url::parse(&server_test.url_for("/")).unwrap());

        let accepted = aws_payload(AwsAuthMode::AccessKeys, "good-key");
        assert!(connector.test_connection(&accepted).await.is_ok());

        let rejected = aws_payload(AwsAuthMode::AccessKeys, "bad-key");
        let error = connector.test_connection(&rejected).await.unwrap_err();
        assert_eq!(
            error,
            ConnectorError::AuthError(DomainError::InvalidPayload(
                "The security token included in the request is invalid.".to_string()
            ))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 10)]
    async fn implicit_role() {
        let server_test =
            ServerTest::new(Router::new().route("/", post(describe_repositories))).await;
        let endpoint = Url::parse(&server_test.url_for("/")).unwrap();
        let probe = ProbeClient::new(DEFAULT_PROBE_TIMEOUT).unwrap();

        let without_role = AwsConnector::new(probe.clone(), None).with_endpoint(endpoint.clone());
        let payload = aws_payload(AwsAuthMode::ImplicitRole, "ignored");
        assert!(matches!(
            without_role.test_connection(&payload).await,
            Err(ConnectorError::AuthError(_))
        ));

        let ambient = AwsCredentials {
            access_key_id: "good-key".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: Some("token".to_string()),
        };
        let with_role = AwsConnector::new(probe, Some(ambient)).with_endpoint(endpoint);
        assert!(with_role.test_connection(&payload).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 10)]
    async fn credentials_stay_out_of_logs() {
        initialize_tests();
        let server_test =
            ServerTest::new(Router::new().route("/", post(describe_repositories))).await;
        let connector = AwsConnector::new(ProbeClient::new(DEFAULT_PROBE_TIMEOUT).unwrap(), None)
            .with_endpoint(Url::parse(&server_test.url_for("/")).unwrap());

        let mut leaky = aws_payload(AwsAuthMode::AccessKeys, "AKIA-LOGGED-KEY");
        leaky
            .field_map
            .insert("secretKey".into(), "LOGGED-SECRET-KEY".into());
        assert!(connector.test_connection(&leaky).await.is_err());

        let lines = logged();
        assert!(lines
            .iter()
            .any(|line| line.contains("Probing ECR in us-east-1 with ACCESS_KEYS")));
        assert!(!lines
            .iter()
            .any(|line| line.contains("AKIA-LOGGED-KEY") || line.contains("LOGGED-SECRET-KEY")));
    }

    #[test]
    fn debug_redacts_secret() {
        let credentials = AwsCredentials {
            access_key_id: "AKID".to_string(),
            secret_access_key: "very-secret".to_string(),
            session_token: None,
        };
        assert!(!format!("{:?}", credentials).contains("very-secret"));
    }
}
