use serde::{Deserialize, Serialize};
use std::fmt;

/// Registry vendors a credential can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProviderKind {
    Aws,
    Gcp,
    Azure,
    DockerHub,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Aws,
        ProviderKind::Gcp,
        ProviderKind::Azure,
        ProviderKind::DockerHub,
    ];
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProviderKind::Aws => write!(f, "AWS"),
            ProviderKind::Gcp => write!(f, "GCP"),
            ProviderKind::Azure => write!(f, "AZURE"),
            ProviderKind::DockerHub => write!(f, "DOCKERHUB"),
        }
    }
}

/// How an AWS registry authenticates: with the role of the host running the
/// probe, or with an explicit access key pair.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AwsAuthMode {
    #[default]
    ImplicitRole,
    AccessKeys,
}

impl fmt::Display for AwsAuthMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AwsAuthMode::ImplicitRole => write!(f, "IMPLICIT_ROLE"),
            AwsAuthMode::AccessKeys => write!(f, "ACCESS_KEYS"),
        }
    }
}

/// Selects exactly one field schema. Every provider has a single schema except
/// AWS, whose auth mode picks between two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVariant {
    Aws(AwsAuthMode),
    Gcp,
    Azure,
    DockerHub,
}

impl SchemaVariant {
    pub fn default_for(provider: ProviderKind) -> Self {
        match provider {
            ProviderKind::Aws => SchemaVariant::Aws(AwsAuthMode::default()),
            ProviderKind::Gcp => SchemaVariant::Gcp,
            ProviderKind::Azure => SchemaVariant::Azure,
            ProviderKind::DockerHub => SchemaVariant::DockerHub,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        match self {
            SchemaVariant::Aws(_) => ProviderKind::Aws,
            SchemaVariant::Gcp => ProviderKind::Gcp,
            SchemaVariant::Azure => ProviderKind::Azure,
            SchemaVariant::DockerHub => ProviderKind::DockerHub,
        }
    }

    pub fn aws_auth_mode(&self) -> Option<AwsAuthMode> {
        match self {
            SchemaVariant::Aws(mode) => Some(*mode),
            _ => None,
        }
    }
}

impl fmt::Display for SchemaVariant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SchemaVariant::Aws(mode) => write!(f, "AWS/{}", mode),
            other => write!(f, "{}", other.provider()),
        }
    }
}
