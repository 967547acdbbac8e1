//! Field schemas per registry provider and the validation run against them
//! before any connectivity probe is allowed.
//!
//! Schemas are fixed, ordered tables. Validation is a pure function of the
//! selected [`SchemaVariant`] and the entered values, so it is re-derived on
//! every call rather than cached.

use crate::draft::FieldMap;
use crate::provider::{AwsAuthMode, ProviderKind, SchemaVariant};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

pub const MAX_NAME_LENGTH: usize = 50;

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://[^\s/]+(/\S*)?$").expect("url pattern is a valid regex")
});

/// Regions where ECR exposes its management API.
pub const ECR_REGIONS: &[&str] = &[
    "af-south-1",
    "ap-east-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-south-1",
    "ap-south-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-southeast-3",
    "ap-southeast-4",
    "ca-central-1",
    "eu-central-1",
    "eu-central-2",
    "eu-north-1",
    "eu-south-1",
    "eu-south-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "il-central-1",
    "me-central-1",
    "me-south-1",
    "sa-east-1",
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Secret,
    Enum(&'static [&'static str]),
    Json,
}

impl FieldKind {
    /// Values of sensitive fields are never logged nor printed.
    pub fn is_sensitive(&self) -> bool {
        matches!(self, FieldKind::Secret | FieldKind::Json)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPattern {
    Url,
}

impl FieldPattern {
    pub fn name(&self) -> &'static str {
        match self {
            FieldPattern::Url => "url",
        }
    }

    pub fn is_match(&self, value: &str) -> bool {
        match self {
            FieldPattern::Url => URL_PATTERN.is_match(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub max_length: Option<usize>,
    pub pattern: Option<FieldPattern>,
}

const NAME: FieldSpec = FieldSpec {
    key: "name",
    label: "Type a name for Registry",
    kind: FieldKind::Text,
    required: true,
    max_length: Some(MAX_NAME_LENGTH),
    pattern: None,
};

const ADDRESS: FieldSpec = FieldSpec {
    key: "address",
    label: "Enter the registry url",
    kind: FieldKind::Text,
    required: true,
    max_length: None,
    pattern: Some(FieldPattern::Url),
};

const USERNAME: FieldSpec = FieldSpec {
    key: "username",
    label: "Enter the username",
    kind: FieldKind::Text,
    required: true,
    max_length: None,
    pattern: None,
};

const PASSWORD: FieldSpec = FieldSpec {
    key: "password",
    label: "Enter the password",
    kind: FieldKind::Secret,
    required: true,
    max_length: None,
    pattern: None,
};

const ACCESS_KEY: FieldSpec = FieldSpec {
    key: "accessKey",
    label: "Enter the access key",
    kind: FieldKind::Secret,
    required: true,
    max_length: None,
    pattern: None,
};

const SECRET_KEY: FieldSpec = FieldSpec {
    key: "secretKey",
    label: "Enter the secret key",
    kind: FieldKind::Secret,
    required: true,
    max_length: None,
    pattern: None,
};

const REGION: FieldSpec = FieldSpec {
    key: "region",
    label: "Enter the region",
    kind: FieldKind::Enum(ECR_REGIONS),
    required: true,
    max_length: None,
    pattern: None,
};

const ORGANIZATION: FieldSpec = FieldSpec {
    key: "organization",
    label: "Enter the project id",
    kind: FieldKind::Text,
    required: true,
    max_length: None,
    pattern: None,
};

const JSON_KEY: FieldSpec = FieldSpec {
    key: "jsonKey",
    label: "Paste the json key",
    kind: FieldKind::Json,
    required: true,
    max_length: None,
    pattern: None,
};

const AWS_ACCESS_KEYS: &[FieldSpec] = &[NAME, ADDRESS, ACCESS_KEY, SECRET_KEY, REGION];
const AWS_IMPLICIT_ROLE: &[FieldSpec] = &[NAME, ADDRESS, REGION];
const GCP: &[FieldSpec] = &[NAME, ADDRESS, ORGANIZATION, JSON_KEY];
const USER_PASSWORD: &[FieldSpec] = &[NAME, ADDRESS, USERNAME, PASSWORD];

/// Returns the ordered field specifications for a schema variant.
pub fn get_schema(variant: SchemaVariant) -> &'static [FieldSpec] {
    match variant {
        SchemaVariant::Aws(AwsAuthMode::AccessKeys) => AWS_ACCESS_KEYS,
        SchemaVariant::Aws(AwsAuthMode::ImplicitRole) => AWS_IMPLICIT_ROLE,
        SchemaVariant::Gcp => GCP,
        SchemaVariant::Azure | SchemaVariant::DockerHub => USER_PASSWORD,
    }
}

/// Looks a field up across every schema variant of a provider, so values for
/// fields hidden by the current AWS auth mode can still be held by a draft.
pub fn find_field(provider: ProviderKind, key: &str) -> Option<&'static FieldSpec> {
    let variants: &[SchemaVariant] = match provider {
        ProviderKind::Aws => &[
            SchemaVariant::Aws(AwsAuthMode::AccessKeys),
            SchemaVariant::Aws(AwsAuthMode::ImplicitRole),
        ],
        ProviderKind::Gcp => &[SchemaVariant::Gcp],
        ProviderKind::Azure => &[SchemaVariant::Azure],
        ProviderKind::DockerHub => &[SchemaVariant::DockerHub],
    };
    variants
        .iter()
        .flat_map(|variant| get_schema(*variant).iter())
        .find(|spec| spec.key == key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldErrorKind {
    Required,
    MaxLength,
    Pattern,
    MalformedJson,
    InvalidOption,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub key: &'static str,
    pub kind: FieldErrorKind,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            FieldErrorKind::Required => write!(f, "{} is required", self.key),
            FieldErrorKind::MaxLength => write!(f, "{} is too long", self.key),
            FieldErrorKind::Pattern => write!(f, "{} has an invalid format", self.key),
            FieldErrorKind::MalformedJson => write!(f, "{} must be a valid JSON object", self.key),
            FieldErrorKind::InvalidOption => write!(f, "{} is not a supported value", self.key),
        }
    }
}

/// Checks `fields` against the schema of `variant` and returns every violation
/// in schema order. An empty list means the values may be probed.
pub fn validate(variant: SchemaVariant, fields: &FieldMap) -> Vec<FieldError> {
    let mut errors = Vec::new();

    for spec in get_schema(variant) {
        let value = fields.get(spec.key).map(String::as_str).unwrap_or("");

        if value.trim().is_empty() {
            if spec.required {
                errors.push(FieldError {
                    key: spec.key,
                    kind: FieldErrorKind::Required,
                });
            }
            continue;
        }

        if let Some(max_length) = spec.max_length {
            if value.chars().count() > max_length {
                errors.push(FieldError {
                    key: spec.key,
                    kind: FieldErrorKind::MaxLength,
                });
            }
        }

        if let Some(pattern) = spec.pattern {
            if !pattern.is_match(value) {
                errors.push(FieldError {
                    key: spec.key,
                    kind: FieldErrorKind::Pattern,
                });
            }
        }

        match spec.kind {
            FieldKind::Json if !is_json_object(value) => errors.push(FieldError {
                key: spec.key,
                kind: FieldErrorKind::MalformedJson,
            }),
            FieldKind::Enum(options) if !options.contains(&value) => errors.push(FieldError {
                key: spec.key,
                kind: FieldErrorKind::InvalidOption,
            }),
            _ => {}
        }
    }

    errors
}

fn is_json_object(value: &str) -> bool {
    serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(value).is_ok()
}
