use crate::provider::{AwsAuthMode, ProviderKind, SchemaVariant};
use crate::schema::{self, FieldSpec};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Entered values keyed by field key. Kept sorted so every traversal is
/// canonical regardless of the order fields were typed in.
pub type FieldMap = BTreeMap<String, String>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DraftError {
    #[error("Field {key} does not exist for provider {provider}")]
    UnknownField { provider: ProviderKind, key: String },
}

/// Digest of a draft's content. Two drafts share a fingerprint iff they hold
/// the same provider, auth mode and values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(variant: SchemaVariant, fields: &FieldMap) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(variant.provider().to_string().as_bytes());
        hasher.update([0u8]);
        if let Some(mode) = variant.aws_auth_mode() {
            hasher.update(mode.to_string().as_bytes());
        }
        hasher.update([0u8]);
        for (key, value) in fields {
            hasher.update((key.len() as u64).to_le_bytes());
            hasher.update(key.as_bytes());
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        }
        Fingerprint(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First characters of the digest, enough to tell probes apart in logs.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The values an operator is entering for one registry credential.
#[derive(Clone)]
pub struct CredentialDraft {
    variant: SchemaVariant,
    fields: FieldMap,
    fingerprint: Fingerprint,
}

impl CredentialDraft {
    pub fn new(provider: ProviderKind) -> Self {
        let variant = SchemaVariant::default_for(provider);
        let fields = FieldMap::new();
        Self {
            fingerprint: Fingerprint::compute(variant, &fields),
            variant,
            fields,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.variant.provider()
    }

    pub fn variant(&self) -> SchemaVariant {
        self.variant
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn schema(&self) -> &'static [FieldSpec] {
        schema::get_schema(self.variant)
    }

    /// Stores a value and recomputes the fingerprint.
    pub fn set_field(&mut self, key: &str, value: impl Into<String>) -> Result<(), DraftError> {
        if schema::find_field(self.provider(), key).is_none() {
            return Err(DraftError::UnknownField {
                provider: self.provider(),
                key: key.to_string(),
            });
        }
        self.fields.insert(key.to_string(), value.into());
        self.refresh_fingerprint();
        Ok(())
    }

    /// Switches the AWS auth mode. No-op for other providers.
    pub fn set_aws_auth_mode(&mut self, mode: AwsAuthMode) {
        if let SchemaVariant::Aws(_) = self.variant {
            self.variant = SchemaVariant::Aws(mode);
            self.refresh_fingerprint();
        }
    }

    /// Builds the body sent to the platform, restricted to the fields of the
    /// active schema variant.
    pub fn payload(&self) -> RegistryPayload {
        let field_map = self
            .schema()
            .iter()
            .filter_map(|spec| {
                self.fields
                    .get(spec.key)
                    .map(|value| (spec.key.to_string(), value.clone()))
            })
            .collect();

        RegistryPayload {
            provider_kind: self.provider(),
            auth_mode: self.variant.aws_auth_mode(),
            field_map,
        }
    }

    fn refresh_fingerprint(&mut self) {
        self.fingerprint = Fingerprint::compute(self.variant, &self.fields);
    }
}

impl fmt::Debug for CredentialDraft {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let provider = self.provider();
        let fields: BTreeMap<&str, &str> = self
            .fields
            .iter()
            .map(|(key, value)| {
                let sensitive = schema::find_field(provider, key)
                    .map(|spec| spec.kind.is_sensitive())
                    .unwrap_or(true);
                let shown = if sensitive { "<redacted>" } else { value.as_str() };
                (key.as_str(), shown)
            })
            .collect();

        f.debug_struct("CredentialDraft")
            .field("variant", &self.variant)
            .field("fields", &fields)
            .field("fingerprint", &self.fingerprint.short())
            .finish()
    }
}

/// Body of the validation and persistence requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryPayload {
    pub provider_kind: ProviderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_mode: Option<AwsAuthMode>,
    pub field_map: FieldMap,
}

impl RegistryPayload {
    pub fn variant(&self) -> SchemaVariant {
        match (self.provider_kind, self.auth_mode) {
            (ProviderKind::Aws, mode) => SchemaVariant::Aws(mode.unwrap_or_default()),
            (kind, _) => SchemaVariant::default_for(kind),
        }
    }

    pub fn field(&self, key: &str) -> &str {
        self.field_map.get(key).map(String::as_str).unwrap_or("")
    }
}
