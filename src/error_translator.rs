//! Maps upstream HTTP failures to [`DomainError`].
//!
//! Shared by the connectivity probe and by the platform API client so both
//! present the same buckets and the same default message.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_FAILURE_MESSAGE: &str = "An unexpected error occurred, please try again.";

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", content = "message")]
pub enum DomainError {
    #[error("{0}")]
    InvalidPayload(String),
    #[error("{0}")]
    BusinessRuleViolation(String),
    #[error("{0}")]
    UnknownFailure(String),
}

impl DomainError {
    /// The user-facing message, verbatim from upstream when it sent one.
    pub fn message(&self) -> &str {
        match self {
            DomainError::InvalidPayload(message)
            | DomainError::BusinessRuleViolation(message)
            | DomainError::UnknownFailure(message) => message,
        }
    }
}

/// Total mapping from an upstream status and raw body to a domain error.
pub fn decode(status: u16, body: &str) -> DomainError {
    let message = reason(body).unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
    match status {
        400 => DomainError::InvalidPayload(message),
        422 => DomainError::BusinessRuleViolation(message),
        _ => DomainError::UnknownFailure(message),
    }
}

/// Reads a failed response to the end and decodes it. Fails only when the
/// body itself cannot be read.
pub async fn decode_response(res: reqwest::Response) -> Result<DomainError, reqwest::Error> {
    let status = res.status().as_u16();
    let body = res.text().await?;
    Ok(decode(status, &body))
}

// Upstreams answer with `{status, message}`; some use `reason` or `error`
// instead. Plain-text bodies are taken as the message.
fn reason(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(object)) => ["message", "reason", "error"]
            .iter()
            .filter_map(|key| object.get(*key))
            .find_map(|value| match value {
                Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
                _ => None,
            }),
        Ok(Value::String(text)) if !text.trim().is_empty() => Some(text),
        Ok(_) => None,
        Err(_) => Some(body.to_string()),
    }
}
