//! The connection test gate.
//!
//! Submission is withheld until a probe has succeeded against the exact
//! values currently entered. Every probe is tagged with the fingerprint of the
//! draft it was issued for; any edit moves the gate back to
//! [`TestStatus::Untested`], and results carrying another fingerprint are
//! dropped. A stale `Verified` can therefore never be observed.

use crate::connector::ConnectorError;
use crate::draft::{CredentialDraft, DraftError, Fingerprint, RegistryPayload};
use crate::provider::{AwsAuthMode, ProviderKind};
use crate::schema::{self, FieldError};
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    Untested,
    Testing,
    Verified,
    Failed,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TestStatus::Untested => write!(f, "untested"),
            TestStatus::Testing => write!(f, "testing"),
            TestStatus::Verified => write!(f, "verified"),
            TestStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTestResult {
    pub status: TestStatus,
    pub tested_fingerprint: Option<Fingerprint>,
    pub error_detail: Option<ConnectorError>,
}

impl Default for ConnectionTestResult {
    fn default() -> Self {
        Self {
            status: TestStatus::Untested,
            tested_fingerprint: None,
            error_detail: None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("Credential has invalid fields: {}", display_errors(.0))]
    FieldValidationError(Vec<FieldError>),
    #[error(transparent)]
    DraftError(#[from] DraftError),
}

fn display_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A probe the caller must run, and report back with its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTicket {
    pub fingerprint: Fingerprint,
    pub payload: RegistryPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestRequest {
    Issued(ProbeTicket),
    /// A probe is already in flight; nothing was issued.
    AlreadyTesting,
}

pub struct ConnectionTestGate {
    draft: CredentialDraft,
    result: ConnectionTestResult,
}

impl ConnectionTestGate {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            draft: CredentialDraft::new(provider),
            result: ConnectionTestResult::default(),
        }
    }

    pub fn draft(&self) -> &CredentialDraft {
        &self.draft
    }

    pub fn result(&self) -> &ConnectionTestResult {
        &self.result
    }

    pub fn status(&self) -> TestStatus {
        self.result.status
    }

    /// Current violations of the active schema.
    pub fn field_errors(&self) -> Vec<FieldError> {
        schema::validate(self.draft.variant(), self.draft.fields())
    }

    /// fieldChange: stores the value and forgets any test result.
    pub fn field_change(&mut self, key: &str, value: impl Into<String>) -> Result<(), GateError> {
        self.draft.set_field(key, value)?;
        self.reset();
        Ok(())
    }

    /// Switching the AWS auth mode changes which fields are probed, so it
    /// counts as a field change.
    pub fn set_aws_auth_mode(&mut self, mode: AwsAuthMode) {
        if self.draft.variant().aws_auth_mode().is_some_and(|current| current != mode) {
            self.draft.set_aws_auth_mode(mode);
            self.reset();
        }
    }

    /// testRequested: validates the draft and, unless a probe is already in
    /// flight, moves to `Testing` and hands out the probe to run.
    pub fn test_requested(&mut self) -> Result<TestRequest, GateError> {
        if self.result.status == TestStatus::Testing {
            debug!("Test already in flight, ignoring request");
            return Ok(TestRequest::AlreadyTesting);
        }

        let errors = self.field_errors();
        if !errors.is_empty() {
            return Err(GateError::FieldValidationError(errors));
        }

        let fingerprint = self.draft.fingerprint().clone();
        debug!(
            "Testing {} credential {}",
            self.draft.variant(),
            fingerprint.short()
        );
        self.result = ConnectionTestResult {
            status: TestStatus::Testing,
            tested_fingerprint: None,
            error_detail: None,
        };
        Ok(TestRequest::Issued(ProbeTicket {
            fingerprint,
            payload: self.draft.payload(),
        }))
    }

    /// probeSuccess. Returns whether the result was applied.
    pub fn probe_succeeded(&mut self, fingerprint: &Fingerprint) -> bool {
        if !self.is_current(fingerprint) {
            debug!("Discarding stale probe success {}", fingerprint.short());
            return false;
        }
        info!("Credential {} verified", fingerprint.short());
        self.result = ConnectionTestResult {
            status: TestStatus::Verified,
            tested_fingerprint: Some(fingerprint.clone()),
            error_detail: None,
        };
        true
    }

    /// probeFailure. Returns whether the result was applied.
    pub fn probe_failed(&mut self, fingerprint: &Fingerprint, error: ConnectorError) -> bool {
        if !self.is_current(fingerprint) {
            debug!("Discarding stale probe failure {}", fingerprint.short());
            return false;
        }
        warn!("Credential {} failed its test: {}", fingerprint.short(), error);
        self.result = ConnectionTestResult {
            status: TestStatus::Failed,
            tested_fingerprint: Some(fingerprint.clone()),
            error_detail: Some(error),
        };
        true
    }

    pub fn can_submit(&self) -> bool {
        self.result.status == TestStatus::Verified
            && self.result.tested_fingerprint.as_ref() == Some(self.draft.fingerprint())
    }

    pub fn into_draft(self) -> CredentialDraft {
        self.draft
    }

    fn is_current(&self, fingerprint: &Fingerprint) -> bool {
        self.result.status == TestStatus::Testing && fingerprint == self.draft.fingerprint()
    }

    fn reset(&mut self) {
        if self.result.status == TestStatus::Testing {
            debug!("Field changed while testing, in-flight probe is now stale");
        }
        self.result = ConnectionTestResult::default();
    }
}
