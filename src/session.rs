use crate::connector::{ConnectorError, Connectors};
use crate::draft::Fingerprint;
use crate::gate::{ConnectionTestGate, ConnectionTestResult, GateError, TestRequest, TestStatus};
use crate::platform_api::{PersistenceGateway, PlatformApiError, RegistryConfiguration};
use crate::provider::{AwsAuthMode, ProviderKind};
use crate::schema::FieldError;
use log::{debug, info, warn};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No registry provider selected")]
    NoProviderSelected,
    #[error(transparent)]
    GateError(#[from] GateError),
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("No registry provider selected")]
    NoProviderSelected,
    #[error("Connection has not been verified for the current values")]
    NotVerified,
    #[error(transparent)]
    ServerError(#[from] PlatformApiError),
}

const PROBE_ENDED_MESSAGE: &str = "Connection test ended without a result";

#[derive(Debug)]
struct ProbeCompletion {
    fingerprint: Fingerprint,
    result: Result<(), ConnectorError>,
}

// The probe task whose result the gate is waiting for.
struct InFlight {
    fingerprint: Fingerprint,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// One open registry form: its draft, its gate and at most one probe in
/// flight. Field edits and probe completions are applied one at a time, in
/// the order this session handles them.
pub struct FormSession {
    id: Uuid,
    gate: Option<ConnectionTestGate>,
    connectors: Arc<Connectors>,
    gateway: Arc<dyn PersistenceGateway>,
    completions_tx: UnboundedSender<ProbeCompletion>,
    completions_rx: UnboundedReceiver<ProbeCompletion>,
    in_flight: Option<InFlight>,
}

impl FormSession {
    pub fn new(connectors: Arc<Connectors>, gateway: Arc<dyn PersistenceGateway>) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        debug!("Opening registry form session {}", id);
        Self {
            id,
            gate: None,
            connectors,
            gateway,
            completions_tx,
            completions_rx,
            in_flight: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn gate(&self) -> Option<&ConnectionTestGate> {
        self.gate.as_ref()
    }

    pub fn status(&self) -> Option<TestStatus> {
        self.gate.as_ref().map(ConnectionTestGate::status)
    }

    pub fn result(&self) -> Option<&ConnectionTestResult> {
        self.gate.as_ref().map(ConnectionTestGate::result)
    }

    pub fn can_submit(&self) -> bool {
        self.gate.as_ref().is_some_and(ConnectionTestGate::can_submit)
    }

    pub fn field_errors(&self) -> Vec<FieldError> {
        self.gate
            .as_ref()
            .map(ConnectionTestGate::field_errors)
            .unwrap_or_default()
    }

    /// Starts a fresh draft for `provider`, discarding the previous one.
    pub fn select_provider(&mut self, provider: ProviderKind) {
        self.cancel_in_flight();
        debug!("Session {} now editing a {} registry", self.id, provider);
        self.gate = Some(ConnectionTestGate::new(provider));
    }

    pub fn set_field(&mut self, key: &str, value: impl Into<String>) -> Result<(), SessionError> {
        let gate = self.gate.as_mut().ok_or(SessionError::NoProviderSelected)?;
        gate.field_change(key, value)?;
        self.cancel_in_flight();
        Ok(())
    }

    pub fn set_aws_auth_mode(&mut self, mode: AwsAuthMode) -> Result<(), SessionError> {
        let gate = self.gate.as_mut().ok_or(SessionError::NoProviderSelected)?;
        gate.set_aws_auth_mode(mode);
        if gate.status() != TestStatus::Testing {
            self.cancel_in_flight();
        }
        Ok(())
    }

    /// Issues a probe for the current values on a background task. Returns
    /// the gate status right after the request.
    pub fn request_test(&mut self) -> Result<TestStatus, SessionError> {
        let gate = self.gate.as_mut().ok_or(SessionError::NoProviderSelected)?;
        let ticket = match gate.test_requested()? {
            TestRequest::Issued(ticket) => ticket,
            TestRequest::AlreadyTesting => return Ok(TestStatus::Testing),
        };

        let token = CancellationToken::new();
        let fingerprint = ticket.fingerprint.clone();
        let connectors = Arc::clone(&self.connectors);
        let completions = self.completions_tx.clone();
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancelled.cancelled() => {
                    debug!("Probe {} cancelled", ticket.fingerprint.short());
                    return;
                }
                result = connectors.test_connection(&ticket.payload) => result,
            };
            // The session may be gone already.
            let _ = completions.send(ProbeCompletion {
                fingerprint: ticket.fingerprint,
                result,
            });
        });
        self.in_flight = Some(InFlight {
            fingerprint,
            token,
            handle,
        });

        Ok(TestStatus::Testing)
    }

    /// Applies every probe that finished so far, without waiting.
    pub fn process_completions(&mut self) -> Option<TestStatus> {
        self.drain_completions();
        if self
            .in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.handle.is_finished())
        {
            // A finished task has sent whatever it was going to send.
            self.drain_completions();
            self.probe_ended();
        }
        self.status()
    }

    /// Waits until the gate leaves `Testing`.
    pub async fn wait_for_probe(&mut self) -> Option<TestStatus> {
        self.process_completions();
        while self.status() == Some(TestStatus::Testing) {
            let Some(in_flight) = self.in_flight.as_mut() else {
                break;
            };
            let completions = &mut self.completions_rx;
            let completion = tokio::select! {
                biased;
                Some(completion) = completions.recv() => Some(completion),
                _ = &mut in_flight.handle => None,
            };
            match completion {
                Some(completion) => self.apply(completion),
                None => {
                    self.drain_completions();
                    self.probe_ended();
                }
            }
        }
        self.status()
    }

    /// Persists the verified credential. On success the draft is gone; on
    /// failure the gate keeps its state, since only an edit calls for a new
    /// test.
    pub async fn submit(&mut self) -> Result<RegistryConfiguration, SubmitError> {
        self.process_completions();
        let gate = self.gate.as_ref().ok_or(SubmitError::NoProviderSelected)?;
        if !gate.can_submit() {
            return Err(SubmitError::NotVerified);
        }

        let payload = gate.draft().payload();
        match self.gateway.create(&payload).await {
            Ok(configuration) => {
                info!(
                    "Registry configuration {} created by session {}",
                    configuration.id, self.id
                );
                self.gate = None;
                Ok(configuration)
            }
            Err(e) => {
                warn!("Session {} could not persist registry: {}", self.id, e);
                Err(SubmitError::ServerError(e))
            }
        }
    }

    /// Re-checks an already persisted configuration. Independent of the draft.
    pub async fn revalidate(&self, configuration_id: &str) -> Result<(), PlatformApiError> {
        self.gateway.revalidate(configuration_id).await
    }

    /// Abandons the form.
    pub fn cancel(mut self) {
        debug!("Session {} cancelled", self.id);
        self.cancel_in_flight();
        self.gate = None;
    }

    fn drain_completions(&mut self) {
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.apply(completion);
        }
    }

    // The task is gone without reporting, e.g. the connector panicked.
    fn probe_ended(&mut self) {
        let Some(in_flight) = self.in_flight.take() else {
            return;
        };
        if let Some(gate) = self.gate.as_mut() {
            if gate.probe_failed(
                &in_flight.fingerprint,
                ConnectorError::NetworkError(PROBE_ENDED_MESSAGE.to_string()),
            ) {
                warn!(
                    "Probe {} ended without reporting a result",
                    in_flight.fingerprint.short()
                );
            }
        }
    }

    fn apply(&mut self, completion: ProbeCompletion) {
        let Some(gate) = self.gate.as_mut() else {
            return;
        };
        let applied = match completion.result {
            Ok(()) => gate.probe_succeeded(&completion.fingerprint),
            Err(error) => gate.probe_failed(&completion.fingerprint, error),
        };
        if applied {
            self.in_flight = None;
        }
    }

    // Only an optimization: stale results are dropped by the gate anyway.
    fn cancel_in_flight(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.token.cancel();
        }
    }
}

impl Drop for FormSession {
    fn drop(&mut self) {
        self.cancel_in_flight();
    }
}
