use crate::connector::{ConnectorError, RegistryConnector};
use crate::draft::{FieldMap, RegistryPayload};
use crate::error_translator::DomainError;
use crate::platform_api::{PersistenceGateway, PlatformApiError, RegistryConfiguration};
use crate::provider::{ProviderKind, SchemaVariant};
use async_trait::async_trait;
use axum::Router;
use log::{LevelFilter, Log, Metadata, Record};
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Notify;

static INIT_TESTS: Once = Once::new();

// Forwards to env_logger and keeps every formatted message for assertions.
struct CapturingLogger {
    inner: env_logger::Logger,
    lines: Mutex<Vec<String>>,
}

impl Log for CapturingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.lines.lock().unwrap().push(record.args().to_string());
            self.inner.log(record);
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

static LOGGER: Lazy<CapturingLogger> = Lazy::new(|| CapturingLogger {
    inner: env_logger::Builder::new()
        .filter_level(LevelFilter::Debug)
        .is_test(true)
        .build(),
    lines: Mutex::new(Vec::new()),
});

pub fn initialize_tests() {
    INIT_TESTS.call_once(|| {
        if log::set_logger(&*LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Debug);
        }
    });
}

/// Every message logged since [`initialize_tests`], across all tests.
pub fn logged() -> Vec<String> {
    LOGGER.lines.lock().unwrap().clone()
}

/// Serves a response announcing more body than it sends, then hangs up.
/// Returns the base url.
pub async fn truncated_server(status_line: &'static str) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::task::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: 100\r\n\r\n{{\"message\":",
                status_line
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{}", addr)
}

pub fn payload(kind: ProviderKind, fields: &[(&str, &str)]) -> RegistryPayload {
    RegistryPayload {
        provider_kind: kind,
        auth_mode: SchemaVariant::default_for(kind).aws_auth_mode(),
        field_map: fields
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<FieldMap>(),
    }
}

/// Fake upstream HTTP server, stopped when dropped.
pub struct ServerTest {
    guard: tokio::task::JoinHandle<()>,
    addr: String,
    port: u16,
}

impl Drop for ServerTest {
    fn drop(&mut self) {
        self.guard.abort();
    }
}

impl ServerTest {
    pub fn url_for(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.addr, self.port, path)
    }

    pub async fn new(router: Router) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().ip().to_string();
        let port = listener.local_addr().unwrap().port();

        let guard = tokio::task::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Self { guard, addr, port }
    }
}

/// Connector answering with a fixed result, optionally held until released.
pub struct StubConnector {
    result: Result<(), ConnectorError>,
    calls: AtomicUsize,
    hold: bool,
    panics: bool,
    started: Notify,
    released: Notify,
}

impl StubConnector {
    pub fn succeeding() -> Self {
        Self::answering(Ok(()))
    }

    pub fn failing(error: ConnectorError) -> Self {
        Self::answering(Err(error))
    }

    fn answering(result: Result<(), ConnectorError>) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
            hold: false,
            panics: false,
            started: Notify::new(),
            released: Notify::new(),
        }
    }

    /// Crashes instead of answering.
    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::succeeding()
        }
    }

    pub fn held(mut self) -> Self {
        self.hold = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }
}

#[async_trait]
impl RegistryConnector for StubConnector {
    async fn test_connection(&self, _payload: &RegistryPayload) -> Result<(), ConnectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        if self.hold {
            self.released.notified().await;
        }
        if self.panics {
            panic!("connector crashed");
        }
        self.result.clone()
    }
}

/// Gateway recording what it is asked to persist.
pub struct StubGateway {
    refusal: Option<DomainError>,
    payloads: Mutex<Vec<RegistryPayload>>,
    revalidated: Mutex<Vec<String>>,
}

impl StubGateway {
    pub fn accepting() -> Self {
        Self {
            refusal: None,
            payloads: Mutex::new(Vec::new()),
            revalidated: Mutex::new(Vec::new()),
        }
    }

    pub fn refusing(error: DomainError) -> Self {
        Self {
            refusal: Some(error),
            ..Self::accepting()
        }
    }

    pub fn payloads(&self) -> Vec<RegistryPayload> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn revalidated(&self) -> Vec<String> {
        self.revalidated.lock().unwrap().clone()
    }
}

#[async_trait]
impl PersistenceGateway for StubGateway {
    async fn create(
        &self,
        payload: &RegistryPayload,
    ) -> Result<RegistryConfiguration, PlatformApiError> {
        self.payloads.lock().unwrap().push(payload.clone());
        match &self.refusal {
            Some(error) => Err(PlatformApiError::ApiStatusError(error.clone())),
            None => Ok(RegistryConfiguration {
                id: "cfg-1".to_string(),
                name: Some(payload.field("name").to_string()),
                created_at: None,
            }),
        }
    }

    async fn revalidate(&self, configuration_id: &str) -> Result<(), PlatformApiError> {
        self.revalidated
            .lock()
            .unwrap()
            .push(configuration_id.to_string());
        match &self.refusal {
            Some(error) => Err(PlatformApiError::ApiStatusError(error.clone())),
            None => Ok(()),
        }
    }
}
