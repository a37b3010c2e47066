//! 测试辅助工具模块
//! Test utilities module

#![cfg(test)]

use crate::error::PairingError;
use crate::pairing::{PairingClient, PairingController, PairingRecord};
use crate::provision::ThreadCredentials;
use crate::registry::DeviceId;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "accessory_lifecycle=debug".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

/// Counts `WARN` events emitted on the current thread while installed.
#[derive(Clone, Default)]
pub struct WarnCounter {
    count: Arc<AtomicUsize>,
}

impl WarnCounter {
    /// Installs the counter as the thread-local subscriber until the guard drops.
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let counter = Self::default();
        let subscriber = tracing_subscriber::registry().with(counter.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (counter, guard)
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Records every event on the current thread as one `field=value` line.
#[derive(Clone, Default)]
pub struct LogCapture {
    lines: Arc<Mutex<Vec<String>>>,
}

impl LogCapture {
    /// Installs the capture as the thread-local subscriber until the guard drops.
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

struct LineVisitor(Vec<String>);

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.push(format!("{}={}", field.name(), value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.push(format!("{}={:?}", field.name(), value));
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LineVisitor(Vec::new());
        event.record(&mut visitor);
        self.lines.lock().unwrap().push(visitor.0.join(" "));
    }
}

/// The six Thread fields as the mock saw them, key included.
pub type ProvisionCall = (String, u8, String, String, String, u8);

#[derive(Default)]
struct MockState {
    connect_error: Mutex<Option<PairingError>>,
    unpair_error: Mutex<Option<PairingError>>,
    close_error: Mutex<Option<PairingError>>,
    provision_error: Mutex<Option<PairingError>>,
    connect_delay: Mutex<Duration>,
    close_delay: Mutex<Duration>,
    accessory_ids: Mutex<Vec<u64>>,
    provisioned: Mutex<Vec<ProvisionCall>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    unpairs: AtomicUsize,
}

/// A scripted pairing client that records every call.
///
/// Clones share state, so a test can keep one copy while the manager owns
/// another.
#[derive(Clone, Default)]
pub struct MockClient {
    state: Arc<MockState>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_error(self, error: PairingError) -> Self {
        *self.state.connect_error.lock().unwrap() = Some(error);
        self
    }

    pub fn with_unpair_error(self, error: PairingError) -> Self {
        *self.state.unpair_error.lock().unwrap() = Some(error);
        self
    }

    pub fn with_close_error(self, error: PairingError) -> Self {
        *self.state.close_error.lock().unwrap() = Some(error);
        self
    }

    pub fn with_provision_error(self, error: PairingError) -> Self {
        *self.state.provision_error.lock().unwrap() = Some(error);
        self
    }

    pub fn with_connect_delay(self, delay: Duration) -> Self {
        *self.state.connect_delay.lock().unwrap() = delay;
        self
    }

    pub fn with_close_delay(self, delay: Duration) -> Self {
        *self.state.close_delay.lock().unwrap() = delay;
        self
    }

    pub fn with_accessory_ids(self, ids: Vec<u64>) -> Self {
        *self.state.accessory_ids.lock().unwrap() = ids;
        self
    }

    pub fn into_client(self) -> Arc<dyn PairingClient> {
        Arc::new(self)
    }

    pub fn connect_calls(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn unpair_calls(&self) -> usize {
        self.state.unpairs.load(Ordering::SeqCst)
    }

    pub fn provisioned(&self) -> Vec<ProvisionCall> {
        self.state.provisioned.lock().unwrap().clone()
    }
}

#[async_trait]
impl PairingClient for MockClient {
    async fn connect(&self) -> Result<(), PairingError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.state.connect_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<(), PairingError> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state.close_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.state.close_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn unpair(&self) -> Result<(), PairingError> {
        self.state.unpairs.fetch_add(1, Ordering::SeqCst);
        match self.state.unpair_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn thread_provision(&self, credentials: &ThreadCredentials) -> Result<(), PairingError> {
        self.state.provisioned.lock().unwrap().push((
            credentials.network_name.clone(),
            credentials.channel,
            credentials.pan_id.clone(),
            credentials.extended_pan_id.clone(),
            credentials.network_key.expose_secret().to_string(),
            credentials.unknown_flag,
        ));
        match self.state.provision_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn accessory_ids(&self) -> Vec<u64> {
        self.state.accessory_ids.lock().unwrap().clone()
    }
}

/// Hands out the `MockClient` scripted for each pairing id, creating a
/// default one on first use.
#[derive(Default)]
pub struct MockController {
    clients: Mutex<HashMap<DeviceId, MockClient>>,
    loads: AtomicUsize,
    load_error: Mutex<Option<PairingError>>,
}

impl MockController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, pairing_id: &str, client: MockClient) {
        self.clients
            .lock()
            .unwrap()
            .insert(DeviceId::new(pairing_id), client);
    }

    pub fn fail_loads(&self, error: PairingError) {
        *self.load_error.lock().unwrap() = Some(error);
    }

    pub fn client(&self, pairing_id: &str) -> MockClient {
        self.clients
            .lock()
            .unwrap()
            .entry(DeviceId::new(pairing_id))
            .or_default()
            .clone()
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl PairingController for MockController {
    fn load_pairing(&self, record: &PairingRecord) -> Result<Arc<dyn PairingClient>, PairingError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.load_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.client(&record.accessory_pairing_id).into_client())
    }
}
