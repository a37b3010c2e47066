//! tests/common/harness.rs
use accessory_lifecycle::{
    Config, LifecycleManager, PairingClient, PairingController, PairingError, PairingRecord,
    ThreadCredentials,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "accessory_lifecycle=debug,lifecycle=info".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

/// How a simulated accessory answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    /// Answers every request.
    Online,
    /// Not on the network at all.
    Offline,
    /// Drops the connection as soon as the handshake starts.
    Flaky,
    /// Refuses our credentials.
    Rejecting,
}

#[derive(Debug, Clone)]
struct Accessory {
    reachability: Reachability,
    handshake: Duration,
    teardown: Duration,
}

#[derive(Default)]
struct NetworkState {
    accessories: Mutex<HashMap<String, Accessory>>,
    log: Mutex<Vec<String>>,
    sessions: AtomicUsize,
}

impl NetworkState {
    fn accessory(&self, pairing_id: &str) -> Accessory {
        self.accessories
            .lock()
            .unwrap()
            .get(pairing_id)
            .cloned()
            .unwrap_or(Accessory {
                reachability: Reachability::Offline,
                handshake: Duration::ZERO,
                teardown: Duration::ZERO,
            })
    }

    fn record(&self, verb: &str, pairing_id: &str) {
        self.log.lock().unwrap().push(format!("{verb}:{pairing_id}"));
    }
}

/// An in-memory network of accessories. Acts as the pairing controller and
/// keeps a log of everything the sessions did.
#[derive(Clone, Default)]
pub struct FakeNetwork {
    state: Arc<NetworkState>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, pairing_id: &str, reachability: Reachability) {
        self.add_with_latency(pairing_id, reachability, Duration::ZERO, Duration::ZERO);
    }

    pub fn add_with_latency(
        &self,
        pairing_id: &str,
        reachability: Reachability,
        handshake: Duration,
        teardown: Duration,
    ) {
        self.state.accessories.lock().unwrap().insert(
            pairing_id.to_lowercase(),
            Accessory {
                reachability,
                handshake,
                teardown,
            },
        );
    }

    pub fn set_reachability(&self, pairing_id: &str, reachability: Reachability) {
        if let Some(accessory) = self
            .state
            .accessories
            .lock()
            .unwrap()
            .get_mut(&pairing_id.to_lowercase())
        {
            accessory.reachability = reachability;
        }
    }

    /// Log lines recorded for one verb, e.g. `"close"`, in order.
    pub fn calls(&self, verb: &str) -> Vec<String> {
        let prefix = format!("{verb}:");
        self.state
            .log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|line| line.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    /// How many sessions the controller has handed out.
    pub fn sessions(&self) -> usize {
        self.state.sessions.load(Ordering::SeqCst)
    }
}

struct FakeSession {
    pairing_id: String,
    network: Arc<NetworkState>,
}

#[async_trait]
impl PairingClient for FakeSession {
    async fn connect(&self) -> Result<(), PairingError> {
        let accessory = self.network.accessory(&self.pairing_id);
        tokio::time::sleep(accessory.handshake).await;
        self.network.record("connect", &self.pairing_id);
        match accessory.reachability {
            Reachability::Online => Ok(()),
            Reachability::Offline => Err(PairingError::AccessoryNotFound),
            Reachability::Flaky => Err(PairingError::AccessoryDisconnected),
            Reachability::Rejecting => {
                Err(PairingError::Authentication("M4 verification failed".into()))
            }
        }
    }

    async fn close(&self) -> Result<(), PairingError> {
        let accessory = self.network.accessory(&self.pairing_id);
        tokio::time::sleep(accessory.teardown).await;
        self.network.record("close", &self.pairing_id);
        Ok(())
    }

    async fn unpair(&self) -> Result<(), PairingError> {
        match self.network.accessory(&self.pairing_id).reachability {
            Reachability::Online | Reachability::Rejecting => {
                self.network.record("unpair", &self.pairing_id);
                Ok(())
            }
            Reachability::Offline | Reachability::Flaky => Err(PairingError::AccessoryDisconnected),
        }
    }

    async fn thread_provision(&self, credentials: &ThreadCredentials) -> Result<(), PairingError> {
        self.network.record(
            "provision",
            &format!("{}@{}", self.pairing_id, credentials.network_name),
        );
        Ok(())
    }

    fn accessory_ids(&self) -> Vec<u64> {
        vec![1]
    }
}

impl PairingController for FakeNetwork {
    fn load_pairing(&self, record: &PairingRecord) -> Result<Arc<dyn PairingClient>, PairingError> {
        self.state.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSession {
            pairing_id: record.accessory_pairing_id.to_lowercase(),
            network: self.state.clone(),
        }))
    }
}

/// Counts `WARN` events emitted on the current thread while installed.
#[derive(Clone, Default)]
pub struct WarnCounter {
    count: Arc<AtomicUsize>,
}

impl WarnCounter {
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

/// A manager wired to a fresh fake network.
pub struct TestHarness {
    pub network: FakeNetwork,
    pub manager: LifecycleManager,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        init_tracing();
        let network = FakeNetwork::new();
        let manager = LifecycleManager::new(config, Arc::new(network.clone()));
        Self { network, manager }
    }
}
