//! Shared test fixtures: a recording transport, a recording notifier and a
//! harness running a manager over them.
//!
//! Used by the integration tests and, through the crate's own test module,
//! by the unit tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::rc::Rc;

use async_trait::async_trait;
use moonpool_remote::{
    ConnectOptions, EndpointManager, EndpointManagerBuilder, EndpointManagerRef, LocalNotifier,
    NotifyError, Payload, Pid, RemoteConfig, RemoteDeliver, RemoteTransport, SupervisorStrategy,
    TaskProvider, Terminated, TokioTaskProvider, TransportChannel, TransportError,
    TransportResult,
};

/// Run a future on a current-thread runtime inside a `LocalSet`.
pub fn run_local_test<F: Future<Output = ()> + 'static>(f: F) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build runtime");
    tokio::task::LocalSet::new().block_on(&rt, f);
}

/// Let every spawned local task run until it blocks.
pub async fn settle() {
    for _ in 0..128 {
        TokioTaskProvider.yield_now().await;
    }
}

#[derive(Default)]
struct TransportState {
    connects: HashMap<String, usize>,
    closes: HashMap<String, usize>,
    options: Vec<ConnectOptions>,
    refused: HashSet<String>,
    broken: HashSet<String>,
    batches: HashMap<String, Vec<Vec<RemoteDeliver>>>,
}

/// In-memory transport recording every connect and batch.
#[derive(Default, Clone)]
pub struct RecordingTransport {
    state: Rc<RefCell<TransportState>>,
}

impl RecordingTransport {
    /// Connects to `address` fail.
    pub fn refuse(&self, address: &str) {
        self.state.borrow_mut().refused.insert(address.to_string());
    }

    /// Channels to `address` fail on their next send; reconnecting heals.
    pub fn break_channels(&self, address: &str) {
        self.state.borrow_mut().broken.insert(address.to_string());
    }

    pub fn connects(&self, address: &str) -> usize {
        self.state.borrow().connects.get(address).copied().unwrap_or(0)
    }

    /// Channels to `address` closed by their writer.
    pub fn closes(&self, address: &str) -> usize {
        self.state.borrow().closes.get(address).copied().unwrap_or(0)
    }

    pub fn total_connects(&self) -> usize {
        self.state.borrow().connects.values().sum()
    }

    pub fn connect_options(&self) -> Vec<ConnectOptions> {
        self.state.borrow().options.clone()
    }

    pub fn batches(&self, address: &str) -> Vec<Vec<RemoteDeliver>> {
        self.state
            .borrow()
            .batches
            .get(address)
            .cloned()
            .unwrap_or_default()
    }

    pub fn batch_sizes(&self, address: &str) -> Vec<usize> {
        self.batches(address).iter().map(Vec::len).collect()
    }

    pub fn sent(&self, address: &str) -> Vec<RemoteDeliver> {
        self.batches(address).into_iter().flatten().collect()
    }

    /// Opaque payloads sent to `address`, in order.
    pub fn user_payloads(&self, address: &str) -> Vec<Vec<u8>> {
        self.sent(address)
            .into_iter()
            .filter_map(|deliver| match deliver.payload {
                Payload::Message(bytes) => Some(bytes),
                _ => None,
            })
            .collect()
    }
}

struct RecordingChannel {
    address: String,
    state: Rc<RefCell<TransportState>>,
}

#[async_trait(?Send)]
impl RemoteTransport for RecordingTransport {
    async fn connect(
        &self,
        address: &str,
        options: &ConnectOptions,
    ) -> TransportResult<Box<dyn TransportChannel>> {
        let mut state = self.state.borrow_mut();
        if state.refused.contains(address) {
            return Err(TransportError::ConnectFailed {
                address: address.to_string(),
                reason: "refused".to_string(),
            });
        }
        state.broken.remove(address);
        state.options.push(options.clone());
        *state.connects.entry(address.to_string()).or_default() += 1;
        Ok(Box::new(RecordingChannel {
            address: address.to_string(),
            state: self.state.clone(),
        }))
    }
}

#[async_trait(?Send)]
impl TransportChannel for RecordingChannel {
    async fn send_batch(&mut self, batch: Vec<RemoteDeliver>) -> TransportResult<()> {
        let mut state = self.state.borrow_mut();
        if state.broken.contains(&self.address) {
            return Err(TransportError::ConnectionLost(self.address.clone()));
        }
        state
            .batches
            .entry(self.address.clone())
            .or_default()
            .push(batch);
        Ok(())
    }

    async fn close(&mut self) {
        *self
            .state
            .borrow_mut()
            .closes
            .entry(self.address.clone())
            .or_default() += 1;
    }
}

/// Notifier recording every notice; can be told to fail for a watcher.
#[derive(Default, Clone)]
pub struct RecordingNotifier {
    notices: Rc<RefCell<Vec<(Pid, Terminated)>>>,
    failing: Rc<RefCell<HashSet<Pid>>>,
}

impl RecordingNotifier {
    pub fn fail_for(&self, watcher: Pid) {
        self.failing.borrow_mut().insert(watcher);
    }

    pub fn notices(&self) -> Vec<(Pid, Terminated)> {
        self.notices.borrow().clone()
    }
}

impl LocalNotifier for RecordingNotifier {
    fn notify_terminated(&self, watcher: &Pid, terminated: Terminated) -> Result<(), NotifyError> {
        if self.failing.borrow().contains(watcher) {
            return Err(NotifyError::WatcherGone(watcher.to_string()));
        }
        self.notices.borrow_mut().push((watcher.clone(), terminated));
        Ok(())
    }
}

/// A running manager plus the fixtures it talks to.
pub struct Harness {
    pub manager: EndpointManagerRef,
    pub transport: RecordingTransport,
    pub notifier: RecordingNotifier,
}

impl Harness {
    pub fn start(config: RemoteConfig) -> Self {
        Self::start_with(config, |builder| builder)
    }

    pub fn start_with_strategy(
        config: RemoteConfig,
        strategy: impl SupervisorStrategy + 'static,
    ) -> Self {
        Self::start_with(config, |builder| builder.supervisor_strategy(strategy))
    }

    fn start_with(
        config: RemoteConfig,
        customize: impl FnOnce(EndpointManagerBuilder) -> EndpointManagerBuilder,
    ) -> Self {
        let transport = RecordingTransport::default();
        let notifier = RecordingNotifier::default();

        let builder = EndpointManager::<TokioTaskProvider>::builder()
            .config(config)
            .transport(Rc::new(transport.clone()))
            .notifier(Rc::new(notifier.clone()));
        let manager = customize(builder)
            .spawn(&TokioTaskProvider)
            .expect("spawn manager");

        Self {
            manager,
            transport,
            notifier,
        }
    }
}

pub fn local(id: &str) -> Pid {
    Pid::new("local:1", id)
}

pub fn config() -> RemoteConfig {
    RemoteConfig::builder()
        .local_address("local:1")
        .build()
        .expect("config")
}
