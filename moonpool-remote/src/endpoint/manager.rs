//! The endpoint manager: routing and lifecycle control for every remote
//! destination.
//!
//! # Turn-Based Processing
//!
//! The manager is a single task draining one queue. Producers enqueue
//! [`RemoteMessage`]s through cloned [`EndpointManagerRef`]s from anywhere;
//! the manager handles them one at a time. That serialization is the only
//! thing guarding the registry: the lookup-or-create of an endpoint can not
//! race, so each destination gets exactly one writer and one watcher.
//!
//! # States
//!
//! ```text
//!   Active ──── Stop ────► Terminated
//! ```
//!
//! `Active` owns the registry and everything needed to spawn workers.
//! `Terminated` owns nothing; every message is discarded.
//!
//! # Supervision
//!
//! Writers and watchers report faults on a dedicated channel. The manager
//! asks its [`SupervisorStrategy`] what to do and restarts in place; the
//! registry is never touched by a fault.

use std::rc::Rc;

use tokio::sync::{mpsc, oneshot};

use super::registry::EndpointRegistry;
use super::watcher::{EndpointWatcher, LocalNotifier};
use super::writer::EndpointWriter;
use super::Endpoint;
use crate::config::{ConnectOptions, RemoteConfig};
use crate::error::RemoteError;
use crate::messages::{RemoteDeliver, RemoteMessage, WatchMessage};
use crate::process::spawn_process;
use crate::supervision::{
    ChildFailure, FailureReceiver, FailureSender, RestartFailedChild, SupervisorDirective,
    SupervisorStrategy,
};
use crate::task::TaskProvider;
use crate::transport::RemoteTransport;
use crate::types::Pid;

enum ManagerCommand {
    Route(RemoteMessage),
    Snapshot(oneshot::Sender<ManagerSnapshot>),
}

/// Handle to a running endpoint manager.
///
/// Cheap to clone and `Send`. Sending never fails from the caller's point of
/// view: once the manager is terminated messages are silently dropped.
///
/// The manager task lives as long as at least one handle obtained from
/// [`EndpointManagerBuilder::spawn`] (or a clone of it) is alive. Handles
/// held by endpoint workers are weak and do not keep it running; once the
/// last caller handle is dropped the manager exits and its endpoints shut
/// down, as if stopped.
#[derive(Clone)]
pub struct EndpointManagerRef {
    route: Route,
}

#[derive(Clone)]
enum Route {
    Strong(mpsc::UnboundedSender<ManagerCommand>),
    Weak(mpsc::WeakUnboundedSender<ManagerCommand>),
}

impl EndpointManagerRef {
    fn new(tx: mpsc::UnboundedSender<ManagerCommand>) -> Self {
        Self {
            route: Route::Strong(tx),
        }
    }

    /// A handle that does not keep the manager alive.
    fn downgrade(&self) -> Self {
        let weak = match &self.route {
            Route::Strong(tx) => tx.downgrade(),
            Route::Weak(tx) => tx.clone(),
        };
        Self {
            route: Route::Weak(weak),
        }
    }

    fn command(&self, command: ManagerCommand) -> bool {
        match &self.route {
            Route::Strong(tx) => tx.send(command).is_ok(),
            Route::Weak(tx) => match tx.upgrade() {
                Some(tx) => tx.send(command).is_ok(),
                None => false,
            },
        }
    }

    /// Enqueue a routing event.
    pub fn send(&self, message: RemoteMessage) {
        if !self.command(ManagerCommand::Route(message)) {
            tracing::trace!("endpoint manager gone, message dropped");
        }
    }

    /// Stop every endpoint and terminate the manager.
    pub fn stop(&self) {
        self.send(RemoteMessage::Stop);
    }

    /// Send a message to a remote process.
    pub fn deliver(&self, deliver: RemoteDeliver) {
        self.send(RemoteMessage::RemoteDeliver(deliver));
    }

    /// Start watching a remote process.
    pub fn watch(&self, watcher: Pid, watchee: Pid) {
        self.send(RemoteMessage::RemoteWatch { watcher, watchee });
    }

    /// Stop watching a remote process.
    pub fn unwatch(&self, watcher: Pid, watchee: Pid) {
        self.send(RemoteMessage::RemoteUnwatch { watcher, watchee });
    }

    /// Report that a remote process terminated.
    pub fn remote_terminate(&self, watcher: Pid, watchee: Pid) {
        self.send(RemoteMessage::RemoteTerminate { watcher, watchee });
    }

    /// Report that the connection to `address` is live.
    pub fn endpoint_connected(&self, address: &str) {
        self.send(RemoteMessage::EndpointConnected {
            address: address.to_string(),
        });
    }

    /// Report that the connection to `address` terminated.
    pub fn endpoint_terminated(&self, address: &str) {
        self.send(RemoteMessage::EndpointTerminated {
            address: address.to_string(),
        });
    }

    /// Current endpoints and counters, or `None` once terminated.
    pub async fn snapshot(&self) -> Option<ManagerSnapshot> {
        let (reply, rx) = oneshot::channel();
        if !self.command(ManagerCommand::Snapshot(reply)) {
            return None;
        }
        rx.await.ok()
    }
}

#[cfg(test)]
pub(crate) struct DetachedInbox(mpsc::UnboundedReceiver<ManagerCommand>);

#[cfg(test)]
impl DetachedInbox {
    /// Next routed message, if one is queued.
    pub(crate) fn try_recv_route(&mut self) -> Option<RemoteMessage> {
        match self.0.try_recv().ok()? {
            ManagerCommand::Route(message) => Some(message),
            ManagerCommand::Snapshot(_) => None,
        }
    }
}

#[cfg(test)]
impl EndpointManagerRef {
    /// A handle with no manager behind it; the caller reads the inbox.
    pub(crate) fn detached() -> (Self, DetachedInbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), DetachedInbox(rx))
    }
}

/// One endpoint as seen by [`EndpointManagerRef::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSnapshot {
    /// Destination address.
    pub address: String,
    /// Pid of the endpoint writer.
    pub writer: Pid,
    /// Pid of the endpoint watcher.
    pub watcher: Pid,
}

/// State of an active manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSnapshot {
    /// Registered endpoints, sorted by address.
    pub endpoints: Vec<EndpointSnapshot>,
    /// Workers spawned since start (two per endpoint).
    pub workers_spawned: u64,
    /// Worker restarts performed since start.
    pub restarts: u64,
}

impl ManagerSnapshot {
    /// The endpoint for `address`, if registered.
    pub fn endpoint(&self, address: &str) -> Option<&EndpointSnapshot> {
        self.endpoints.iter().find(|e| e.address == address)
    }
}

/// Everything needed to spawn the workers of a new endpoint.
struct EndpointSpawner<T: TaskProvider> {
    task: T,
    local_address: String,
    batch_size: usize,
    connect_options: Rc<ConnectOptions>,
    transport: Rc<dyn RemoteTransport>,
    notifier: Rc<dyn LocalNotifier>,
    manager: EndpointManagerRef,
    failures: FailureSender,
}

impl<T: TaskProvider> EndpointSpawner<T> {
    fn spawn(&self, address: &str) -> Endpoint {
        let writer = spawn_process(
            &self.task,
            Pid::new(&self.local_address, format!("$endpoint_writer/{address}")),
            EndpointWriter::props(
                address,
                self.connect_options.clone(),
                self.transport.clone(),
                self.manager.clone(),
                self.batch_size,
            ),
            self.failures.clone(),
        );
        let watcher = spawn_process(
            &self.task,
            Pid::new(&self.local_address, format!("$endpoint_watcher/{address}")),
            EndpointWatcher::props(address, self.notifier.clone(), self.manager.clone()),
            self.failures.clone(),
        );
        Endpoint::new(address, writer, watcher)
    }
}

enum Transition {
    Stay,
    Terminate,
}

struct Active<T: TaskProvider> {
    registry: EndpointRegistry,
    spawner: EndpointSpawner<T>,
    strategy: Box<dyn SupervisorStrategy>,
    workers_spawned: u64,
    restarts: u64,
}

impl<T: TaskProvider> Active<T> {
    fn route(&mut self, message: RemoteMessage) -> Transition {
        match message {
            RemoteMessage::Started => {
                tracing::debug!("Started endpoint manager");
            }
            RemoteMessage::Stop => {
                self.shutdown();
                return Transition::Terminate;
            }
            RemoteMessage::EndpointConnected { address } => {
                self.resolve(&address)
                    .watcher()
                    .tell(WatchMessage::EndpointConnected);
            }
            RemoteMessage::EndpointTerminated { address } => {
                self.resolve(&address)
                    .watcher()
                    .tell(WatchMessage::EndpointTerminated);
            }
            RemoteMessage::RemoteWatch { watcher, watchee } => {
                let endpoint = self.resolve(watchee.address());
                endpoint.watcher().tell(WatchMessage::Watch { watcher, watchee });
            }
            RemoteMessage::RemoteUnwatch { watcher, watchee } => {
                let endpoint = self.resolve(watchee.address());
                endpoint
                    .watcher()
                    .tell(WatchMessage::Unwatch { watcher, watchee });
            }
            RemoteMessage::RemoteTerminate { watcher, watchee } => {
                let endpoint = self.resolve(watchee.address());
                endpoint
                    .watcher()
                    .tell(WatchMessage::RemoteTerminate { watcher, watchee });
            }
            RemoteMessage::RemoteDeliver(deliver) => {
                let endpoint = self.resolve(deliver.target.address());
                endpoint.writer().tell(deliver);
            }
        }
        Transition::Stay
    }

    /// Endpoint for `address`, spawning its workers on first reference.
    fn resolve(&mut self, address: &str) -> &Endpoint {
        let spawner = &self.spawner;
        let (endpoint, created) = self
            .registry
            .get_or_insert_with(address, || spawner.spawn(address));
        if created {
            self.workers_spawned += 2;
            tracing::debug!(address, "created endpoint");
        }
        endpoint
    }

    fn shutdown(&mut self) {
        let count = self.registry.len();
        for endpoint in self.registry.drain() {
            endpoint.watcher().stop();
            endpoint.writer().stop();
        }
        tracing::debug!(endpoints = count, "Stopped endpoint manager");
    }

    fn supervise(&mut self, failure: ChildFailure) {
        let directive = self.strategy.decide(&failure);
        tracing::info!(
            pid = %failure.child.pid(),
            error = %failure.reason,
            failures = failure.stats.failure_count,
            ?directive,
            "endpoint worker failed"
        );

        match directive {
            SupervisorDirective::Restart => {
                failure.child.restart();
                self.restarts += 1;
            }
            SupervisorDirective::RestartEndpoint => {
                match self.registry.find_by_pid(failure.child.pid()) {
                    Some(endpoint) => {
                        endpoint.writer().child_ref().restart();
                        endpoint.watcher().child_ref().restart();
                        self.restarts += 2;
                    }
                    None => {
                        failure.child.restart();
                        self.restarts += 1;
                    }
                }
            }
        }
    }

    fn snapshot(&self) -> ManagerSnapshot {
        let mut endpoints: Vec<EndpointSnapshot> = self
            .registry
            .iter()
            .map(|endpoint| EndpointSnapshot {
                address: endpoint.address().to_string(),
                writer: endpoint.writer().pid().clone(),
                watcher: endpoint.watcher().pid().clone(),
            })
            .collect();
        endpoints.sort_by(|a, b| a.address.cmp(&b.address));

        ManagerSnapshot {
            endpoints,
            workers_spawned: self.workers_spawned,
            restarts: self.restarts,
        }
    }
}

enum ManagerState<T: TaskProvider> {
    Active(Active<T>),
    Terminated,
}

/// Routes remote traffic to per-destination workers and supervises them.
///
/// Built and spawned with [`EndpointManager::builder`]; driven through the
/// returned [`EndpointManagerRef`].
pub struct EndpointManager<T: TaskProvider> {
    state: ManagerState<T>,
}

impl<T: TaskProvider> EndpointManager<T> {
    /// Start configuring a manager.
    pub fn builder() -> EndpointManagerBuilder {
        EndpointManagerBuilder::new()
    }

    fn handle(&mut self, command: ManagerCommand) {
        let mut active = match std::mem::replace(&mut self.state, ManagerState::Terminated) {
            ManagerState::Active(active) => active,
            ManagerState::Terminated => {
                tracing::trace!("endpoint manager terminated, message discarded");
                return;
            }
        };

        let transition = match command {
            ManagerCommand::Route(message) => active.route(message),
            ManagerCommand::Snapshot(reply) => {
                let _ = reply.send(active.snapshot());
                Transition::Stay
            }
        };

        if let Transition::Stay = transition {
            self.state = ManagerState::Active(active);
        }
    }

    fn handle_failure(&mut self, failure: ChildFailure) {
        match &mut self.state {
            ManagerState::Active(active) => active.supervise(failure),
            ManagerState::Terminated => {
                tracing::trace!(pid = %failure.child.pid(), "failure after shutdown ignored");
            }
        }
    }

    async fn run(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<ManagerCommand>,
        mut failures: FailureReceiver,
    ) {
        loop {
            tokio::select! {
                biased;

                Some(failure) = failures.recv() => self.handle_failure(failure),

                command = inbox.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }

        if let ManagerState::Active(active) = &mut self.state {
            tracing::debug!("every endpoint manager handle dropped");
            active.shutdown();
        }
        tracing::trace!("endpoint manager loop exited");
    }
}

/// Builder for an [`EndpointManager`].
///
/// # Example
///
/// ```rust,ignore
/// let manager = EndpointManager::<TokioTaskProvider>::builder()
///     .config(RemoteConfig::default())
///     .transport(Rc::new(MyTransport::new()))
///     .notifier(Rc::new(MyNotifier::new()))
///     .spawn(&TokioTaskProvider)?;
///
/// manager.deliver(RemoteDeliver::new(target, payload));
/// ```
pub struct EndpointManagerBuilder {
    config: RemoteConfig,
    transport: Option<Rc<dyn RemoteTransport>>,
    notifier: Option<Rc<dyn LocalNotifier>>,
    strategy: Box<dyn SupervisorStrategy>,
}

impl Default for EndpointManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointManagerBuilder {
    /// Builder with the default configuration and [`RestartFailedChild`].
    pub fn new() -> Self {
        Self {
            config: RemoteConfig::default(),
            transport: None,
            notifier: None,
            strategy: Box::new(RestartFailedChild),
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: RemoteConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the transport used by endpoint writers.
    pub fn transport(mut self, transport: Rc<dyn RemoteTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the notifier used by endpoint watchers.
    pub fn notifier(mut self, notifier: Rc<dyn LocalNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Set the supervisor strategy applied to worker faults.
    pub fn supervisor_strategy(mut self, strategy: impl SupervisorStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Spawn the manager on `task`. The start signal is the first message
    /// it processes.
    pub fn spawn<T: TaskProvider>(self, task: &T) -> Result<EndpointManagerRef, RemoteError> {
        let parts = self.build(task)?;
        parts.handle.send(RemoteMessage::Started);
        task.spawn_task(
            "endpoint_manager",
            parts.manager.run(parts.inbox, parts.failures),
        );
        Ok(parts.handle)
    }

    fn build<T: TaskProvider>(self, task: &T) -> Result<ManagerParts<T>, RemoteError> {
        self.config.validate()?;
        let transport = self.transport.ok_or(RemoteError::MissingTransport)?;
        let notifier = self.notifier.ok_or(RemoteError::MissingNotifier)?;

        let (tx, inbox) = mpsc::unbounded_channel();
        let (failures_tx, failures) = mpsc::unbounded_channel();
        let handle = EndpointManagerRef::new(tx);

        let spawner = EndpointSpawner {
            task: task.clone(),
            local_address: self.config.local_address().to_string(),
            batch_size: self.config.endpoint_writer_batch_size(),
            connect_options: Rc::new(self.config.connect_options()),
            transport,
            notifier,
            manager: handle.downgrade(),
            failures: failures_tx,
        };
        let manager = EndpointManager {
            state: ManagerState::Active(Active {
                registry: EndpointRegistry::new(),
                spawner,
                strategy: self.strategy,
                workers_spawned: 0,
                restarts: 0,
            }),
        };

        Ok(ManagerParts {
            handle,
            manager,
            inbox,
            failures,
        })
    }
}

/// A built manager, not yet running.
struct ManagerParts<T: TaskProvider> {
    handle: EndpointManagerRef,
    manager: EndpointManager<T>,
    inbox: mpsc::UnboundedReceiver<ManagerCommand>,
    failures: FailureReceiver,
}
