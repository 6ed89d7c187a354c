//! # Moonpool Remote
//!
//! Remote endpoint management for moonpool actors.
//!
//! Every message or watch request aimed at a process on another node goes
//! through one [`EndpointManager`]. The manager keeps one [`Endpoint`] per
//! destination address, a pair of supervised workers:
//!
//! - an [`EndpointWriter`] that ships deliveries to the node, in order and
//!   in batches, over a pluggable [`RemoteTransport`];
//! - an [`EndpointWatcher`] that tracks which local processes watch which
//!   remote ones and reports terminations through a [`LocalNotifier`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  EndpointManagerRef (clone anywhere)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  EndpointManager: one task, one queue, EndpointRegistry     │
//! │  Active ──Stop──► Terminated                                │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  EndpointWriter (per node)   │  EndpointWatcher (per node)  │
//! │  RemoteTransport             │  LocalNotifier               │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │  process: Worker, Props, ProcessRef, supervision            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Endpoints are created lazily on first reference and live until the
//! manager stops. Worker faults are reported to the manager, which restarts
//! the worker in place without touching other endpoints.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use moonpool_remote::{EndpointManager, RemoteConfig, RemoteDeliver, Pid, TokioTaskProvider};
//!
//! let manager = EndpointManager::<TokioTaskProvider>::builder()
//!     .config(RemoteConfig::default())
//!     .transport(transport)
//!     .notifier(notifier)
//!     .spawn(&TokioTaskProvider)?;
//!
//! manager.deliver(RemoteDeliver::new(Pid::new("node1:8080", "7"), payload));
//! manager.stop();
//! ```

#![deny(missing_docs)]

mod config;
mod endpoint;
mod error;
mod messages;
mod process;
mod supervision;
mod task;
mod transport;
mod types;

#[cfg(test)]
extern crate self as moonpool_remote;

#[cfg(test)]
#[path = "../tests/common/mod.rs"]
mod test_util;

pub use config::{
    CallOptions, ChannelCredentials, ChannelOptions, ConnectOptions, RemoteConfig,
    RemoteConfigBuilder, DEFAULT_ENDPOINT_WRITER_BATCH_SIZE, DEFAULT_LOCAL_ADDRESS,
};
pub use endpoint::{
    Endpoint, EndpointManager, EndpointManagerBuilder, EndpointManagerRef, EndpointRegistry,
    EndpointSnapshot, EndpointWatcher, EndpointWriter, LocalNotifier, ManagerSnapshot,
};
pub use error::{
    ConfigError, NotifyError, RemoteError, TransportError, TransportResult, WorkerError,
    WorkerResult,
};
pub use messages::{
    MessageHeader, Payload, RemoteDeliver, RemoteMessage, Terminated, WatchMessage,
    DEFAULT_SERIALIZER_ID,
};
pub use process::{spawn_process, ProcessRef, Props, Worker};
pub use supervision::{
    ChildFailure, ChildRef, FailureReceiver, FailureSender, RestartFailedChild,
    RestartStatistics, RestartWholeEndpoint, SupervisorDirective, SupervisorStrategy,
};
pub use task::{TaskProvider, TokioTaskProvider};
pub use transport::{RemoteTransport, TransportChannel};
pub use types::Pid;
