//! Per-destination endpoints and the manager that owns them.
//!
//! # Architecture
//!
//! ```text
//!   producers ──► EndpointManagerRef ──► EndpointManager (one task)
//!                                          │  EndpointRegistry
//!                                          │  address → Endpoint
//!                      ┌───────────────────┴───────────────────┐
//!                      ▼                                       ▼
//!          EndpointWriter (per address)          EndpointWatcher (per address)
//!          RemoteDeliver → RemoteTransport       watch bookkeeping → LocalNotifier
//! ```
//!
//! Writer and watcher faults flow back to the manager as
//! [`ChildFailure`](crate::ChildFailure)s; the manager restarts the failed
//! worker in place.

mod manager;
mod registry;
mod watcher;
mod writer;

pub use manager::{
    EndpointManager, EndpointManagerBuilder, EndpointManagerRef, EndpointSnapshot,
    ManagerSnapshot,
};
pub use registry::EndpointRegistry;
pub use watcher::{EndpointWatcher, LocalNotifier};
pub use writer::EndpointWriter;

use crate::messages::{RemoteDeliver, WatchMessage};
use crate::process::ProcessRef;
use crate::types::Pid;

/// The writer/watcher pair serving one destination.
///
/// Immutable once built. The handles stay valid across worker restarts.
#[derive(Debug, Clone)]
pub struct Endpoint {
    address: String,
    writer: ProcessRef<RemoteDeliver>,
    watcher: ProcessRef<WatchMessage>,
}

impl Endpoint {
    /// Pair `writer` and `watcher` for `address`.
    pub fn new(
        address: impl Into<String>,
        writer: ProcessRef<RemoteDeliver>,
        watcher: ProcessRef<WatchMessage>,
    ) -> Self {
        Self {
            address: address.into(),
            writer,
            watcher,
        }
    }

    /// Destination address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Outbound worker.
    pub fn writer(&self) -> &ProcessRef<RemoteDeliver> {
        &self.writer
    }

    /// Watch worker.
    pub fn watcher(&self) -> &ProcessRef<WatchMessage> {
        &self.watcher
    }

    /// Whether `pid` names one of this endpoint's workers.
    pub fn owns(&self, pid: &Pid) -> bool {
        self.writer.pid() == pid || self.watcher.pid() == pid
    }
}
