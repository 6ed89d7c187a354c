//! Watch worker: liveness bookkeeping for one destination.
//!
//! Tracks which local processes watch which processes on the destination
//! node, forwards watch/unwatch requests to the remote side, and turns
//! remote terminations and connection loss into local [`Terminated`]
//! notices.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use async_trait::async_trait;

use super::EndpointManagerRef;
use crate::error::{NotifyError, WorkerError, WorkerResult};
use crate::messages::{Payload, RemoteDeliver, Terminated, WatchMessage};
use crate::process::{Props, Worker};
use crate::types::Pid;

/// Delivers termination notices to local watchers.
pub trait LocalNotifier {
    /// Tell `watcher` that `terminated.who` is gone.
    fn notify_terminated(&self, watcher: &Pid, terminated: Terminated) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connection {
    Connected,
    Terminated,
}

/// Watch bookkeeping for one destination.
///
/// State is not persisted: a restart forgets every relationship.
pub struct EndpointWatcher {
    address: String,
    notifier: Rc<dyn LocalNotifier>,
    manager: EndpointManagerRef,
    watched: BTreeMap<Pid, BTreeSet<Pid>>,
    connection: Connection,
}

impl EndpointWatcher {
    /// Watcher for `address`.
    pub fn new(
        address: impl Into<String>,
        notifier: Rc<dyn LocalNotifier>,
        manager: EndpointManagerRef,
    ) -> Self {
        Self {
            address: address.into(),
            notifier,
            manager,
            watched: BTreeMap::new(),
            connection: Connection::Connected,
        }
    }

    /// Props for a watcher of `address`.
    pub fn props(
        address: &str,
        notifier: Rc<dyn LocalNotifier>,
        manager: EndpointManagerRef,
    ) -> Props<Self> {
        let address = address.to_string();
        Props::from_producer(move || {
            EndpointWatcher::new(address.clone(), notifier.clone(), manager.clone())
        })
    }

    /// Local watchers of `watchee`.
    pub fn watchers_of(&self, watchee: &Pid) -> Vec<Pid> {
        self.watched
            .get(watchee)
            .map(|watchers| watchers.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of (watchee, watcher) relationships tracked.
    pub fn relationship_count(&self) -> usize {
        self.watched.values().map(BTreeSet::len).sum()
    }

    fn watch(&mut self, watcher: Pid, watchee: Pid) -> WorkerResult<()> {
        if self.connection == Connection::Terminated {
            // The node is gone already: answer right away.
            return self.notify(
                &watcher,
                Terminated {
                    who: watchee,
                    address_terminated: true,
                },
            );
        }

        let inserted = self
            .watched
            .entry(watchee.clone())
            .or_default()
            .insert(watcher.clone());
        if inserted {
            tracing::trace!(address = %self.address, watcher = %watcher, watchee = %watchee, "watch");
            self.manager
                .deliver(RemoteDeliver::system(watchee, Payload::Watch { watcher }));
        }
        Ok(())
    }

    fn unwatch(&mut self, watcher: Pid, watchee: Pid) {
        if !self.forget(&watcher, &watchee) {
            return;
        }
        tracing::trace!(address = %self.address, watcher = %watcher, watchee = %watchee, "unwatch");
        if self.connection == Connection::Connected {
            self.manager
                .deliver(RemoteDeliver::system(watchee, Payload::Unwatch { watcher }));
        }
    }

    fn remote_terminate(&mut self, watcher: Pid, watchee: Pid) -> WorkerResult<()> {
        self.forget(&watcher, &watchee);
        self.notify(
            &watcher,
            Terminated {
                who: watchee,
                address_terminated: false,
            },
        )
    }

    fn endpoint_terminated(&mut self) -> WorkerResult<()> {
        self.connection = Connection::Terminated;
        let watched = std::mem::take(&mut self.watched);
        tracing::info!(
            address = %self.address,
            watchees = watched.len(),
            "endpoint terminated, notifying watchers"
        );

        // Every watcher hears about every watchee once, even if one notice fails.
        let mut first_error = None;
        for (watchee, watchers) in watched {
            for watcher in watchers {
                let notice = Terminated {
                    who: watchee.clone(),
                    address_terminated: true,
                };
                if let Err(error) = self.notify(&watcher, notice) {
                    first_error.get_or_insert(error);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn forget(&mut self, watcher: &Pid, watchee: &Pid) -> bool {
        let Some(watchers) = self.watched.get_mut(watchee) else {
            return false;
        };
        let removed = watchers.remove(watcher);
        if watchers.is_empty() {
            self.watched.remove(watchee);
        }
        removed
    }

    fn notify(&self, watcher: &Pid, terminated: Terminated) -> WorkerResult<()> {
        self.notifier
            .notify_terminated(watcher, terminated)
            .map_err(WorkerError::from)
    }
}

#[async_trait(?Send)]
impl Worker for EndpointWatcher {
    type Message = WatchMessage;

    async fn handle(&mut self, message: WatchMessage) -> WorkerResult<()> {
        match message {
            WatchMessage::EndpointConnected => {
                if self.connection == Connection::Terminated {
                    tracing::debug!(address = %self.address, "endpoint reconnected");
                }
                self.connection = Connection::Connected;
                Ok(())
            }
            WatchMessage::EndpointTerminated => self.endpoint_terminated(),
            WatchMessage::Watch { watcher, watchee } => self.watch(watcher, watchee),
            WatchMessage::Unwatch { watcher, watchee } => {
                self.unwatch(watcher, watchee);
                Ok(())
            }
            WatchMessage::RemoteTerminate { watcher, watchee } => {
                self.remote_terminate(watcher, watchee)
            }
        }
    }
}
