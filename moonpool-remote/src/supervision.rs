//! Supervision: fault notifications from workers and the supervisor's
//! reaction to them.
//!
//! A worker whose handler fails suspends its mailbox and reports a
//! [`ChildFailure`] (who failed, why, and how often) on its supervisor
//! channel. The supervisor feeds the failure to a [`SupervisorStrategy`],
//! a pure function returning a [`SupervisorDirective`], and applies it
//! through the child's [`ChildRef`].

use std::fmt;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::WorkerError;
use crate::types::Pid;

/// Control messages delivered ahead of any user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SystemMessage {
    /// Rebuild the worker from its producer, keeping pid and mailbox.
    Restart,
    /// Run the stop hook and exit.
    Stop,
}

/// Sender side of a supervisor's fault channel.
pub type FailureSender = mpsc::UnboundedSender<ChildFailure>;

/// Receiver side of a supervisor's fault channel.
pub type FailureReceiver = mpsc::UnboundedReceiver<ChildFailure>;

/// Type-erased handle to a supervised process, used to steer it.
#[derive(Clone)]
pub struct ChildRef {
    pid: Pid,
    system: mpsc::UnboundedSender<SystemMessage>,
}

impl ChildRef {
    pub(crate) fn new(pid: Pid, system: mpsc::UnboundedSender<SystemMessage>) -> Self {
        Self { pid, system }
    }

    /// Identity of the child.
    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    /// Restart the child in place.
    pub(crate) fn restart(&self) {
        if self.system.send(SystemMessage::Restart).is_err() {
            tracing::trace!(pid = %self.pid, "restart for exited process dropped");
        }
    }

    /// Ask the child to stop. Does not wait for it.
    pub(crate) fn stop(&self) {
        if self.system.send(SystemMessage::Stop).is_err() {
            tracing::trace!(pid = %self.pid, "stop for exited process dropped");
        }
    }
}

impl fmt::Debug for ChildRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildRef").field("pid", &self.pid).finish()
    }
}

impl PartialEq for ChildRef {
    fn eq(&self, other: &Self) -> bool {
        self.pid == other.pid
    }
}

impl Eq for ChildRef {}

/// Failure history of one supervised process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestartStatistics {
    /// Number of failures since the process was spawned, this one included.
    pub failure_count: u32,
    /// When the most recent failure happened.
    pub last_failure_at: Option<Instant>,
}

impl RestartStatistics {
    /// Record a new failure.
    pub fn record_failure(&mut self) {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure_at = Some(Instant::now());
    }
}

/// Fault notification sent by a suspended child to its supervisor.
#[derive(Debug, Clone)]
pub struct ChildFailure {
    /// The failed child.
    pub child: ChildRef,
    /// Why it failed.
    pub reason: WorkerError,
    /// Its failure history.
    pub stats: RestartStatistics,
}

/// What to do about a failed child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorDirective {
    /// Restart only the failed child.
    Restart,
    /// Restart the failed child and its sibling on the same endpoint.
    RestartEndpoint,
}

/// Decides how a supervisor reacts to a child failure.
///
/// Implementations must be pure: the directive depends only on the failure.
pub trait SupervisorStrategy {
    /// Pick a directive for the failure.
    fn decide(&self, failure: &ChildFailure) -> SupervisorDirective;
}

/// Unconditionally restart the failed child, and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestartFailedChild;

impl SupervisorStrategy for RestartFailedChild {
    fn decide(&self, _failure: &ChildFailure) -> SupervisorDirective {
        SupervisorDirective::Restart
    }
}

/// Unconditionally restart both workers of the failed child's endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestartWholeEndpoint;

impl SupervisorStrategy for RestartWholeEndpoint {
    fn decide(&self, _failure: &ChildFailure) -> SupervisorDirective {
        SupervisorDirective::RestartEndpoint
    }
}
