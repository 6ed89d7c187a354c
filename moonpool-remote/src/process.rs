//! Supervised worker processes.
//!
//! A process is a local task that owns one [`Worker`] instance and feeds it
//! the messages of its mailbox, one turn at a time. Every process also has a
//! system mailbox ([`SystemMessage`]) that is always polled first.
//!
//! # Lifecycle
//!
//! ```text
//!            spawn                 handler error
//!  ─────────────────► Running ─────────────────────► Suspended
//!                      ▲   │                            │
//!                      │   │ Stop / mailbox closed      │ ChildFailure → supervisor
//!                      │   ▼                            │
//!                      │  Stopped ◄──── Stop ───────────┤
//!                      │                                │
//!                      └────────── Restart ─────────────┘
//! ```
//!
//! A restart rebuilds the worker from its producer. The pid and both
//! mailboxes are kept, so every [`ProcessRef`] handed out before the fault
//! stays valid. The message whose handling failed is not redelivered.

use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::WorkerResult;
use crate::supervision::{ChildFailure, ChildRef, FailureSender, RestartStatistics, SystemMessage};
use crate::task::TaskProvider;
use crate::types::Pid;

/// Behavior run inside a supervised process.
#[async_trait(?Send)]
pub trait Worker: 'static {
    /// Mailbox message type.
    type Message: 'static;

    /// Called when the instance is created, at spawn and after each restart.
    async fn started(&mut self) -> WorkerResult<()> {
        Ok(())
    }

    /// Handle one message.
    async fn handle(&mut self, message: Self::Message) -> WorkerResult<()>;

    /// Handle a batch of messages drained from the mailbox in arrival order.
    ///
    /// Only used when [`Props::with_batch_size`] is above one.
    async fn handle_batch(&mut self, batch: Vec<Self::Message>) -> WorkerResult<()> {
        for message in batch {
            self.handle(message).await?;
        }
        Ok(())
    }

    /// Called when the instance is discarded, on stop or before a restart.
    async fn stopped(&mut self) {}
}

/// Recipe for a process: how to (re)build its worker and how its mailbox
/// hands out messages.
pub struct Props<W: Worker> {
    producer: Rc<dyn Fn() -> W>,
    batch_size: usize,
}

impl<W: Worker> Props<W> {
    /// Props whose worker is built by `producer`.
    pub fn from_producer(producer: impl Fn() -> W + 'static) -> Self {
        Self {
            producer: Rc::new(producer),
            batch_size: 1,
        }
    }

    /// Drain up to `batch_size` ready messages per turn. Values below one
    /// are treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Configured batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn produce(&self) -> W {
        (self.producer)()
    }
}

impl<W: Worker> Clone for Props<W> {
    fn clone(&self) -> Self {
        Self {
            producer: self.producer.clone(),
            batch_size: self.batch_size,
        }
    }
}

/// Handle to a running process.
///
/// Cloning is cheap. The process exits once it is stopped or once every
/// handle is dropped.
pub struct ProcessRef<M> {
    pid: Pid,
    mailbox: mpsc::UnboundedSender<M>,
    system: mpsc::UnboundedSender<SystemMessage>,
}

impl<M> ProcessRef<M> {
    /// Identity of the process. Stable across restarts.
    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    /// Enqueue a message. Returns `false` if the process has exited.
    pub fn tell(&self, message: M) -> bool {
        self.mailbox.send(message).is_ok()
    }

    /// Ask the process to stop. Does not wait for it.
    pub fn stop(&self) {
        self.child_ref().stop();
    }

    /// Type-erased handle for supervision.
    pub fn child_ref(&self) -> ChildRef {
        ChildRef::new(self.pid.clone(), self.system.clone())
    }

    /// Whether the process has exited.
    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }
}

#[cfg(test)]
impl<M> ProcessRef<M> {
    /// A handle with no process behind it; the caller reads the mailbox.
    pub(crate) fn detached(pid: Pid) -> (Self, mpsc::UnboundedReceiver<M>) {
        let (mailbox, mailbox_rx) = mpsc::unbounded_channel();
        let (system, _) = mpsc::unbounded_channel();
        (
            Self {
                pid,
                mailbox,
                system,
            },
            mailbox_rx,
        )
    }
}

impl<M> Clone for ProcessRef<M> {
    fn clone(&self) -> Self {
        Self {
            pid: self.pid.clone(),
            mailbox: self.mailbox.clone(),
            system: self.system.clone(),
        }
    }
}

impl<M> fmt::Debug for ProcessRef<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRef").field("pid", &self.pid).finish()
    }
}

/// Spawn a process supervised through `supervisor`.
pub fn spawn_process<W, T>(
    task: &T,
    pid: Pid,
    props: Props<W>,
    supervisor: FailureSender,
) -> ProcessRef<W::Message>
where
    W: Worker,
    T: TaskProvider,
{
    let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
    let (system_tx, system_rx) = mpsc::unbounded_channel();

    let child = ChildRef::new(pid.clone(), system_tx.clone());
    task.spawn_task(
        &format!("process {pid}"),
        process_loop(child, props, mailbox_rx, system_rx, supervisor),
    );

    ProcessRef {
        pid,
        mailbox: mailbox_tx,
        system: system_tx,
    }
}

async fn process_loop<W: Worker>(
    child: ChildRef,
    props: Props<W>,
    mut mailbox: mpsc::UnboundedReceiver<W::Message>,
    mut system: mpsc::UnboundedReceiver<SystemMessage>,
    supervisor: FailureSender,
) {
    let pid = child.pid().clone();
    let mut stats = RestartStatistics::default();
    let mut worker = props.produce();
    let mut outcome = worker.started().await;

    tracing::trace!(pid = %pid, "process started");

    loop {
        if let Err(reason) = outcome {
            stats.record_failure();
            tracing::warn!(
                pid = %pid,
                error = %reason,
                failures = stats.failure_count,
                "process failed, suspending"
            );

            let failure = ChildFailure {
                child: child.clone(),
                reason,
                stats: stats.clone(),
            };
            if supervisor.send(failure).is_err() {
                tracing::debug!(pid = %pid, "supervisor gone, stopping");
                break;
            }

            // Suspended: the user mailbox is not polled until a directive arrives.
            outcome = tokio::select! {
                command = system.recv() => match command {
                    Some(SystemMessage::Restart) => {
                        worker = restart(&pid, worker, &props).await;
                        worker.started().await
                    }
                    Some(SystemMessage::Stop) | None => break,
                },
                _ = supervisor.closed() => {
                    tracing::debug!(pid = %pid, "supervisor gone while suspended, stopping");
                    break;
                }
            };
            continue;
        }

        outcome = tokio::select! {
            biased;

            command = system.recv() => match command {
                Some(SystemMessage::Restart) => {
                    worker = restart(&pid, worker, &props).await;
                    worker.started().await
                }
                Some(SystemMessage::Stop) | None => break,
            },

            message = mailbox.recv() => match message {
                Some(message) if props.batch_size > 1 => {
                    let batch = drain_batch(message, &mut mailbox, props.batch_size);
                    worker.handle_batch(batch).await
                }
                Some(message) => worker.handle(message).await,
                None => break,
            },
        };
    }

    worker.stopped().await;
    tracing::debug!(pid = %pid, "process stopped");
}

async fn restart<W: Worker>(pid: &Pid, mut worker: W, props: &Props<W>) -> W {
    worker.stopped().await;
    tracing::info!(pid = %pid, "restarting process");
    props.produce()
}

fn drain_batch<M>(first: M, mailbox: &mut mpsc::UnboundedReceiver<M>, limit: usize) -> Vec<M> {
    let mut batch = vec![first];
    while batch.len() < limit {
        match mailbox.try_recv() {
            Ok(message) => batch.push(message),
            Err(_) => break,
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::error::WorkerError;
    use crate::task::TokioTaskProvider;
    use crate::test_util::{run_local_test, settle};

    /// Shared view of what the workers did, across restarts.
    #[derive(Default)]
    struct Journal {
        instances: Cell<u32>,
        handled: RefCell<Vec<(u32, u32)>>,
        batches: RefCell<Vec<usize>>,
        stopped: Cell<u32>,
    }

    /// Records each message; fails on the value 0.
    struct Recorder {
        instance: u32,
        journal: Rc<Journal>,
    }

    #[async_trait(?Send)]
    impl Worker for Recorder {
        type Message = u32;

        async fn handle(&mut self, message: u32) -> WorkerResult<()> {
            if message == 0 {
                return Err(WorkerError::Other("zero".to_string()));
            }
            self.journal
                .handled
                .borrow_mut()
                .push((self.instance, message));
            Ok(())
        }

        async fn handle_batch(&mut self, batch: Vec<u32>) -> WorkerResult<()> {
            self.journal.batches.borrow_mut().push(batch.len());
            for message in batch {
                self.handle(message).await?;
            }
            Ok(())
        }

        async fn stopped(&mut self) {
            self.journal.stopped.set(self.journal.stopped.get() + 1);
        }
    }

    fn recorder_props(journal: &Rc<Journal>) -> Props<Recorder> {
        let journal = journal.clone();
        Props::from_producer(move || {
            let instance = journal.instances.get() + 1;
            journal.instances.set(instance);
            Recorder {
                instance,
                journal: journal.clone(),
            }
        })
    }

    #[test]
    fn test_messages_handled_in_order() {
        run_local_test(async {
            let journal = Rc::new(Journal::default());
            let (supervisor, _failures) = mpsc::unbounded_channel();
            let process = spawn_process(
                &TokioTaskProvider,
                Pid::new("local", "$recorder"),
                recorder_props(&journal),
                supervisor,
            );

            for n in 1..=5 {
                assert!(process.tell(n));
            }
            settle().await;

            let handled: Vec<u32> = journal.handled.borrow().iter().map(|(_, n)| *n).collect();
            assert_eq!(handled, vec![1, 2, 3, 4, 5]);
            assert_eq!(journal.instances.get(), 1);
        });
    }

    #[test]
    fn test_failure_reported_and_restart_keeps_identity() {
        run_local_test(async {
            let journal = Rc::new(Journal::default());
            let (supervisor, mut failures) = mpsc::unbounded_channel();
            let pid = Pid::new("local", "$recorder");
            let process = spawn_process(
                &TokioTaskProvider,
                pid.clone(),
                recorder_props(&journal),
                supervisor,
            );

            process.tell(1);
            process.tell(0);
            process.tell(2);
            settle().await;

            let failure = failures.try_recv().expect("failure reported");
            assert_eq!(failure.child.pid(), &pid);
            assert_eq!(failure.stats.failure_count, 1);
            assert_eq!(failure.reason, WorkerError::Other("zero".to_string()));

            // Suspended: message 2 waits for a directive.
            assert_eq!(journal.handled.borrow().len(), 1);

            failure.child.restart();
            settle().await;

            assert_eq!(journal.instances.get(), 2);
            assert_eq!(journal.stopped.get(), 1);
            assert_eq!(*journal.handled.borrow(), vec![(1, 1), (2, 2)]);
            assert_eq!(process.pid(), &pid);

            process.tell(0);
            settle().await;
            let failure = failures.try_recv().expect("second failure reported");
            assert_eq!(failure.stats.failure_count, 2);
        });
    }

    #[test]
    fn test_batches_drain_ready_messages() {
        run_local_test(async {
            let journal = Rc::new(Journal::default());
            let (supervisor, _failures) = mpsc::unbounded_channel();
            let process = spawn_process(
                &TokioTaskProvider,
                Pid::new("local", "$batcher"),
                recorder_props(&journal).with_batch_size(3),
                supervisor,
            );

            for n in 1..=7 {
                process.tell(n);
            }
            settle().await;

            assert_eq!(*journal.batches.borrow(), vec![3, 3, 1]);
            let handled: Vec<u32> = journal.handled.borrow().iter().map(|(_, n)| *n).collect();
            assert_eq!(handled, (1..=7).collect::<Vec<_>>());
        });
    }

    #[test]
    fn test_stop_runs_hook_and_closes_mailbox() {
        run_local_test(async {
            let journal = Rc::new(Journal::default());
            let (supervisor, _failures) = mpsc::unbounded_channel();
            let process = spawn_process(
                &TokioTaskProvider,
                Pid::new("local", "$stopper"),
                recorder_props(&journal),
                supervisor,
            );

            process.stop();
            settle().await;

            assert_eq!(journal.stopped.get(), 1);
            assert!(process.is_closed());
            assert!(!process.tell(1));
        });
    }

    #[test]
    fn test_process_stops_when_supervisor_gone() {
        run_local_test(async {
            let journal = Rc::new(Journal::default());
            let (supervisor, failures) = mpsc::unbounded_channel();
            drop(failures);
            let process = spawn_process(
                &TokioTaskProvider,
                Pid::new("local", "$orphan"),
                recorder_props(&journal),
                supervisor,
            );

            process.tell(0);
            settle().await;

            assert!(process.is_closed());
            assert_eq!(journal.instances.get(), 1);
        });
    }

    #[test]
    fn test_suspended_process_stops_when_supervisor_goes_away() {
        run_local_test(async {
            let journal = Rc::new(Journal::default());
            let (supervisor, mut failures) = mpsc::unbounded_channel();
            let process = spawn_process(
                &TokioTaskProvider,
                Pid::new("local", "$suspended"),
                recorder_props(&journal),
                supervisor,
            );

            process.tell(0);
            settle().await;
            let failure = failures.try_recv().expect("failure reported");
            assert!(!process.is_closed());

            drop(failure);
            drop(failures);
            settle().await;

            assert!(process.is_closed());
            assert_eq!(journal.stopped.get(), 1);
            assert_eq!(journal.instances.get(), 1);
        });
    }

    #[test]
    fn test_batch_size_floor() {
        let journal = Rc::new(Journal::default());
        assert_eq!(recorder_props(&journal).with_batch_size(0).batch_size(), 1);
    }
}
