//! Task spawning abstraction for single-threaded environments.
//!
//! The endpoint manager and every worker run as local tasks on the current
//! thread. Spawning goes through [`TaskProvider`] so that callers can swap
//! in their own executor (for example a simulation scheduler).

use std::future::Future;

use async_trait::async_trait;

/// Provider for spawning local tasks in single-threaded context.
#[async_trait(?Send)]
pub trait TaskProvider: Clone + 'static {
    /// Spawn a named task that runs on the current thread.
    fn spawn_task<F>(&self, name: &str, future: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + 'static;

    /// Yield control to allow other tasks to run.
    async fn yield_now(&self);
}

/// [`TaskProvider`] backed by `tokio::task::spawn_local`.
///
/// Must be used from within a `LocalSet`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTaskProvider;

#[async_trait(?Send)]
impl TaskProvider for TokioTaskProvider {
    fn spawn_task<F>(&self, name: &str, future: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + 'static,
    {
        tracing::trace!(task = name, "spawning local task");
        tokio::task::spawn_local(future)
    }

    async fn yield_now(&self) {
        tokio::task::yield_now().await;
    }
}
