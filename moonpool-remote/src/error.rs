//! Error types for the remote endpoint layer.
//!
//! Worker faults never reach callers of the endpoint manager. They travel
//! to the manager through the supervision channel as [`WorkerError`] and are
//! handled by restarting the worker.

use thiserror::Error;

/// Errors raised by a [`RemoteTransport`](crate::RemoteTransport) or one of
/// its channels.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Could not establish a connection to the destination.
    #[error("Connection to {address} failed: {reason}")]
    ConnectFailed {
        /// Destination address.
        address: String,
        /// Transport-provided reason.
        reason: String,
    },

    /// An established connection was lost.
    #[error("Connection to {0} lost")]
    ConnectionLost(String),

    /// A batch could not be written to the connection.
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised while notifying a local watcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The local watcher no longer exists.
    #[error("Watcher {0} is gone")]
    WatcherGone(String),

    /// Generic delivery failure.
    #[error("Notification failed: {0}")]
    Failed(String),
}

/// A fault inside an outbound or watch worker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Destination fault raised by the transport.
    #[error("Transport fault: {0}")]
    Transport(#[from] TransportError),

    /// Watch bookkeeping fault raised while notifying local watchers.
    #[error("Watch fault: {0}")]
    Notify(#[from] NotifyError),

    /// Any other worker failure.
    #[error("Worker failed: {0}")]
    Other(String),
}

/// Result type for worker handlers.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors related to [`RemoteConfig`](crate::RemoteConfig) validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The endpoint writer batch size must be at least one.
    #[error("Endpoint writer batch size must be at least 1")]
    ZeroBatchSize,

    /// The local address is used to name worker processes and cannot be empty.
    #[error("Local address cannot be empty")]
    EmptyLocalAddress,
}

/// Errors raised while building the endpoint manager.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// No transport was supplied to the builder.
    #[error("No remote transport configured")]
    MissingTransport,

    /// No local notifier was supplied to the builder.
    #[error("No local notifier configured")]
    MissingNotifier,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
