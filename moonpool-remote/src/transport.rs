//! Transport seam used by endpoint writers.
//!
//! Wire format, retries and security negotiation belong to the transport.
//! The endpoint layer only opens one channel per destination and pushes
//! batches of deliveries through it, in order.

use async_trait::async_trait;

use crate::config::ConnectOptions;
use crate::error::TransportResult;
use crate::messages::RemoteDeliver;

/// Opens channels to remote nodes.
#[async_trait(?Send)]
pub trait RemoteTransport: 'static {
    /// Open a channel to `address`.
    async fn connect(
        &self,
        address: &str,
        options: &ConnectOptions,
    ) -> TransportResult<Box<dyn TransportChannel>>;
}

/// An open channel to one remote node.
#[async_trait(?Send)]
pub trait TransportChannel {
    /// Transmit a batch of deliveries, preserving their order.
    async fn send_batch(&mut self, batch: Vec<RemoteDeliver>) -> TransportResult<()>;

    /// Close the channel. Errors are ignored.
    async fn close(&mut self) {}
}
