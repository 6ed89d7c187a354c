//! Outbound worker: ships deliveries to one destination.

use std::rc::Rc;

use async_trait::async_trait;

use super::EndpointManagerRef;
use crate::config::ConnectOptions;
use crate::error::WorkerResult;
use crate::messages::RemoteDeliver;
use crate::process::{Props, Worker};
use crate::transport::{RemoteTransport, TransportChannel};

/// Owns the channel to one destination and transmits deliveries in
/// mailbox order, a batch at a time.
///
/// The channel is opened lazily on the first batch. A successful connect is
/// announced to the manager as an endpoint-connected event. A failed connect
/// or send is announced as endpoint-terminated and fails the worker, so the
/// manager restarts it; the next batch reconnects.
pub struct EndpointWriter {
    address: String,
    options: Rc<ConnectOptions>,
    transport: Rc<dyn RemoteTransport>,
    manager: EndpointManagerRef,
    channel: Option<Box<dyn TransportChannel>>,
}

impl EndpointWriter {
    /// Writer for `address`, not yet connected.
    pub fn new(
        address: impl Into<String>,
        options: Rc<ConnectOptions>,
        transport: Rc<dyn RemoteTransport>,
        manager: EndpointManagerRef,
    ) -> Self {
        Self {
            address: address.into(),
            options,
            transport,
            manager,
            channel: None,
        }
    }

    /// Props draining up to `batch_size` deliveries per flush.
    pub fn props(
        address: &str,
        options: Rc<ConnectOptions>,
        transport: Rc<dyn RemoteTransport>,
        manager: EndpointManagerRef,
        batch_size: usize,
    ) -> Props<Self> {
        let address = address.to_string();
        Props::from_producer(move || {
            EndpointWriter::new(
                address.clone(),
                options.clone(),
                transport.clone(),
                manager.clone(),
            )
        })
        .with_batch_size(batch_size)
    }

    /// Whether a channel is currently open.
    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    async fn connect(&self) -> WorkerResult<Box<dyn TransportChannel>> {
        match self.transport.connect(&self.address, &self.options).await {
            Ok(channel) => {
                tracing::debug!(address = %self.address, "endpoint writer connected");
                self.manager.endpoint_connected(&self.address);
                Ok(channel)
            }
            Err(error) => {
                tracing::warn!(address = %self.address, error = %error, "endpoint writer failed to connect");
                self.manager.endpoint_terminated(&self.address);
                Err(error.into())
            }
        }
    }
}

#[async_trait(?Send)]
impl Worker for EndpointWriter {
    type Message = RemoteDeliver;

    async fn handle(&mut self, message: RemoteDeliver) -> WorkerResult<()> {
        self.handle_batch(vec![message]).await
    }

    async fn handle_batch(&mut self, batch: Vec<RemoteDeliver>) -> WorkerResult<()> {
        let mut channel = match self.channel.take() {
            Some(channel) => channel,
            None => self.connect().await?,
        };

        let count = batch.len();
        match channel.send_batch(batch).await {
            Ok(()) => {
                tracing::trace!(address = %self.address, count, "sent batch");
                self.channel = Some(channel);
                Ok(())
            }
            Err(error) => {
                tracing::warn!(address = %self.address, error = %error, count, "endpoint writer lost connection");
                channel.close().await;
                self.manager.endpoint_terminated(&self.address);
                Err(error.into())
            }
        }
    }

    async fn stopped(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
            tracing::debug!(address = %self.address, "endpoint writer closed channel");
        }
    }
}
