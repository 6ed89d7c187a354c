//! Configuration for the remote endpoint layer.
//!
//! A [`RemoteConfig`] is built once, handed to the endpoint manager at
//! construction and shared read-only with every endpoint writer it spawns.
//! The transport-facing parts (channel options, call options, credentials)
//! are passed through to the [`RemoteTransport`](crate::RemoteTransport)
//! untouched.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default number of deliveries an endpoint writer drains per flush.
pub const DEFAULT_ENDPOINT_WRITER_BATCH_SIZE: usize = 1000;

/// Default local address used to name worker processes.
pub const DEFAULT_LOCAL_ADDRESS: &str = "nonhost";

/// Channel-level transport options (`name -> value`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOptions {
    /// Raw option entries, forwarded as-is.
    #[serde(default)]
    pub entries: BTreeMap<String, String>,
}

impl ChannelOptions {
    /// Add an option entry.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(name.into(), value.into());
        self
    }
}

/// Per-call options applied to every batch sent on a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOptions {
    /// Optional deadline for a single send.
    #[serde(default)]
    pub deadline: Option<Duration>,

    /// Metadata attached to each call.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Credentials used when opening a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelCredentials {
    /// Plain-text channel.
    #[default]
    Insecure,

    /// TLS channel, negotiated by the transport.
    Tls {
        /// Optional CA bundle path.
        ca_certificate: Option<String>,
        /// Optional domain name override.
        domain: Option<String>,
    },
}

/// Everything an endpoint writer hands to the transport when connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Channel options.
    pub channel_options: ChannelOptions,
    /// Per-call options.
    pub call_options: CallOptions,
    /// Channel credentials.
    pub credentials: ChannelCredentials,
}

/// Configuration of the remote endpoint layer.
///
/// # Example
///
/// ```rust,ignore
/// let config = RemoteConfig::builder()
///     .local_address("10.0.0.1:4500")
///     .endpoint_writer_batch_size(64)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    local_address: String,
    #[serde(default)]
    channel_options: ChannelOptions,
    #[serde(default)]
    call_options: CallOptions,
    #[serde(default)]
    credentials: ChannelCredentials,
    endpoint_writer_batch_size: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            local_address: DEFAULT_LOCAL_ADDRESS.to_string(),
            channel_options: ChannelOptions::default(),
            call_options: CallOptions::default(),
            credentials: ChannelCredentials::default(),
            endpoint_writer_batch_size: DEFAULT_ENDPOINT_WRITER_BATCH_SIZE,
        }
    }
}

impl RemoteConfig {
    /// Start building a configuration.
    pub fn builder() -> RemoteConfigBuilder {
        RemoteConfigBuilder::default()
    }

    /// Configuration for low-latency local networking: small batches,
    /// flushed often.
    pub fn local_network() -> Self {
        Self {
            endpoint_writer_batch_size: 16,
            ..Self::default()
        }
    }

    /// Configuration for high-latency WAN networking: large batches and a
    /// generous call deadline.
    pub fn wan_network() -> Self {
        Self {
            call_options: CallOptions {
                deadline: Some(Duration::from_secs(30)),
                headers: BTreeMap::new(),
            },
            endpoint_writer_batch_size: 5000,
            ..Self::default()
        }
    }

    /// Check invariants, typically after deserializing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint_writer_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.local_address.is_empty() {
            return Err(ConfigError::EmptyLocalAddress);
        }
        Ok(())
    }

    /// Address of the local node, used to name worker processes.
    pub fn local_address(&self) -> &str {
        &self.local_address
    }

    /// Transport channel options.
    pub fn channel_options(&self) -> &ChannelOptions {
        &self.channel_options
    }

    /// Per-call options.
    pub fn call_options(&self) -> &CallOptions {
        &self.call_options
    }

    /// Channel credentials.
    pub fn credentials(&self) -> &ChannelCredentials {
        &self.credentials
    }

    /// How many queued deliveries an endpoint writer drains per flush.
    pub fn endpoint_writer_batch_size(&self) -> usize {
        self.endpoint_writer_batch_size
    }

    /// The transport-facing subset of this configuration.
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            channel_options: self.channel_options.clone(),
            call_options: self.call_options.clone(),
            credentials: self.credentials.clone(),
        }
    }
}

/// Builder for [`RemoteConfig`].
#[derive(Debug, Clone, Default)]
pub struct RemoteConfigBuilder {
    local_address: Option<String>,
    channel_options: Option<ChannelOptions>,
    call_options: Option<CallOptions>,
    credentials: Option<ChannelCredentials>,
    endpoint_writer_batch_size: Option<usize>,
}

impl RemoteConfigBuilder {
    /// Set the local node address.
    pub fn local_address(mut self, address: impl Into<String>) -> Self {
        self.local_address = Some(address.into());
        self
    }

    /// Set the channel options.
    pub fn channel_options(mut self, options: ChannelOptions) -> Self {
        self.channel_options = Some(options);
        self
    }

    /// Set the per-call options.
    pub fn call_options(mut self, options: CallOptions) -> Self {
        self.call_options = Some(options);
        self
    }

    /// Set the channel credentials.
    pub fn credentials(mut self, credentials: ChannelCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the endpoint writer batch size.
    pub fn endpoint_writer_batch_size(mut self, batch_size: usize) -> Self {
        self.endpoint_writer_batch_size = Some(batch_size);
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<RemoteConfig, ConfigError> {
        let defaults = RemoteConfig::default();
        let config = RemoteConfig {
            local_address: self.local_address.unwrap_or(defaults.local_address),
            channel_options: self.channel_options.unwrap_or_default(),
            call_options: self.call_options.unwrap_or_default(),
            credentials: self.credentials.unwrap_or_default(),
            endpoint_writer_batch_size: self
                .endpoint_writer_batch_size
                .unwrap_or(defaults.endpoint_writer_batch_size),
        };
        config.validate()?;
        Ok(config)
    }
}
