//! Message contracts of the remote endpoint layer.
//!
//! [`RemoteMessage`] is everything the endpoint manager routes. The manager
//! resolves each addressable message to a destination and forwards it as a
//! [`RemoteDeliver`] to the destination's writer or as a [`WatchMessage`] to
//! its watcher.

use std::collections::BTreeMap;

use crate::types::Pid;

/// Serializer id used when the sender does not pick one.
pub const DEFAULT_SERIALIZER_ID: u32 = 0;

/// Optional per-message metadata.
pub type MessageHeader = BTreeMap<String, String>;

/// What a remote delivery carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Opaque, already-serialized user message.
    Message(Vec<u8>),

    /// Ask the remote node to report the target's termination to `watcher`.
    Watch {
        /// Local process interested in the target.
        watcher: Pid,
    },

    /// Cancel a previous [`Payload::Watch`].
    Unwatch {
        /// Local process no longer interested in the target.
        watcher: Pid,
    },
}

/// A message bound for a process on another node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDeliver {
    /// Destination process. Its address selects the endpoint.
    pub target: Pid,
    /// Message body.
    pub payload: Payload,
    /// Optional sender, for replies.
    pub sender: Option<Pid>,
    /// Optional metadata.
    pub header: Option<MessageHeader>,
    /// Serializer the transport should use for the payload.
    pub serializer_id: u32,
}

impl RemoteDeliver {
    /// Delivery of an opaque user message.
    pub fn new(target: Pid, payload: Vec<u8>) -> Self {
        Self {
            target,
            payload: Payload::Message(payload),
            sender: None,
            header: None,
            serializer_id: DEFAULT_SERIALIZER_ID,
        }
    }

    /// Delivery of a watch system payload.
    pub fn system(target: Pid, payload: Payload) -> Self {
        Self {
            target,
            payload,
            sender: None,
            header: None,
            serializer_id: DEFAULT_SERIALIZER_ID,
        }
    }

    /// Attach a sender.
    pub fn with_sender(mut self, sender: Pid) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Attach a header.
    pub fn with_header(mut self, header: MessageHeader) -> Self {
        self.header = Some(header);
        self
    }

    /// Select a serializer.
    pub fn with_serializer(mut self, serializer_id: u32) -> Self {
        self.serializer_id = serializer_id;
        self
    }
}

/// Routing events accepted by the endpoint manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteMessage {
    /// The manager was just created.
    Started,

    /// Stop every endpoint and discard all further events.
    Stop,

    /// A connection to `address` became live.
    EndpointConnected {
        /// Destination address.
        address: String,
    },

    /// The connection to `address` terminated.
    EndpointTerminated {
        /// Destination address.
        address: String,
    },

    /// `watcher` (local) wants to know when `watchee` (remote) terminates.
    RemoteWatch {
        /// Local watcher.
        watcher: Pid,
        /// Remote process being watched.
        watchee: Pid,
    },

    /// `watcher` stops watching `watchee`.
    RemoteUnwatch {
        /// Local watcher.
        watcher: Pid,
        /// Remote process being watched.
        watchee: Pid,
    },

    /// The remote `watchee` terminated; tell `watcher`.
    RemoteTerminate {
        /// Local watcher.
        watcher: Pid,
        /// Remote process that terminated.
        watchee: Pid,
    },

    /// Send a message to a remote process.
    RemoteDeliver(RemoteDeliver),
}

/// Mailbox type of an endpoint watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchMessage {
    /// The connection to this watcher's destination became live.
    EndpointConnected,

    /// The connection to this watcher's destination terminated.
    EndpointTerminated,

    /// Record that `watcher` watches `watchee`.
    Watch {
        /// Local watcher.
        watcher: Pid,
        /// Remote watchee.
        watchee: Pid,
    },

    /// Forget that `watcher` watches `watchee`.
    Unwatch {
        /// Local watcher.
        watcher: Pid,
        /// Remote watchee.
        watchee: Pid,
    },

    /// `watchee` terminated remotely.
    RemoteTerminate {
        /// Local watcher.
        watcher: Pid,
        /// Remote watchee.
        watchee: Pid,
    },
}

/// Termination notice handed to a local watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terminated {
    /// The remote process that is gone.
    pub who: Pid,
    /// `true` when the whole remote node became unreachable.
    pub address_terminated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deliver_builders() {
        let deliver = RemoteDeliver::new(Pid::new("a:1", "t"), b"hi".to_vec())
            .with_sender(Pid::new("b:1", "s"))
            .with_serializer(2);

        assert_eq!(deliver.payload, Payload::Message(b"hi".to_vec()));
        assert_eq!(deliver.sender, Some(Pid::new("b:1", "s")));
        assert_eq!(deliver.serializer_id, 2);
        assert!(deliver.header.is_none());
    }
}
