//! Address → endpoint mapping owned by the endpoint manager.

use std::collections::HashMap;

use super::Endpoint;
use crate::types::Pid;

/// Endpoints by destination address.
///
/// Entries are created lazily and only ever removed all at once, when the
/// manager shuts down.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: HashMap<String, Endpoint>,
}

impl EndpointRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Endpoint for `address`, if any.
    pub fn get(&self, address: &str) -> Option<&Endpoint> {
        self.endpoints.get(address)
    }

    /// Endpoint for `address`, created with `create` on first reference.
    ///
    /// Returns the endpoint and whether it was just created.
    pub fn get_or_insert_with(
        &mut self,
        address: &str,
        create: impl FnOnce() -> Endpoint,
    ) -> (&Endpoint, bool) {
        let created = !self.endpoints.contains_key(address);
        if created {
            self.endpoints.insert(address.to_string(), create());
        }
        (&self.endpoints[address], created)
    }

    /// The endpoint one of whose workers is `pid`.
    pub fn find_by_pid(&self, pid: &Pid) -> Option<&Endpoint> {
        self.endpoints.values().find(|endpoint| endpoint.owns(pid))
    }

    /// All endpoints, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.values()
    }

    /// Number of endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Remove and return every endpoint.
    pub fn drain(&mut self) -> impl Iterator<Item = Endpoint> + '_ {
        self.endpoints.drain().map(|(_, endpoint)| endpoint)
    }
}
