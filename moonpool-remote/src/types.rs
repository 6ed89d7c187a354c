//! Process identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Location-transparent process identifier: the node address the process
/// lives on plus its node-local id.
///
/// The address part is what the endpoint manager routes on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pid {
    /// Node address, e.g. `"10.0.0.1:4500"`.
    pub address: String,
    /// Node-local identifier.
    pub id: String,
}

impl Pid {
    /// Create a new pid.
    pub fn new(address: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            id: id.into(),
        }
    }

    /// The node address this process lives on.
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.id)
    }
}
