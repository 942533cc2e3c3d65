use serde::{Deserialize, Serialize};
use std::fmt;
use tempo_types::NodeId;

/// Handle used to address messages to a remote node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    pub nid: NodeId,
    pub address: String,
}

impl Peer {
    pub fn new(nid: NodeId, address: impl Into<String>) -> Self {
        Self {
            nid,
            address: address.into(),
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.nid, self.address)
    }
}
