//! Raft type configuration.
//!
//! Operator-facing server ids are strings; openraft wants a numeric
//! `NodeId`. Each id maps to a `u64` through a truncated blake3 digest,
//! and the full string id plus transport address travel in the membership
//! as the [`Member`] node payload, so any node can render cluster info
//! with real ids and addresses.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::command::Command;

/// Membership payload: the operator-chosen id and the raft transport
/// address (`host:port`, not the HTTP address).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub addr: String,
}

impl Member {
    pub fn new(id: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            addr: addr.into(),
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.addr)
    }
}

/// Response produced by applying a command. Carries no payload; callers
/// only need the commit acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {}

openraft::declare_raft_types!(
    /// Raft types for the replicated key-value store.
    pub TypeConfig:
        D = Command,
        R = Ack,
        NodeId = u64,
        Node = Member,
        Entry = openraft::Entry<TypeConfig>,
        SnapshotData = std::io::Cursor<Vec<u8>>,
        AsyncRuntime = openraft::TokioRuntime,
);

pub type NodeId = u64;
pub type MafRaft = openraft::Raft<TypeConfig>;

/// Stable mapping from an operator-chosen string id to the numeric raft id.
///
/// Every node must compute the same value for the same string, across
/// processes and releases; blake3 is deterministic and the truncation keeps
/// the collision probability negligible at cluster sizes of 3-7 voters.
pub fn node_id(id: &str) -> NodeId {
    let digest = blake3::hash(id.as_bytes());
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_is_stable() {
        assert_eq!(node_id("server-1"), node_id("server-1"));
        assert_ne!(node_id("server-1"), node_id("server-2"));
    }

    #[test]
    fn member_display() {
        let m = Member::new("a", "127.0.0.1:7081");
        assert_eq!(m.to_string(), "a@127.0.0.1:7081");
    }
}
