//! Static node address directory.

use std::collections::HashMap;
use std::net::SocketAddr;

use anyhow::Context;
use holo_freeze::freeze::{AddressDirectory, NodeId};
use parking_lot::RwLock;

/// Node addresses from a configured member list.
///
/// Membership can be edited at runtime; lookups never block on I/O.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    members: RwLock<HashMap<NodeId, SocketAddr>>,
}

impl StaticDirectory {
    pub fn new(members: HashMap<NodeId, SocketAddr>) -> Self {
        Self {
            members: RwLock::new(members),
        }
    }

    /// Build from a `1@127.0.0.1:15051,2@127.0.0.1:15052` style list.
    pub fn from_members(input: &str) -> anyhow::Result<Self> {
        Ok(Self::new(parse_members(input)?))
    }

    /// Add a member or move it to a new address.
    pub fn upsert(&self, node_id: NodeId, addr: SocketAddr) -> Option<SocketAddr> {
        self.members.write().insert(node_id, addr)
    }

    pub fn remove(&self, node_id: NodeId) -> Option<SocketAddr> {
        self.members.write().remove(&node_id)
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }
}

impl AddressDirectory for StaticDirectory {
    fn resolve(&self, node_id: NodeId) -> anyhow::Result<SocketAddr> {
        self.members
            .read()
            .get(&node_id)
            .copied()
            .with_context(|| format!("node {node_id} is not a known member"))
    }
}

/// Parse a comma-separated `id@host:port` member list.
pub fn parse_members(input: &str) -> anyhow::Result<HashMap<NodeId, SocketAddr>> {
    let mut out = HashMap::new();
    for part in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (id, addr) = part
            .split_once('@')
            .with_context(|| format!("invalid member entry (expected id@host:port): {part}"))?;
        let id: NodeId = id
            .trim()
            .parse()
            .with_context(|| format!("invalid member id in {part}"))?;
        let addr: SocketAddr = addr
            .trim()
            .parse()
            .with_context(|| format!("invalid member addr in {part}"))?;
        out.insert(id, addr);
    }
    anyhow::ensure!(!out.is_empty(), "member list is empty");
    Ok(out)
}
