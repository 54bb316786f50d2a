//! Shared types for freeze orchestration.
//!
//! These are kept dependency-light because they are used both by the
//! coordinator/poller and by the transport layers that implement the remote
//! calls.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use async_trait::async_trait;

use super::keys::KeyRange;
use super::retry::RetryOptions;

/// Logical node identifier.
pub type NodeId = u64;
/// Durable store identifier, independent of the node currently hosting it.
pub type StoreId = u64;

/// Upper bound on concurrently outstanding freeze-status polls.
pub const DEFAULT_MAX_INFLIGHT: usize = 256;

/// Request to move every range whose start key falls in `[from_key, to_key)`
/// to the desired frozen state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FreezeChangeRequest {
    pub from_key: Vec<u8>,
    pub to_key: Vec<u8>,
    pub frozen: bool,
    /// Build tag of the issuing process, recorded by the remote side.
    pub origin_tag: String,
}

impl FreezeChangeRequest {
    pub fn span(&self) -> KeyRange {
        KeyRange::new(self.from_key.clone(), self.to_key.clone())
    }
}

/// Outcome of one change request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FreezeChangeResult {
    pub ranges_affected: u64,
    /// Start key of the leftmost range actually covered, or the request's
    /// `to_key` when no range started inside the span.
    pub min_start_key: Vec<u8>,
    /// Stores holding replicas of the affected ranges.
    pub stores: BTreeMap<StoreId, NodeId>,
}

/// Replica counts reported by one store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreFreezeStatus {
    /// Replicas currently frozen.
    pub num_frozen: u64,
    /// Replicas not frozen yet.
    pub num_thawed: u64,
}

impl StoreFreezeStatus {
    /// Whether the store has fully reached the desired state.
    pub fn converged(&self, frozen: bool) -> bool {
        if frozen {
            self.num_thawed == 0
        } else {
            self.num_frozen == 0
        }
    }
}

/// Remote "apply freeze change" primitive.
///
/// Implementations route the request through the cluster so that every range
/// starting inside the span is visited in forward key order. The call must be
/// safe to repeat; this crate never retries it.
#[async_trait]
pub trait RangeFreezer: Send + Sync + 'static {
    async fn change_frozen(&self, req: FreezeChangeRequest)
        -> anyhow::Result<FreezeChangeResult>;
}

/// Remote "report freeze status" primitive for a single store.
///
/// Calls must finish in bounded time: the convergence wait does not start
/// its next iteration until an outstanding poll has returned.
#[async_trait]
pub trait FreezeStatusClient: Send + Sync + 'static {
    async fn poll_frozen(
        &self,
        addr: SocketAddr,
        node_id: NodeId,
        store_id: StoreId,
    ) -> anyhow::Result<StoreFreezeStatus>;
}

/// Resolves a node id to its current network address.
///
/// Lookups are local (gossip or static membership) and must not block.
pub trait AddressDirectory: Send + Sync + 'static {
    fn resolve(&self, node_id: NodeId) -> anyhow::Result<SocketAddr>;
}

/// Tuning for one freeze pass.
#[derive(Clone, Debug)]
pub struct FreezeConfig {
    /// Ceiling on outstanding status polls, independent of cluster size.
    pub max_inflight: usize,
    /// Backoff and budget of the convergence loop.
    pub retry: RetryOptions,
    /// Tag attached to every change request.
    pub origin_tag: String,
}

impl Default for FreezeConfig {
    fn default() -> Self {
        Self {
            max_inflight: DEFAULT_MAX_INFLIGHT,
            retry: RetryOptions::default(),
            origin_tag: concat!("holo_freeze-", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
