use thiserror::Error;

use super::keys::{display_key, KeyRange};
use super::types::{NodeId, StoreId};

/// Failure of a freeze pass.
///
/// Remote causes are kept as `anyhow::Error` so transports can attach their
/// own context.
#[derive(Debug, Error)]
pub enum FreezeError {
    #[error("change frozen request for {span} failed: {cause:#}")]
    ChangeFrozen { span: KeyRange, cause: anyhow::Error },

    #[error(
        "change frozen response for {span} reported min start key {} outside the span",
        display_key(.min_start_key)
    )]
    InvalidResponse { span: KeyRange, min_start_key: Vec<u8> },

    #[error("unable to resolve address of node {node_id}: {cause:#}")]
    Resolve { node_id: NodeId, cause: anyhow::Error },

    #[error("store {store_id} on node {node_id} failed to report freeze status: {cause:#}")]
    PollFrozen {
        store_id: StoreId,
        node_id: NodeId,
        cause: anyhow::Error,
    },

    #[error("node is shutting down")]
    ShuttingDown,

    /// `stores` lists the unconverged store ids and `attempts` the polling
    /// iterations that ran; both are for diagnostics only.
    #[error(
        "timed out waiting for {remaining} store{} to report freeze",
        plural_suffix(.remaining)
    )]
    Timeout {
        remaining: usize,
        stores: Vec<StoreId>,
        attempts: u32,
    },
}

impl FreezeError {
    /// Whether the error came from the node draining rather than the cluster.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, FreezeError::ShuttingDown)
    }
}

fn plural_suffix(count: &usize) -> &'static str {
    if *count == 1 {
        ""
    } else {
        "s"
    }
}
