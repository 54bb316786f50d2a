//! Keyspace traversal for freeze and unfreeze passes.
//!
//! Only ranges whose start key falls inside a request's span are changed, so a
//! range straddling a span boundary is picked up by the request to its left.
//! Each request reports the leftmost range start it actually covered, and the
//! next (lower) request ends exactly there. A split that lands between two
//! requests therefore cannot leave a gap or be visited twice.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::error::FreezeError;
use super::keys::{pass_start_keys, KEY_MAX};
use super::types::{FreezeChangeRequest, NodeId, RangeFreezer, StoreId};

/// Aggregate outcome of all change requests in a pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FreezeSummary {
    pub ranges_affected: u64,
    /// Every store touched by any request; later requests win on node
    /// conflicts for the same store.
    pub stores: BTreeMap<StoreId, NodeId>,
}

/// Issues the ordered change requests of one freeze or unfreeze pass.
pub struct FreezeCoordinator {
    freezer: Arc<dyn RangeFreezer>,
    origin_tag: String,
}

impl FreezeCoordinator {
    pub fn new(freezer: Arc<dyn RangeFreezer>, origin_tag: impl Into<String>) -> Self {
        Self {
            freezer,
            origin_tag: origin_tag.into(),
        }
    }

    /// Apply the desired state to every range in the cluster.
    ///
    /// A failed request aborts the pass; requests that already succeeded are
    /// not undone.
    pub async fn run(&self, frozen: bool) -> Result<FreezeSummary, FreezeError> {
        let mut summary = FreezeSummary::default();
        let mut to_key = KEY_MAX.to_vec();

        for &from_key in pass_start_keys(frozen) {
            let req = FreezeChangeRequest {
                from_key: from_key.to_vec(),
                to_key: to_key.clone(),
                frozen,
                origin_tag: self.origin_tag.clone(),
            };
            let span = req.span();
            let result = match self.freezer.change_frozen(req).await {
                Ok(result) => result,
                Err(cause) => {
                    tracing::warn!(frozen, span = %span, error = ?cause, "change frozen request failed");
                    return Err(FreezeError::ChangeFrozen { span, cause });
                }
            };

            // The covered start must lie inside the span, otherwise chaining the
            // next request off it could skip or overlap ranges.
            if result.min_start_key.as_slice() < from_key
                || result.min_start_key.as_slice() > to_key.as_slice()
            {
                return Err(FreezeError::InvalidResponse {
                    span,
                    min_start_key: result.min_start_key,
                });
            }

            tracing::info!(
                frozen,
                span = %span,
                ranges_affected = result.ranges_affected,
                stores = result.stores.len(),
                "applied freeze change"
            );

            summary.ranges_affected += result.ranges_affected;
            summary.stores.extend(result.stores);
            to_key = result.min_start_key;
        }

        Ok(summary)
    }
}
