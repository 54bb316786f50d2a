//! Entry point used by the admin layer to freeze or unfreeze the cluster.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::coordinator::FreezeCoordinator;
use super::error::FreezeError;
use super::poller::ConvergencePoller;
use super::types::{AddressDirectory, FreezeConfig, FreezeStatusClient, RangeFreezer};

/// Sequences the change requests of a pass and the convergence wait.
///
/// There is no partial success: if the wait fails the caller only learns
/// about the error, even though the change requests stay applied.
pub struct ClusterFreezer {
    coordinator: FreezeCoordinator,
    poller: ConvergencePoller,
}

impl ClusterFreezer {
    /// Build a freezer whose transport serves both remote calls.
    ///
    /// `draining` stops the convergence wait and refuses new polls once
    /// cancelled.
    pub fn new<T>(
        transport: Arc<T>,
        directory: Arc<dyn AddressDirectory>,
        config: FreezeConfig,
        draining: CancellationToken,
    ) -> Self
    where
        T: RangeFreezer + FreezeStatusClient,
    {
        let coordinator = FreezeCoordinator::new(transport.clone(), config.origin_tag.clone());
        let poller = ConvergencePoller::new(directory, transport, &config, draining);
        Self::from_parts(coordinator, poller)
    }

    pub fn from_parts(coordinator: FreezeCoordinator, poller: ConvergencePoller) -> Self {
        Self {
            coordinator,
            poller,
        }
    }

    /// Freeze (`true`) or unfreeze (`false`) every range, then wait until all
    /// touched stores report the new state. Returns the number of ranges
    /// affected.
    pub async fn perform_freeze(&self, frozen: bool) -> Result<u64, FreezeError> {
        let started = Instant::now();
        tracing::info!(frozen, "starting cluster freeze pass");

        let summary = self.coordinator.run(frozen).await?;
        self.poller
            .wait_until_converged(&summary.stores, frozen)
            .await?;

        tracing::info!(
            frozen,
            ranges_affected = summary.ranges_affected,
            stores = summary.stores.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cluster freeze pass converged"
        );
        Ok(summary.ranges_affected)
    }
}
