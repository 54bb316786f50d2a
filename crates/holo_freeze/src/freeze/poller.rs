//! Convergence polling after a freeze pass.
//!
//! The change requests only guarantee that the affected ranges were told to
//! change state. Each store then has to observe it locally, so the poller asks
//! every touched store for its frozen/thawed replica counts until all of them
//! agree with the desired state.
//!
//! Locking model:
//! - one mutex guards the per-store states and the first recorded error
//! - remote calls are never made while it is held
//! - a store is only ever polled by the task that marked it in flight
//!
//! Between iterations the loop waits until an outstanding poll has finished,
//! so an attempt is never spent while every dispatched poll is still running.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::error::FreezeError;
use super::retry::{Retry, RetryOptions};
use super::runner::{Rejected, TaskRunner};
use super::types::{AddressDirectory, FreezeConfig, FreezeStatusClient, NodeId, StoreId};

/// Progress of a single store towards the desired state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConvergenceState {
    /// Eligible for polling in the next iteration.
    #[default]
    NotAttempted,
    /// A poll is outstanding.
    InFlight,
    /// The store reported the desired state. Final.
    Converged,
}

/// State shared between the controlling loop and the poll tasks.
#[derive(Default)]
struct PollState {
    stores: HashMap<StoreId, ConvergenceState>,
    first_err: Option<FreezeError>,
}

impl PollState {
    fn state(&self, store_id: StoreId) -> ConvergenceState {
        self.stores.get(&store_id).copied().unwrap_or_default()
    }

    /// Finish an outstanding poll. Converged stores are never downgraded.
    fn settle(&mut self, store_id: StoreId, next: ConvergenceState) {
        if self.state(store_id) == ConvergenceState::InFlight {
            self.stores.insert(store_id, next);
        }
    }

    /// Keep only the first error of the wait; later ones are dropped.
    fn record_err(&mut self, err: FreezeError) {
        if self.first_err.is_none() {
            self.first_err = Some(err);
        }
    }

    fn unconverged(&self, stores: &BTreeMap<StoreId, NodeId>) -> Vec<StoreId> {
        stores
            .keys()
            .copied()
            .filter(|store_id| self.state(*store_id) != ConvergenceState::Converged)
            .collect()
    }
}

/// Waits until every store touched by a pass reports the desired state.
pub struct ConvergencePoller {
    directory: Arc<dyn AddressDirectory>,
    client: Arc<dyn FreezeStatusClient>,
    retry: RetryOptions,
    max_inflight: usize,
    draining: CancellationToken,
}

impl ConvergencePoller {
    pub fn new(
        directory: Arc<dyn AddressDirectory>,
        client: Arc<dyn FreezeStatusClient>,
        config: &FreezeConfig,
        draining: CancellationToken,
    ) -> Self {
        Self {
            directory,
            client,
            retry: config.retry.clone(),
            max_inflight: config.max_inflight.max(1),
            draining,
        }
    }

    /// Poll `stores` until all of them converge on `frozen`.
    ///
    /// Fails with the first resolution or poll error, with
    /// `FreezeError::ShuttingDown` when the node starts draining, and with
    /// `FreezeError::Timeout` when the retry budget runs out first.
    ///
    /// After every iteration that leaves stores unconverged the loop blocks
    /// until one of its polls finishes, so each attempt observes at least one
    /// new answer.
    pub async fn wait_until_converged(
        &self,
        stores: &BTreeMap<StoreId, NodeId>,
        frozen: bool,
    ) -> Result<(), FreezeError> {
        let shared = Arc::new(Mutex::new(PollState::default()));
        let runner = TaskRunner::new(self.max_inflight, self.draining.clone());
        let mut retry = Retry::start(self.retry.clone(), self.draining.clone());

        while retry.next().await {
            let (remaining, err) = self.dispatch(&shared, &runner, stores, frozen);
            if let Some(err) = err {
                tracing::warn!(frozen, attempt = retry.attempt(), error = %err, "freeze wait failed");
                return Err(err);
            }
            tracing::debug!(
                frozen,
                attempt = retry.attempt(),
                remaining,
                in_flight = runner.in_flight(),
                "waiting for stores to report freeze"
            );
            if remaining == 0 {
                return Ok(());
            }

            let seen = runner.finished();
            tokio::select! {
                _ = runner.wait_finished(seen) => {}
                _ = self.draining.cancelled() => {}
            }
            if shared.lock().unconverged(stores).is_empty() {
                return Ok(());
            }
        }

        let (unconverged, err) = {
            let mut state = shared.lock();
            (state.unconverged(stores), state.first_err.take())
        };
        if let Some(err) = err {
            tracing::warn!(frozen, attempt = retry.attempt(), error = %err, "freeze wait failed");
            return Err(err);
        }
        if unconverged.is_empty() {
            return Ok(());
        }
        if retry.cancelled() {
            return Err(FreezeError::ShuttingDown);
        }
        tracing::warn!(
            frozen,
            attempts = retry.attempt(),
            remaining = unconverged.len(),
            stores = ?unconverged,
            "stores did not converge before the retry budget ran out"
        );
        Err(FreezeError::Timeout {
            remaining: unconverged.len(),
            stores: unconverged,
            attempts: retry.attempt(),
        })
    }

    /// Run one iteration: submit a poll for every eligible store, then report
    /// how many stores are still unconverged along with any recorded error.
    fn dispatch(
        &self,
        shared: &Arc<Mutex<PollState>>,
        runner: &TaskRunner,
        stores: &BTreeMap<StoreId, NodeId>,
        frozen: bool,
    ) -> (usize, Option<FreezeError>) {
        let mut state = shared.lock();

        for (&store_id, &node_id) in stores {
            if state.state(store_id) != ConvergenceState::NotAttempted {
                continue;
            }
            let addr = match self.directory.resolve(node_id) {
                Ok(addr) => addr,
                Err(cause) => {
                    tracing::warn!(store_id, node_id, error = ?cause, "unable to resolve store address");
                    state.record_err(FreezeError::Resolve { node_id, cause });
                    break;
                }
            };

            state.stores.insert(store_id, ConvergenceState::InFlight);
            let task = poll_store(
                shared.clone(),
                self.client.clone(),
                addr,
                node_id,
                store_id,
                frozen,
            );
            match runner.try_submit(task) {
                Ok(()) => {}
                Err(Rejected::Saturated) => {
                    // Remaining stores wait for a slot in a later iteration.
                    state.stores.insert(store_id, ConvergenceState::NotAttempted);
                    break;
                }
                Err(Rejected::Draining) => {
                    tracing::warn!(store_id, node_id, "refusing to poll store, node is draining");
                    state.stores.insert(store_id, ConvergenceState::NotAttempted);
                    state.record_err(FreezeError::ShuttingDown);
                    break;
                }
            }
        }

        let remaining = stores
            .keys()
            .filter(|store_id| state.state(**store_id) != ConvergenceState::Converged)
            .count();
        (remaining, state.first_err.take())
    }
}

/// Poll one store and record the outcome.
async fn poll_store(
    shared: Arc<Mutex<PollState>>,
    client: Arc<dyn FreezeStatusClient>,
    addr: SocketAddr,
    node_id: NodeId,
    store_id: StoreId,
    frozen: bool,
) {
    let result = client.poll_frozen(addr, node_id, store_id).await;
    match result {
        Ok(status) => {
            let converged = status.converged(frozen);
            tracing::debug!(
                store_id,
                node_id,
                frozen,
                num_frozen = status.num_frozen,
                num_thawed = status.num_thawed,
                converged,
                "store reported freeze status"
            );
            let next = if converged {
                ConvergenceState::Converged
            } else {
                ConvergenceState::NotAttempted
            };
            shared.lock().settle(store_id, next);
        }
        Err(cause) => {
            tracing::warn!(store_id, node_id, %addr, error = ?cause, "freeze status poll failed");
            let mut state = shared.lock();
            state.settle(store_id, ConvergenceState::NotAttempted);
            state.record_err(FreezeError::PollFrozen {
                store_id,
                node_id,
                cause,
            });
        }
    }
}
