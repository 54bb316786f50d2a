//! Freeze module wiring.
//!
//! `coordinator` walks the keyspace issuing change requests, `poller` waits for
//! store convergence on top of `runner` and `retry`, and `types`/`keys` define
//! the shared data model and trait contracts.

mod cluster;
mod coordinator;
mod error;
mod keys;
mod poller;
mod retry;
mod runner;
mod types;

pub use cluster::ClusterFreezer;
pub use coordinator::{FreezeCoordinator, FreezeSummary};
pub use error::FreezeError;
pub use keys::{
    display_key, pass_start_keys, KeyRange, KEY_MAX, KEY_MIN, LOCAL_MAX, META1_KEY_MAX, META2_KEY_MAX,
};
pub use poller::{ConvergencePoller, ConvergenceState};
pub use retry::{Retry, RetryOptions};
pub use runner::{Rejected, TaskRunner};
pub use types::{
    AddressDirectory, FreezeChangeRequest, FreezeChangeResult, FreezeConfig, FreezeStatusClient,
    NodeId, RangeFreezer, StoreFreezeStatus, StoreId, DEFAULT_MAX_INFLIGHT,
};
