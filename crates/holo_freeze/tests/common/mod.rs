//! In-memory cluster used by the integration tests.
//!
//! `SimCluster` models a range table plus a set of stores and serves all three
//! collaborator traits. It can inject splits between change requests, delay
//! convergence per store, fail lookups or polls, and records enough to check
//! ordering and concurrency properties afterwards.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use holo_freeze::freeze::{
    AddressDirectory, FreezeChangeRequest, FreezeChangeResult, FreezeConfig, FreezeStatusClient,
    KeyRange, NodeId, RangeFreezer, RetryOptions, StoreFreezeStatus, StoreId, KEY_MAX, LOCAL_MAX,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// One range of the simulated keyspace.
#[derive(Clone, Debug)]
pub struct SimRange {
    pub span: KeyRange,
    pub replicas: Vec<StoreId>,
    pub frozen: bool,
    /// Number of change requests that visited this range.
    pub visits: u32,
}

#[derive(Default)]
struct StoreSim {
    node_id: NodeId,
    /// Polls that report "not converged yet" before the real state shows.
    lagging_polls: u32,
    polls: u32,
    fail_polls: bool,
}

#[derive(Default)]
struct Inner {
    ranges: Vec<SimRange>,
    stores: BTreeMap<StoreId, StoreSim>,
    requests: Vec<FreezeChangeRequest>,
    /// Split keys applied right before the change request with that index.
    splits_before_request: BTreeMap<usize, Vec<Vec<u8>>>,
    fail_request: Option<usize>,
    unknown_nodes: BTreeSet<NodeId>,
    polling_now: HashSet<StoreId>,
    total_polls: u32,
    cancel_on_poll: Option<(u32, CancellationToken)>,
}

pub struct SimCluster {
    inner: Mutex<Inner>,
    poll_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    duplicate_poll: AtomicBool,
}

impl SimCluster {
    /// Build a cluster from range split points; every range is replicated on
    /// all `stores`, and store `n` lives on node `n`.
    pub fn new(split_keys: &[&[u8]], stores: &[StoreId]) -> Arc<Self> {
        let mut bounds: Vec<Vec<u8>> = vec![LOCAL_MAX.to_vec()];
        bounds.extend(split_keys.iter().map(|k| k.to_vec()));
        bounds.push(KEY_MAX.to_vec());

        let ranges = bounds
            .windows(2)
            .map(|w| SimRange {
                span: KeyRange::new(w[0].clone(), w[1].clone()),
                replicas: stores.to_vec(),
                frozen: false,
                visits: 0,
            })
            .collect();
        let stores = stores
            .iter()
            .map(|id| {
                (
                    *id,
                    StoreSim {
                        node_id: *id,
                        ..StoreSim::default()
                    },
                )
            })
            .collect();

        Arc::new(Self {
            inner: Mutex::new(Inner {
                ranges,
                stores,
                ..Inner::default()
            }),
            poll_delay: Mutex::new(Duration::ZERO),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            duplicate_poll: AtomicBool::new(false),
        })
    }

    /// Default layout: bootstrap range, one meta2 range straddling the end of
    /// routing metadata, two user ranges.
    pub fn standard(stores: &[StoreId]) -> Arc<Self> {
        Self::new(&[b"\x03\x10", b"\x04", b"m"], stores)
    }

    pub fn split_before_request(&self, request_index: usize, key: &[u8]) {
        self.inner
            .lock()
            .splits_before_request
            .entry(request_index)
            .or_default()
            .push(key.to_vec());
    }

    pub fn fail_request(&self, request_index: usize) {
        self.inner.lock().fail_request = Some(request_index);
    }

    pub fn set_lagging_polls(&self, store_id: StoreId, polls: u32) {
        if let Some(store) = self.inner.lock().stores.get_mut(&store_id) {
            store.lagging_polls = polls;
        }
    }

    pub fn fail_polls(&self, store_id: StoreId) {
        if let Some(store) = self.inner.lock().stores.get_mut(&store_id) {
            store.fail_polls = true;
        }
    }

    pub fn forget_node(&self, node_id: NodeId) {
        self.inner.lock().unknown_nodes.insert(node_id);
    }

    pub fn set_poll_delay(&self, delay: Duration) {
        *self.poll_delay.lock() = delay;
    }

    /// Cancel `token` while serving the `nth` poll (1-based).
    pub fn cancel_on_poll(&self, nth: u32, token: CancellationToken) {
        self.inner.lock().cancel_on_poll = Some((nth, token));
    }

    pub fn set_frozen_everywhere(&self, frozen: bool) {
        for range in &mut self.inner.lock().ranges {
            range.frozen = frozen;
        }
    }

    pub fn ranges(&self) -> Vec<SimRange> {
        self.inner.lock().ranges.clone()
    }

    pub fn requests(&self) -> Vec<FreezeChangeRequest> {
        self.inner.lock().requests.clone()
    }

    pub fn polls(&self, store_id: StoreId) -> u32 {
        self.inner
            .lock()
            .stores
            .get(&store_id)
            .map(|s| s.polls)
            .unwrap_or(0)
    }

    pub fn total_polls(&self) -> u32 {
        self.inner.lock().total_polls
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn saw_duplicate_poll(&self) -> bool {
        self.duplicate_poll.load(Ordering::SeqCst)
    }

    pub fn store_map(&self) -> BTreeMap<StoreId, NodeId> {
        self.inner
            .lock()
            .stores
            .iter()
            .map(|(id, s)| (*id, s.node_id))
            .collect()
    }

    pub fn addr_of(node_id: NodeId) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 20_000 + node_id as u16))
    }

    fn split(ranges: &mut Vec<SimRange>, key: &[u8]) {
        let Some(idx) = ranges.iter().position(|r| r.span.contains(key) && r.span.start != key)
        else {
            return;
        };
        let left = &mut ranges[idx];
        let right = SimRange {
            span: KeyRange::new(key.to_vec(), left.span.end.clone()),
            replicas: left.replicas.clone(),
            frozen: left.frozen,
            visits: 0,
        };
        left.span.end = key.to_vec();
        ranges.insert(idx + 1, right);
    }

    fn status(inner: &Inner, store_id: StoreId) -> StoreFreezeStatus {
        let mut status = StoreFreezeStatus::default();
        for range in inner.ranges.iter().filter(|r| r.replicas.contains(&store_id)) {
            if range.frozen {
                status.num_frozen += 1;
            } else {
                status.num_thawed += 1;
            }
        }
        status
    }
}

#[async_trait]
impl RangeFreezer for SimCluster {
    async fn change_frozen(&self, req: FreezeChangeRequest) -> anyhow::Result<FreezeChangeResult> {
        let mut inner = self.inner.lock();
        let index = inner.requests.len();
        inner.requests.push(req.clone());

        if let Some(keys) = inner.splits_before_request.remove(&index) {
            for key in keys {
                Self::split(&mut inner.ranges, &key);
            }
        }
        if inner.fail_request == Some(index) {
            anyhow::bail!("injected failure for request {index}");
        }

        let span = req.span();
        let mut result = FreezeChangeResult {
            min_start_key: req.to_key.clone(),
            ..FreezeChangeResult::default()
        };
        let mut touched = Vec::new();
        for range in inner.ranges.iter_mut().filter(|r| span.contains(&r.span.start)) {
            range.frozen = req.frozen;
            range.visits += 1;
            result.ranges_affected += 1;
            if range.span.start < result.min_start_key {
                result.min_start_key = range.span.start.clone();
            }
            touched.extend(range.replicas.iter().copied());
        }
        for store_id in touched {
            let node_id = inner.stores.get(&store_id).map(|s| s.node_id).unwrap_or(store_id);
            result.stores.insert(store_id, node_id);
        }
        Ok(result)
    }
}

#[async_trait]
impl FreezeStatusClient for SimCluster {
    async fn poll_frozen(
        &self,
        addr: SocketAddr,
        node_id: NodeId,
        store_id: StoreId,
    ) -> anyhow::Result<StoreFreezeStatus> {
        anyhow::ensure!(addr == Self::addr_of(node_id), "store {store_id} polled at wrong address {addr}");

        let cancel = {
            let mut inner = self.inner.lock();
            if !inner.polling_now.insert(store_id) {
                self.duplicate_poll.store(true, Ordering::SeqCst);
            }
            inner.total_polls += 1;
            let total = inner.total_polls;
            match inner.cancel_on_poll.take() {
                Some((nth, token)) if nth == total => Some(token),
                other => {
                    inner.cancel_on_poll = other;
                    None
                }
            }
        };
        if let Some(token) = cancel {
            token.cancel();
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let delay = *self.poll_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut inner = self.inner.lock();
        inner.polling_now.remove(&store_id);
        let actual = Self::status(&inner, store_id);
        let Some(store) = inner.stores.get_mut(&store_id) else {
            anyhow::bail!("unknown store {store_id}");
        };
        store.polls += 1;
        if store.fail_polls {
            anyhow::bail!("store {store_id} unavailable");
        }
        if store.polls <= store.lagging_polls {
            return Ok(StoreFreezeStatus {
                num_frozen: 1,
                num_thawed: 1,
            });
        }
        Ok(actual)
    }
}

impl AddressDirectory for SimCluster {
    fn resolve(&self, node_id: NodeId) -> anyhow::Result<SocketAddr> {
        if self.inner.lock().unknown_nodes.contains(&node_id) {
            anyhow::bail!("node descriptor {node_id} not found in gossip");
        }
        Ok(Self::addr_of(node_id))
    }
}

/// Config with zero backoff so tests run as fast as the runtime allows.
pub fn fast_config(max_inflight: usize, max_attempts: u32) -> FreezeConfig {
    FreezeConfig {
        max_inflight,
        retry: RetryOptions {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
            max_attempts,
        },
        origin_tag: "sim".to_string(),
    }
}
