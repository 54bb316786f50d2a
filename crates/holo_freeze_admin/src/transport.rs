//! gRPC implementation of the remote freeze primitives.
//!
//! Change requests are sent to one gateway node, which routes them through
//! the cluster. Status polls go straight to the node hosting each store, with
//! one cached client per address.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use holo_freeze::freeze::{
    FreezeChangeRequest, FreezeChangeResult, FreezeStatusClient, NodeId, RangeFreezer,
    StoreFreezeStatus, StoreId,
};
use parking_lot::Mutex;
use tokio::time;

use crate::rpc;

const SERVICE_NAME: &str = "holo_freeze.rpc.StoreFreezeRpc";

/// Talks `StoreFreezeRpc` to storage nodes.
pub struct GrpcFreezeTransport {
    gateway: SocketAddr,
    gateway_client: rpc::StoreFreezeRpcClient,
    clients: Mutex<HashMap<SocketAddr, rpc::StoreFreezeRpcClient>>,
    rpc_timeout: Duration,
}

impl GrpcFreezeTransport {
    pub fn new(gateway: SocketAddr, rpc_timeout: Duration) -> Self {
        Self {
            gateway,
            gateway_client: build_client(gateway),
            clients: Mutex::new(HashMap::new()),
            rpc_timeout: rpc_timeout.max(Duration::from_millis(1)),
        }
    }

    pub fn gateway(&self) -> SocketAddr {
        self.gateway
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    fn client_for(&self, addr: SocketAddr) -> rpc::StoreFreezeRpcClient {
        if addr == self.gateway {
            return self.gateway_client.clone();
        }
        self.clients
            .lock()
            .entry(addr)
            .or_insert_with(|| build_client(addr))
            .clone()
    }
}

fn build_client(addr: SocketAddr) -> rpc::StoreFreezeRpcClient {
    rpc::StoreFreezeRpcClientBuilder::new(SERVICE_NAME)
        .address(volo::net::Address::from(addr))
        .build()
}

#[async_trait]
impl RangeFreezer for GrpcFreezeTransport {
    async fn change_frozen(&self, req: FreezeChangeRequest) -> anyhow::Result<FreezeChangeResult> {
        let request = to_rpc_change_request(req);
        let response = time::timeout(self.rpc_timeout, self.gateway_client.change_frozen(request))
            .await
            .map_err(|_| anyhow!("change_frozen rpc timed out for {}", self.gateway))?
            .map_err(|err| anyhow!("change_frozen rpc failed for {}: {err}", self.gateway))?
            .into_inner();
        Ok(from_rpc_change_response(response))
    }
}

#[async_trait]
impl FreezeStatusClient for GrpcFreezeTransport {
    async fn poll_frozen(
        &self,
        addr: SocketAddr,
        node_id: NodeId,
        store_id: StoreId,
    ) -> anyhow::Result<StoreFreezeStatus> {
        let client = self.client_for(addr);
        let request = rpc::PollFrozenRequest { node_id, store_id };
        let response = time::timeout(self.rpc_timeout, client.poll_frozen(request))
            .await
            .map_err(|_| anyhow!("poll_frozen rpc timed out for {addr}"))?
            .map_err(|err| anyhow!("poll_frozen rpc failed for {addr}: {err}"))?
            .into_inner();
        Ok(StoreFreezeStatus {
            num_frozen: response.num_frozen,
            num_thawed: response.num_thawed,
        })
    }
}

fn to_rpc_change_request(req: FreezeChangeRequest) -> rpc::ChangeFrozenRequest {
    rpc::ChangeFrozenRequest {
        from_key: Bytes::from(req.from_key),
        to_key: Bytes::from(req.to_key),
        frozen: req.frozen,
        origin_tag: req.origin_tag.into(),
    }
}

fn from_rpc_change_response(resp: rpc::ChangeFrozenResponse) -> FreezeChangeResult {
    let stores: BTreeMap<StoreId, NodeId> = resp
        .stores
        .into_iter()
        .map(|entry| (entry.store_id, entry.node_id))
        .collect();
    FreezeChangeResult {
        ranges_affected: resp.ranges_affected,
        min_start_key: resp.min_start_key.to_vec(),
        stores,
    }
}
