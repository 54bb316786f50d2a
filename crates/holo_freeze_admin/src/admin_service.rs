//! `FreezeAdminRpc` handlers.
//!
//! A `ClusterFreeze` call runs one full pass and only answers once every
//! touched store has converged. `Drain` flips the node into shutdown mode so
//! running and future waits stop with `unavailable`.
//! Running passes are tracked so shutdown can wait for their answers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use holo_freeze::freeze::{AddressDirectory, ClusterFreezer, FreezeConfig, FreezeError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::rpc;
use crate::transport::GrpcFreezeTransport;

/// Admin gRPC service backed by a `ClusterFreezer`.
#[derive(Clone)]
pub struct AdminService {
    freezer: Arc<ClusterFreezer>,
    draining: CancellationToken,
    passes: TaskTracker,
}

impl AdminService {
    pub fn new(freezer: Arc<ClusterFreezer>, draining: CancellationToken) -> Self {
        Self {
            freezer,
            draining,
            passes: TaskTracker::new(),
        }
    }

    /// Wire the gRPC transport and a directory into a service.
    pub fn with_transport(
        transport: Arc<GrpcFreezeTransport>,
        directory: Arc<dyn AddressDirectory>,
        config: FreezeConfig,
        draining: CancellationToken,
    ) -> Self {
        tracing::debug!(
            gateway = %transport.gateway(),
            rpc_timeout_ms = transport.rpc_timeout().as_millis() as u64,
            max_inflight = config.max_inflight,
            "wiring freeze admin service"
        );
        let freezer = ClusterFreezer::new(transport, directory, config, draining.clone());
        Self::new(Arc::new(freezer), draining)
    }

    pub fn is_draining(&self) -> bool {
        self.draining.is_cancelled()
    }

    /// Passes currently running.
    pub fn running_passes(&self) -> usize {
        self.passes.len()
    }

    /// Drain, then wait up to `grace` for running passes to answer.
    ///
    /// Returns false if some pass was still running when `grace` ran out.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.draining.cancel();
        self.passes.close();
        match tokio::time::timeout(grace, self.passes.wait()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    running = self.passes.len(),
                    grace_ms = grace.as_millis() as u64,
                    "freeze passes still running after drain grace period"
                );
                false
            }
        }
    }
}

impl rpc::FreezeAdminRpc for AdminService {
    async fn cluster_freeze(
        &self,
        req: volo_grpc::Request<rpc::ClusterFreezeRequest>,
    ) -> Result<volo_grpc::Response<rpc::ClusterFreezeResponse>, volo_grpc::Status> {
        let frozen = req.into_inner().freeze;
        // A draining node must not start a pass it cannot finish.
        if self.is_draining() {
            return Err(status_for(&FreezeError::ShuttingDown));
        }

        match self
            .passes
            .track_future(self.freezer.perform_freeze(frozen))
            .await
        {
            Ok(ranges_affected) => Ok(volo_grpc::Response::new(rpc::ClusterFreezeResponse {
                ranges_affected,
            })),
            Err(err) => {
                tracing::warn!(frozen, error = %err, "cluster freeze failed");
                Err(status_for(&err))
            }
        }
    }

    async fn drain(
        &self,
        _req: volo_grpc::Request<rpc::DrainRequest>,
    ) -> Result<volo_grpc::Response<rpc::DrainResponse>, volo_grpc::Status> {
        if !self.draining.is_cancelled() {
            tracing::info!("draining freeze admin node");
            self.draining.cancel();
        }
        Ok(volo_grpc::Response::new(rpc::DrainResponse { draining: true }))
    }
}

/// Map a freeze failure onto a gRPC status.
pub fn status_for(err: &FreezeError) -> volo_grpc::Status {
    match err {
        FreezeError::ShuttingDown => volo_grpc::Status::unavailable(err.to_string()),
        FreezeError::Timeout { .. } => volo_grpc::Status::deadline_exceeded(err.to_string()),
        _ => volo_grpc::Status::internal(err.to_string()),
    }
}

/// Serve `FreezeAdminRpc` on `addr` until the server stops.
pub async fn serve_admin(addr: SocketAddr, service: AdminService) -> anyhow::Result<()> {
    let svc = rpc::FreezeAdminRpcServer::new(service);
    let svc = volo_grpc::server::ServiceBuilder::new(svc)
        .build::<rpc::FreezeAdminRpcRequestRecv, rpc::FreezeAdminRpcResponseSend>();
    volo_grpc::server::Server::new()
        .add_service(svc)
        .run(volo::net::Address::from(addr))
        .await
        .map_err(|err| anyhow!("freeze admin gRPC server on {addr} failed: {err}"))
}
