//! `holo-freeze-admin`: freeze or unfreeze every range of a HoloStore cluster.

use std::io::IsTerminal;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use holo_freeze::freeze::ClusterFreezer;
use holo_freeze_admin::{
    rpc, serve_admin, AdminService, ClusterArgs, FreezeArgs, GrpcFreezeTransport, StaticDirectory,
};
use tokio_util::sync::CancellationToken;

const ADMIN_SERVICE_NAME: &str = "holo_freeze.rpc.FreezeAdminRpc";
/// How long ctrl-c waits for running passes to answer before exiting.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "holo-freeze-admin")]
#[command(about = "Cluster-wide freeze orchestration for HoloStore", long_about = None)]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the freeze admin gRPC API.
    Serve {
        #[arg(long, env = "HOLO_FREEZE_LISTEN_GRPC", default_value = "127.0.0.1:15070")]
        listen_grpc: SocketAddr,
        #[command(flatten)]
        cluster: ClusterArgs,
        #[command(flatten)]
        freeze: FreezeArgs,
    },
    /// Ask a running admin server to freeze or unfreeze the cluster.
    ClusterFreeze {
        #[arg(long, default_value = "127.0.0.1:15070")]
        target: SocketAddr,
        /// Set to true to freeze, false to unfreeze.
        #[arg(long, action = clap::ArgAction::Set, value_parser = clap::value_parser!(bool))]
        frozen: bool,
    },
    /// Put a running admin server into shutdown mode.
    Drain {
        #[arg(long, default_value = "127.0.0.1:15070")]
        target: SocketAddr,
    },
    /// Run one freeze or unfreeze pass in this process.
    Run {
        #[command(flatten)]
        cluster: ClusterArgs,
        #[command(flatten)]
        freeze: FreezeArgs,
        /// Set to true to freeze, false to unfreeze.
        #[arg(long, action = clap::ArgAction::Set, value_parser = clap::value_parser!(bool))]
        frozen: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Enable ANSI colors only when stdout is a terminal and NO_COLOR is unset.
    let ansi = std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    tracing_subscriber::fmt()
        .with_ansi(ansi)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,h2=warn,hyper=warn".into()),
        )
        .init();

    let args = Args::parse();
    match args.cmd {
        Command::Serve {
            listen_grpc,
            cluster,
            freeze,
        } => serve(listen_grpc, cluster, freeze).await,
        Command::ClusterFreeze { target, frozen } => {
            let resp = admin_client(target)
                .cluster_freeze(rpc::ClusterFreezeRequest { freeze: frozen })
                .await
                .with_context(|| format!("cluster freeze via {target}"))?
                .into_inner();
            println!("ok ranges_affected={}", resp.ranges_affected);
            Ok(())
        }
        Command::Drain { target } => {
            let resp = admin_client(target)
                .drain(rpc::DrainRequest {})
                .await
                .with_context(|| format!("drain via {target}"))?
                .into_inner();
            println!("ok draining={}", resp.draining);
            Ok(())
        }
        Command::Run {
            cluster,
            freeze,
            frozen,
        } => run_once(cluster, freeze, frozen).await,
    }
}

fn admin_client(target: SocketAddr) -> rpc::FreezeAdminRpcClient {
    rpc::FreezeAdminRpcClientBuilder::new(ADMIN_SERVICE_NAME)
        .address(volo::net::Address::from(target))
        .build()
}

fn build_service(
    cluster: &ClusterArgs,
    freeze: &FreezeArgs,
    draining: CancellationToken,
) -> anyhow::Result<AdminService> {
    let directory = StaticDirectory::from_members(&cluster.members).context("parse members")?;
    let transport = GrpcFreezeTransport::new(cluster.gateway, freeze.rpc_timeout());
    Ok(AdminService::with_transport(
        Arc::new(transport),
        Arc::new(directory),
        freeze.freeze_config(),
        draining,
    ))
}

/// Serve the admin API until ctrl-c.
///
/// On ctrl-c the node drains and keeps serving for up to `DRAIN_GRACE` so
/// running passes can report `unavailable` to their callers.
async fn serve(listen: SocketAddr, cluster: ClusterArgs, freeze: FreezeArgs) -> anyhow::Result<()> {
    let draining = CancellationToken::new();
    let service = build_service(&cluster, &freeze, draining)?;
    tracing::info!(
        listen = %listen,
        gateway = %cluster.gateway,
        max_inflight = freeze.max_inflight,
        "starting freeze admin server"
    );

    let mut server = tokio::spawn(serve_admin(listen, service.clone()));
    tokio::select! {
        result = &mut server => {
            result.context("freeze admin server task panicked")??;
        }
        result = tokio::signal::ctrl_c() => {
            result.context("wait for ctrl-c")?;
            tracing::info!(
                running = service.running_passes(),
                "shutting down freeze admin server"
            );
            if service.shutdown(DRAIN_GRACE).await {
                tracing::info!("running passes answered, stopping server");
            }
            server.abort();
        }
    }
    Ok(())
}

/// Perform a single pass without a server; ctrl-c aborts the wait.
async fn run_once(cluster: ClusterArgs, freeze: FreezeArgs, frozen: bool) -> anyhow::Result<()> {
    let draining = CancellationToken::new();
    let directory = StaticDirectory::from_members(&cluster.members).context("parse members")?;
    let transport = Arc::new(GrpcFreezeTransport::new(cluster.gateway, freeze.rpc_timeout()));
    let freezer = ClusterFreezer::new(
        transport,
        Arc::new(directory),
        freeze.freeze_config(),
        draining.clone(),
    );

    tokio::spawn({
        let draining = draining.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, abandoning freeze wait");
                draining.cancel();
            }
        }
    });

    let ranges_affected = freezer
        .perform_freeze(frozen)
        .await
        .with_context(|| format!("cluster freeze (frozen={frozen})"))?;
    println!("ok ranges_affected={ranges_affected}");
    Ok(())
}
