//! Command-line and environment configuration.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Args;
use holo_freeze::freeze::{FreezeConfig, RetryOptions, DEFAULT_MAX_INFLIGHT};

/// Where the cluster lives.
#[derive(Args, Clone, Debug)]
pub struct ClusterArgs {
    /// Node that receives change requests and routes them through the cluster.
    #[arg(long, env = "HOLO_FREEZE_GATEWAY")]
    pub gateway: SocketAddr,

    /// Comma-separated list like: `1@127.0.0.1:15051,2@127.0.0.1:15052`
    #[arg(long, env = "HOLO_FREEZE_MEMBERS")]
    pub members: String,
}

/// Tuning of a freeze pass.
#[derive(Args, Clone, Debug)]
pub struct FreezeArgs {
    /// Maximum outstanding freeze-status polls.
    #[arg(long, env = "HOLO_FREEZE_MAX_INFLIGHT", default_value_t = DEFAULT_MAX_INFLIGHT)]
    pub max_inflight: usize,

    #[arg(long, env = "HOLO_FREEZE_RETRY_INITIAL_MS", default_value_t = 50)]
    pub retry_initial_ms: u64,

    #[arg(long, env = "HOLO_FREEZE_RETRY_MAX_MS", default_value_t = 1000)]
    pub retry_max_ms: u64,

    #[arg(long, env = "HOLO_FREEZE_RETRY_MULTIPLIER", default_value_t = 2.0)]
    pub retry_multiplier: f64,

    /// Convergence checks before giving up, including the first one.
    #[arg(long, env = "HOLO_FREEZE_RETRY_MAX_ATTEMPTS", default_value_t = 20)]
    pub retry_max_attempts: u32,

    /// Timeout for each outbound RPC.
    #[arg(long, env = "HOLO_RPC_TIMEOUT_MS", default_value_t = 2000)]
    pub rpc_timeout_ms: u64,

    /// Tag recorded with every change request. Defaults to the build version.
    #[arg(long, env = "HOLO_FREEZE_ORIGIN_TAG")]
    pub origin_tag: Option<String>,
}

impl Default for FreezeArgs {
    fn default() -> Self {
        Self {
            max_inflight: DEFAULT_MAX_INFLIGHT,
            retry_initial_ms: 50,
            retry_max_ms: 1000,
            retry_multiplier: 2.0,
            retry_max_attempts: 20,
            rpc_timeout_ms: 2000,
            origin_tag: None,
        }
    }
}

impl FreezeArgs {
    /// Sanitized core configuration.
    pub fn freeze_config(&self) -> FreezeConfig {
        let initial_backoff = Duration::from_millis(self.retry_initial_ms);
        let max_backoff = Duration::from_millis(self.retry_max_ms).max(initial_backoff);
        let multiplier = if self.retry_multiplier.is_finite() && self.retry_multiplier >= 1.0 {
            self.retry_multiplier
        } else {
            1.0
        };

        let defaults = FreezeConfig::default();
        FreezeConfig {
            max_inflight: self.max_inflight.max(1),
            retry: RetryOptions {
                initial_backoff,
                max_backoff,
                multiplier,
                max_attempts: self.retry_max_attempts.max(1),
            },
            origin_tag: self
                .origin_tag
                .clone()
                .filter(|tag| !tag.trim().is_empty())
                .unwrap_or(defaults.origin_tag),
        }
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms.max(1))
    }
}
