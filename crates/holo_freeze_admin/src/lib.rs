//! gRPC plumbing around `holo_freeze`.
//!
//! Provides the protobuf transport for the two remote freeze primitives, a
//! static member directory, and the admin service that runs freeze passes on
//! request.

include!(concat!(env!("OUT_DIR"), "/volo_gen.rs"));

pub mod admin_service;
pub mod config;
pub mod directory;
pub mod transport;

pub use admin_service::{serve_admin, AdminService};
pub use config::{ClusterArgs, FreezeArgs};
pub use directory::{parse_members, StaticDirectory};
pub use transport::GrpcFreezeTransport;
pub use volo_gen::holo_freeze::rpc;
