//! Cluster freeze crate.
//!
//! This crate holds the control-plane logic that freezes and unfreezes every
//! range of a HoloStore cluster and then waits until each affected store has
//! observed the requested state. Higher layers supply a `RangeFreezer`, a
//! `FreezeStatusClient` and an `AddressDirectory`, then drive a pass through
//! `ClusterFreezer`.

pub mod freeze;
