//! Cluster coordination core for Treeline.
//!
//! This crate provides:
//!
//! - [`ClusterStateController`] — wires consistent-store watches to the
//!   peer registry, serving-tree-head selection, election gating, local
//!   database reconciliation, and the background publisher.
//! - [`ClusterPeer`] / [`PeerRegistry`] — per-node tracking with a log
//!   client bound to each peer's announced endpoint.

mod controller;
mod peer;
mod serving;

#[cfg(test)]
mod tests;

pub use controller::ClusterStateController;
pub use peer::{ClusterPeer, PeerRegistry};
