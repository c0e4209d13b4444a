//! Shared types for the Treeline log cluster.
//!
//! This crate defines the core types used across the Treeline workspace:
//! log identity ([`LogId`]), signed tree heads ([`SignedTreeHead`]),
//! per-node cluster state ([`ClusterNodeState`]), cluster-wide serving
//! policy ([`ClusterConfig`]), and the watch-delivery record ([`Update`]).

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Log identity
// ---------------------------------------------------------------------------

/// Identifier for a log: SHA-256 over the log's DER-encoded public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LogId([u8; 32]);

impl LogId {
    /// Derive a log ID from the log's DER-encoded public key.
    pub fn from_public_key(der: &[u8]) -> Self {
        Self(Sha256::digest(der).into())
    }

    /// Return the raw 32-byte representation.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for LogId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for LogId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogId({self})")
    }
}

// ---------------------------------------------------------------------------
// Signed tree heads
// ---------------------------------------------------------------------------

/// Tree head structure version.
///
/// Only V1 exists today; the field is carried so that a version mismatch
/// between the consistent store and the local database is detectable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeHeadVersion {
    /// RFC 6962 v1 tree head.
    #[default]
    V1,
}

/// A signed snapshot of the log.
///
/// Records the log's size and root hash at a point in time, together with
/// the identity of the log and an opaque signature blob. Signature
/// verification happens at the log frontend, not here; the coordination
/// layer treats the signature as payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTreeHead {
    /// Structure version.
    pub version: TreeHeadVersion,
    /// Identity of the log this head belongs to.
    pub log_id: LogId,
    /// Number of leaves in the tree.
    pub tree_size: u64,
    /// Milliseconds since the UNIX epoch at signing time.
    pub timestamp: u64,
    /// Merkle root hash over the first `tree_size` leaves.
    pub sha256_root_hash: [u8; 32],
    /// Opaque `DigitallySigned` blob over the tree head.
    pub signature: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Cluster state
// ---------------------------------------------------------------------------

/// Per-node state as published to the consistent store.
///
/// Each node keeps its own entry up to date; every node watches all
/// entries to maintain a live view of cluster replication progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNodeState {
    /// Unique node identifier (the store key for this entry).
    pub node_id: String,
    /// Hostname peers use to reach this node's log frontend.
    pub hostname: String,
    /// TCP port of the log frontend.
    pub log_port: u16,
    /// The newest tree head this node has fully replicated, if any.
    pub newest_sth: Option<SignedTreeHead>,
}

impl ClusterNodeState {
    /// Tree size of this node's newest replicated head, if it has one.
    pub fn newest_tree_size(&self) -> Option<u64> {
        self.newest_sth.as_ref().map(|sth| sth.tree_size)
    }
}

/// Cluster-wide serving policy.
///
/// A tree head may only be served once enough of the cluster has
/// replicated at least that many leaves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Minimum absolute number of nodes that must be able to serve.
    pub minimum_serving_nodes: u64,
    /// Minimum fraction of the cluster that must be able to serve, in [0, 1].
    pub minimum_serving_fraction: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            minimum_serving_nodes: 0,
            minimum_serving_fraction: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Watch deliveries
// ---------------------------------------------------------------------------

/// A single record delivered by a consistent-store watch.
///
/// `entry == None` signals that the key was deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update<T> {
    /// Store key the update is about.
    pub key: String,
    /// New value, or `None` on deletion.
    pub entry: Option<T>,
}

impl<T> Update<T> {
    /// An update that sets `key` to `entry`.
    pub fn set(key: impl Into<String>, entry: T) -> Self {
        Self {
            key: key.into(),
            entry: Some(entry),
        }
    }

    /// An update that deletes `key`.
    pub fn deleted(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            entry: None,
        }
    }

    /// Whether the key exists after this update.
    pub fn exists(&self) -> bool {
        self.entry.is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
