//! [`TreeHeadDb`] implementation with Fjall (disk) and in-memory backends.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use fjall::{Database, Keyspace, KeyspaceCreateOptions};
use tracing::debug;
use treeline_types::SignedTreeHead;

use crate::DbError;

type Result<T> = std::result::Result<T, DbError>;

/// Store key for the newest tree head pointer in the `state` keyspace.
const LATEST_KEY: &[u8] = b"latest_tree_head";

/// Read side of the local tree-head database as the coordination layer
/// sees it.
///
/// `Ok(None)` from [`latest_tree_head`](TreeHeadDatabase::latest_tree_head)
/// means the database holds no tree head yet (a freshly provisioned node).
/// Any `Err` indicates local corruption and is treated as fatal by callers.
pub trait TreeHeadDatabase: Send + Sync {
    /// Return the newest tree head written locally, if any.
    fn latest_tree_head(&self) -> Result<Option<SignedTreeHead>>;

    /// Persist a tree head locally.
    fn write_tree_head(&self, sth: &SignedTreeHead) -> Result<()>;
}

/// Inner backend: either Fjall-backed (disk) or pure in-memory.
enum Backend {
    Fjall {
        #[allow(dead_code)]
        db: Database,
        /// Big-endian timestamp → serialized tree head, full history.
        tree_heads: Keyspace,
        /// Single-key keyspace holding the newest tree head.
        state: Keyspace,
    },
    Memory(RwLock<BTreeMap<u64, SignedTreeHead>>),
}

/// Tree-head database with Fjall (disk) or pure in-memory backend.
///
/// Stores every tree head this node has accepted, keyed by timestamp,
/// plus an O(1) pointer to the newest one.
pub struct TreeHeadDb {
    backend: Backend,
}

impl TreeHeadDb {
    /// Open a persistent database at the given path (Fjall backend).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::builder(path).open()?;
        let backend = Self::init_fjall(db)?;
        Ok(Self { backend })
    }

    /// Open a temporary database backed by Fjall (cleaned up on drop).
    ///
    /// Still uses disk I/O (tempdir). For zero disk I/O, use
    /// [`in_memory`](Self::in_memory).
    pub fn open_temporary() -> Result<Self> {
        let tmp = tempfile::tempdir().map_err(std::io::Error::other)?;
        let db = Database::builder(tmp.path()).temporary(true).open()?;
        let backend = Self::init_fjall(db)?;
        Ok(Self { backend })
    }

    /// Create a pure in-memory database. Zero disk I/O.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(RwLock::new(BTreeMap::new())),
        }
    }

    fn init_fjall(db: Database) -> Result<Backend> {
        let tree_heads = db.keyspace("tree_heads", KeyspaceCreateOptions::default)?;
        let state = db.keyspace("state", KeyspaceCreateOptions::default)?;
        Ok(Backend::Fjall {
            db,
            tree_heads,
            state,
        })
    }
}

impl TreeHeadDatabase for TreeHeadDb {
    fn latest_tree_head(&self) -> Result<Option<SignedTreeHead>> {
        match &self.backend {
            Backend::Fjall { state, .. } => match state.get(LATEST_KEY)? {
                Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
                None => Ok(None),
            },
            Backend::Memory(m) => Ok(m
                .read()
                .expect("lock poisoned")
                .last_key_value()
                .map(|(_, sth)| sth.clone())),
        }
    }

    fn write_tree_head(&self, sth: &SignedTreeHead) -> Result<()> {
        match &self.backend {
            Backend::Fjall {
                tree_heads, state, ..
            } => {
                let value = postcard::to_allocvec(sth)?;
                tree_heads.insert(sth.timestamp.to_be_bytes(), value.as_slice())?;
                state.insert(LATEST_KEY, value.as_slice())?;
            }
            Backend::Memory(m) => {
                m.write()
                    .expect("lock poisoned")
                    .insert(sth.timestamp, sth.clone());
            }
        }
        debug!(
            tree_size = sth.tree_size,
            timestamp = sth.timestamp,
            "wrote tree head"
        );
        Ok(())
    }
}
