//! Persistent storage for simplicial memory.
//!
//! One redb database holds every table. The relational schema (vertex, edge
//! and simplex-node tables plus their indexes) maps onto redb tables whose
//! composite keys double as the required indexes:
//!
//! - `VERTICES` / `USER_VERTICES`: vertex records and the per-user scan index
//! - `VERTEX_CONTENT`: unique `(user, canonical content)` canonicalization index
//! - `EDGES` / `EDGE_TRIPLES`: edge records and the `(tail, head, label)` index
//! - `NODES`: simplex-trie node records
//! - `NODE_CHILDREN`: unique `(user, parent, vertex)`; parent `0` is the virtual root
//! - `NODE_COFACES`: `(user, vertex, depth, node)` coface lookup index
//! - `LOCATION_ANCHORS`: latest simplex recorded per `(user, location)`
//!
//! Every multi-record mutation runs inside one write transaction; dropping a
//! transaction without committing aborts it, so no partial chain is ever visible.

pub mod mem;
pub mod vertex;

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;
use crate::ids::UserId;

pub use mem::CanonicalCache;
pub use vertex::{Edge, Vertex, VertexStore, canonical_key};

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// File name of the database inside the data directory.
pub const DB_FILE_NAME: &str = "simplicial-memory.redb";

pub(crate) const VERTICES: TableDefinition<u64, &[u8]> = TableDefinition::new("vertices");
pub(crate) const USER_VERTICES: TableDefinition<(u64, u64), ()> =
    TableDefinition::new("user_vertices");
pub(crate) const VERTEX_CONTENT: TableDefinition<(u64, &str), u64> =
    TableDefinition::new("vertex_content");
pub(crate) const EDGES: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("edges");
pub(crate) const EDGE_TRIPLES: TableDefinition<(u64, u64, u64, &str), u64> =
    TableDefinition::new("edge_triples");
pub(crate) const NODES: TableDefinition<u64, &[u8]> = TableDefinition::new("simplex_nodes");
pub(crate) const NODE_CHILDREN: TableDefinition<(u64, u64, u64), u64> =
    TableDefinition::new("simplex_children");
pub(crate) const NODE_COFACES: TableDefinition<(u64, u64, u32, u64), ()> =
    TableDefinition::new("simplex_cofaces");
pub(crate) const LOCATION_ANCHORS: TableDefinition<(u64, &str), &[u8]> =
    TableDefinition::new("location_anchors");
const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

/// Id counter names.
pub(crate) const VERTEX_COUNTER: &str = "vertex";
pub(crate) const EDGE_COUNTER: &str = "edge";
pub(crate) const NODE_COUNTER: &str = "node";

/// Handle to the shared database.
///
/// Cheap to clone: all clones share one [`Database`] and one canonicalization
/// cache. Writes are serialized by redb; reads use MVCC snapshots and never
/// block on writers.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
    cache: Arc<CanonicalCache>,
    persistent: bool,
}

impl Store {
    /// Open or create a durable store in the given directory.
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::Io { source: e })?;
        let db_path = data_dir.join(DB_FILE_NAME);
        let db = Database::create(&db_path).map_err(|e| StoreError::Unavailable {
            message: format!("failed to open redb at {}: {e}", db_path.display()),
        })?;
        tracing::debug!(path = %db_path.display(), "opened simplicial store");
        Self::init(db, true)
    }

    /// Create a store backed by memory only. Data is lost on drop.
    pub fn in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder().create_with_backend(backend)?;
        Self::init(db, false)
    }

    fn init(db: Database, persistent: bool) -> StoreResult<Self> {
        let txn = db.begin_write()?;
        txn.open_table(VERTICES)?;
        txn.open_table(USER_VERTICES)?;
        txn.open_table(VERTEX_CONTENT)?;
        txn.open_table(EDGES)?;
        txn.open_table(EDGE_TRIPLES)?;
        txn.open_table(NODES)?;
        txn.open_table(NODE_CHILDREN)?;
        txn.open_table(NODE_COFACES)?;
        txn.open_table(LOCATION_ANCHORS)?;
        txn.open_table(COUNTERS)?;
        txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            cache: Arc::new(CanonicalCache::new()),
            persistent,
        })
    }

    /// Whether the store writes to disk.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub(crate) fn begin_read(&self) -> StoreResult<ReadTransaction> {
        Ok(self.db.begin_read()?)
    }

    pub(crate) fn begin_write(&self) -> StoreResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    pub(crate) fn cache(&self) -> &CanonicalCache {
        &self.cache
    }

    /// Number of vertices owned by `user`.
    pub fn vertex_count(&self, user: UserId) -> StoreResult<usize> {
        let txn = self.begin_read()?;
        let table = txn.open_table(USER_VERTICES)?;
        let count = table
            .range((user.0, 0)..=(user.0, u64::MAX))?
            .count();
        Ok(count)
    }

    /// Number of edges owned by `user`.
    pub fn edge_count(&self, user: UserId) -> StoreResult<usize> {
        let txn = self.begin_read()?;
        let table = txn.open_table(EDGES)?;
        let count = table.range((user.0, 0)..=(user.0, u64::MAX))?.count();
        Ok(count)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("persistent", &self.persistent)
            .field("cached_contents", &self.cache.len())
            .finish()
    }
}

/// Allocate the next id from a named counter inside an open write transaction.
///
/// The counter advances only if the transaction commits, so an aborted insert
/// never burns ids that were handed out.
pub(crate) fn allocate_id(txn: &WriteTransaction, counter: &str) -> StoreResult<u64> {
    let mut table = txn.open_table(COUNTERS)?;
    let next = table.get(counter)?.map(|g| g.value()).unwrap_or(1);
    table.insert(counter, next + 1)?;
    Ok(next)
}

/// Encode a record with bincode.
pub(crate) fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization {
        message: format!("failed to encode record: {e}"),
    })
}

/// Decode a bincode record.
pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization {
        message: format!("failed to decode record: {e}"),
    })
}

/// Create vertices `v1` to `v{count}` for `user`. On a fresh store their ids
/// are `1..=count`.
#[cfg(test)]
pub(crate) fn seed_vertices(store: &Store, user: UserId, count: u64) -> Vec<crate::ids::VertexId> {
    let vertices = VertexStore::new(store.clone(), None);
    (1..=count)
        .map(|i| {
            vertices
                .canonicalize(user, &format!("v{i}"), &[], crate::metadata::Metadata::new())
                .unwrap()
        })
        .collect()
}
