//! Vertex/Edge Store: canonical entity records and pairwise relationships.
//!
//! Canonicalization maps every mention of the same entity (per user) to one
//! vertex. Content is matched on a canonical key (trimmed, NFC-normalized,
//! lowercased) held in the unique `(user, key)` index; the first spelling
//! observed becomes the stored label.
//!
//! Edges are a flat projection of extracted relationships. They do not take
//! part in the simplex tree and are never updated once written.

use std::collections::BTreeMap;

use redb::{ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::error::{InputError, SimplicialResult, StoreError};
use crate::ids::{EdgeId, UserId, VertexId};
use crate::metadata::{self, Metadata};

use super::{
    EDGE_COUNTER, EDGE_TRIPLES, EDGES, Store, StoreResult, USER_VERTICES, VERTEX_CONTENT,
    VERTEX_COUNTER, VERTICES, allocate_id, decode, encode,
};

/// How many times a write is retried after a uniqueness conflict.
pub(crate) const MAX_CONFLICT_RETRIES: usize = 4;

/// A canonical entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: VertexId,
    pub user: UserId,
    pub embedding: Vec<f32>,
    /// Canonical label: the first spelling observed.
    pub content: String,
    pub metadata: Metadata,
}

/// A pairwise relationship between two vertices of the same user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub user: UserId,
    pub tail: VertexId,
    pub head: VertexId,
    pub label: String,
    pub metadata: Metadata,
}

/// Canonical lookup key for entity content.
pub fn canonical_key(content: &str) -> String {
    content.trim().nfc().collect::<String>().to_lowercase()
}

/// Vertex and edge operations over a shared [`Store`].
#[derive(Debug, Clone)]
pub struct VertexStore {
    store: Store,
    embedding_dim: Option<usize>,
}

impl VertexStore {
    /// `embedding_dim`, when set, is enforced on every new vertex.
    pub fn new(store: Store, embedding_dim: Option<usize>) -> Self {
        Self {
            store,
            embedding_dim,
        }
    }

    pub fn embedding_dim(&self) -> Option<usize> {
        self.embedding_dim
    }

    /// Resolve `content` to its vertex for `user`, creating the vertex if needed.
    ///
    /// An existing vertex keeps its embedding and label; `metadata` is merged
    /// with [`metadata::merge_observation`]. Concurrent calls for the same
    /// content resolve to a single vertex: the unique content index is checked
    /// and written inside one write transaction, and a conflict re-reads.
    pub fn canonicalize(
        &self,
        user: UserId,
        content: &str,
        embedding: &[f32],
        metadata: Metadata,
    ) -> SimplicialResult<VertexId> {
        let key = canonical_key(content);
        if key.is_empty() {
            return Err(InputError::EmptyContent.into());
        }
        if let Some(expected) = self.embedding_dim {
            if embedding.len() != expected {
                return Err(InputError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                }
                .into());
            }
        }

        // Under redb's single writer the index check and insert cannot race,
        // so the conflict arm only runs on a store whose writers interleave.
        for attempt in 0..MAX_CONFLICT_RETRIES {
            match self.try_canonicalize(user, content.trim(), &key, embedding, metadata.clone()) {
                Ok(id) => {
                    self.store.cache().insert(user, key, id);
                    return Ok(id);
                }
                Err(StoreError::ConstraintViolation { .. }) => {
                    tracing::debug!(%user, key = %key, attempt, "content index conflict, re-reading");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::ConstraintViolation {
            table: "vertex_content",
            key,
        }
        .into())
    }

    fn try_canonicalize(
        &self,
        user: UserId,
        content: &str,
        key: &str,
        embedding: &[f32],
        incoming: Metadata,
    ) -> StoreResult<VertexId> {
        let txn = self.store.begin_write()?;

        let existing = match self.store.cache().get(user, key) {
            Some(id) => Some(id.get()),
            None => {
                let index = txn.open_table(VERTEX_CONTENT)?;
                index.get((user.0, key))?.map(|g| g.value())
            }
        };

        let raw = match existing {
            Some(raw) => {
                let mut table = txn.open_table(VERTICES)?;
                let mut vertex: Vertex = match table.get(raw)? {
                    Some(guard) => decode(guard.value())?,
                    None => {
                        return Err(StoreError::NotFound {
                            what: "vertex",
                            id: raw,
                        });
                    }
                };
                metadata::merge_observation(&mut vertex.metadata, incoming);
                table.insert(raw, encode(&vertex)?.as_slice())?;
                raw
            }
            None => {
                let raw = allocate_id(&txn, VERTEX_COUNTER)?;
                let id = VertexId::new(raw).ok_or(StoreError::NotFound {
                    what: "vertex",
                    id: raw,
                })?;
                {
                    let mut index = txn.open_table(VERTEX_CONTENT)?;
                    if index.insert((user.0, key), raw)?.is_some() {
                        return Err(StoreError::ConstraintViolation {
                            table: "vertex_content",
                            key: key.to_owned(),
                        });
                    }
                }
                let vertex = Vertex {
                    id,
                    user,
                    embedding: embedding.to_vec(),
                    content: content.to_owned(),
                    metadata: metadata::first_observation(incoming),
                };
                txn.open_table(VERTICES)?
                    .insert(raw, encode(&vertex)?.as_slice())?;
                txn.open_table(USER_VERTICES)?.insert((user.0, raw), ())?;
                tracing::debug!(%user, vertex = %id, content, "created vertex");
                raw
            }
        };

        txn.commit()?;
        VertexId::new(raw).ok_or(StoreError::NotFound {
            what: "vertex",
            id: raw,
        })
    }

    /// Find the vertex for `content` without creating it.
    pub fn lookup_vertex(&self, user: UserId, content: &str) -> StoreResult<Option<VertexId>> {
        let key = canonical_key(content);
        if let Some(id) = self.store.cache().get(user, &key) {
            return Ok(Some(id));
        }
        let txn = self.store.begin_read()?;
        let index = txn.open_table(VERTEX_CONTENT)?;
        let found = index
            .get((user.0, key.as_str()))?
            .and_then(|g| VertexId::new(g.value()));
        if let Some(id) = found {
            self.store.cache().insert(user, key, id);
        }
        Ok(found)
    }

    /// Load a vertex record.
    pub fn get_vertex(&self, id: VertexId) -> StoreResult<Vertex> {
        let txn = self.store.begin_read()?;
        let table = txn.open_table(VERTICES)?;
        let guard = table.get(id.get())?.ok_or(StoreError::NotFound {
            what: "vertex",
            id: id.get(),
        })?;
        decode(guard.value())
    }

    /// Every vertex owned by `user`, in id order.
    pub fn vertices(&self, user: UserId) -> StoreResult<Vec<Vertex>> {
        let txn = self.store.begin_read()?;
        let index = txn.open_table(USER_VERTICES)?;
        let table = txn.open_table(VERTICES)?;

        let mut out = Vec::new();
        for entry in index.range((user.0, 0)..=(user.0, u64::MAX))? {
            let (key, _) = entry?;
            let (_, raw) = key.value();
            if let Some(guard) = table.get(raw)? {
                out.push(decode(guard.value())?);
            }
        }
        Ok(out)
    }

    /// Content labels for the given vertices. Unknown ids are skipped.
    pub fn labels(
        &self,
        ids: impl IntoIterator<Item = VertexId>,
    ) -> StoreResult<BTreeMap<VertexId, String>> {
        let txn = self.store.begin_read()?;
        let table = txn.open_table(VERTICES)?;
        let mut out = BTreeMap::new();
        for id in ids {
            if let Some(guard) = table.get(id.get())? {
                let vertex: Vertex = decode(guard.value())?;
                out.insert(id, vertex.content);
            }
        }
        Ok(out)
    }

    /// Append an edge. No deduplication: repeated calls create repeated edges.
    pub fn record_edge(
        &self,
        user: UserId,
        tail: VertexId,
        head: VertexId,
        label: &str,
        metadata: Metadata,
    ) -> StoreResult<EdgeId> {
        let txn = self.store.begin_write()?;
        let id = write_edge(&txn, user, tail, head, label, metadata)?;
        txn.commit()?;
        Ok(id)
    }

    /// Return the edge for an identical `(tail, head, label)` triple, recording
    /// a new one only if none exists.
    pub fn ensure_edge(
        &self,
        user: UserId,
        tail: VertexId,
        head: VertexId,
        label: &str,
        metadata: Metadata,
    ) -> StoreResult<EdgeId> {
        let txn = self.store.begin_write()?;
        let existing = {
            let triples = txn.open_table(EDGE_TRIPLES)?;
            triples
                .get((user.0, tail.get(), head.get(), label))?
                .and_then(|g| EdgeId::new(g.value()))
        };
        if let Some(id) = existing {
            return Ok(id);
        }
        let id = write_edge(&txn, user, tail, head, label, metadata)?;
        txn.commit()?;
        Ok(id)
    }

    /// Edges of `user`, optionally restricted to a tail and/or head vertex.
    pub fn lookup_edges(
        &self,
        user: UserId,
        tail: Option<VertexId>,
        head: Option<VertexId>,
    ) -> StoreResult<Vec<Edge>> {
        let txn = self.store.begin_read()?;
        let table = txn.open_table(EDGES)?;
        let mut out = Vec::new();
        for entry in table.range((user.0, 0)..=(user.0, u64::MAX))? {
            let (_, value) = entry?;
            let edge: Edge = decode(value.value())?;
            if tail.is_some_and(|t| t != edge.tail) || head.is_some_and(|h| h != edge.head) {
                continue;
            }
            out.push(edge);
        }
        Ok(out)
    }
}

/// Fail with `NotFound` for the first vertex that `user` does not own.
pub(crate) fn require_owned(
    txn: &WriteTransaction,
    user: UserId,
    vertices: &[VertexId],
) -> StoreResult<()> {
    let owned = txn.open_table(USER_VERTICES)?;
    for vertex in vertices {
        if owned.get((user.0, vertex.get()))?.is_none() {
            return Err(StoreError::NotFound {
                what: "vertex",
                id: vertex.get(),
            });
        }
    }
    Ok(())
}

fn write_edge(
    txn: &WriteTransaction,
    user: UserId,
    tail: VertexId,
    head: VertexId,
    label: &str,
    metadata: Metadata,
) -> StoreResult<EdgeId> {
    require_owned(txn, user, &[tail, head])?;

    let raw = allocate_id(txn, EDGE_COUNTER)?;
    let id = EdgeId::new(raw).ok_or(StoreError::NotFound {
        what: "edge",
        id: raw,
    })?;
    let edge = Edge {
        id,
        user,
        tail,
        head,
        label: label.to_owned(),
        metadata,
    };
    txn.open_table(EDGES)?
        .insert((user.0, raw), encode(&edge)?.as_slice())?;

    let mut triples = txn.open_table(EDGE_TRIPLES)?;
    let key = (user.0, tail.get(), head.get(), label);
    if triples.get(key)?.is_none() {
        triples.insert(key, raw)?;
    }
    Ok(id)
}
