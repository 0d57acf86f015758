//! Simplex Tree: a persistent trie over sorted vertex sequences.
//!
//! Each observed simplex is stored once as a root-to-node path whose vertex
//! ids strictly increase. Nodes on the way down are shared between simplices
//! with a common prefix, so a node only counts as an observed simplex when it
//! is marked terminal. Faces are never materialized: [`faces`] computes them
//! on demand, and [`SimplexTree::contains`] answers membership by walking a
//! single path.
//!
//! A secondary `(user, vertex, depth)` index finds every node labelled with a
//! vertex in one range scan, which makes coface lookup independent of the
//! size of the trie.

pub mod faces;
pub(crate) mod traverse;

use std::collections::BTreeSet;

use redb::WriteTransaction;
use serde::{Deserialize, Serialize};

use crate::error::{InputError, SimplicialResult, StoreError};
use crate::ids::{NodeId, UserId, VertexId};
use crate::metadata::Metadata;
use crate::store::vertex::{MAX_CONFLICT_RETRIES, require_owned};
use crate::store::{NODE_CHILDREN, NODE_COFACES, NODE_COUNTER, NODES, Store, StoreResult, allocate_id};

use traverse::TrieTables;

pub use faces::{canonical_path, facets_of, is_subset, theoretical_faces_of};

/// What produced an observed simplex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimplexKind {
    /// Co-occurrence within one temporal window.
    TemporalSession,
    /// Co-occurrence at one location.
    Location,
    Custom(String),
}

impl SimplexKind {
    pub fn as_str(&self) -> &str {
        match self {
            SimplexKind::TemporalSession => "temporal-session",
            SimplexKind::Location => "location",
            SimplexKind::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for SimplexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One context in which a simplex was observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplexContext {
    /// Identity of the context. A node holds at most one context per source,
    /// and retiring a source leaves the node's other contexts in place.
    pub source: String,
    pub kind: SimplexKind,
    pub metadata: Metadata,
}

impl SimplexContext {
    /// A context whose source is the kind's name.
    pub fn new(kind: SimplexKind, metadata: Metadata) -> Self {
        Self {
            source: kind.as_str().to_owned(),
            kind,
            metadata,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// A stored trie node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplexNode {
    pub id: NodeId,
    pub user: UserId,
    /// `None` for top-level nodes (children of the virtual root).
    pub parent: Option<NodeId>,
    pub vertex: VertexId,
    /// Distance from the virtual root; top-level nodes have depth 1.
    pub depth: u32,
    /// Contexts that observed the path ending here, oldest first. Empty on
    /// shared prefix nodes.
    pub contexts: Vec<SimplexContext>,
}

impl SimplexNode {
    /// Whether the path ending here was itself observed as a simplex.
    pub fn is_terminal(&self) -> bool {
        !self.contexts.is_empty()
    }

    /// Kind of the oldest context.
    pub fn kind(&self) -> Option<&SimplexKind> {
        self.contexts.first().map(|c| &c.kind)
    }

    fn observed_by(&self, source: &str) -> bool {
        self.contexts.iter().any(|c| c.source == source)
    }
}

/// An observed simplex: the full vertex path of a terminal node.
///
/// `kind` and `metadata` come from the oldest context; `contexts` lists all
/// of them.
#[derive(Debug, Clone, PartialEq)]
pub struct Simplex {
    /// The node at the end of the path.
    pub leaf: NodeId,
    pub vertices: Vec<VertexId>,
    pub kind: Option<SimplexKind>,
    pub metadata: Metadata,
    pub contexts: Vec<SimplexContext>,
}

impl Simplex {
    pub(crate) fn from_node(node: SimplexNode, vertices: Vec<VertexId>) -> Self {
        let (kind, metadata) = match node.contexts.first() {
            Some(first) => (Some(first.kind.clone()), first.metadata.clone()),
            None => (None, Metadata::new()),
        };
        Self {
            leaf: node.id,
            vertices,
            kind,
            metadata,
            contexts: node.contexts,
        }
    }

    /// Geometric dimension: one less than the vertex count.
    pub fn dimension(&self) -> usize {
        self.vertices.len().saturating_sub(1)
    }

    pub fn contains(&self, vertex: VertexId) -> bool {
        self.vertices.binary_search(&vertex).is_ok()
    }

    /// Whether any context of this simplex has `kind`.
    pub fn observed_as(&self, kind: &SimplexKind) -> bool {
        self.contexts.iter().any(|c| &c.kind == kind)
    }
}

/// Result of an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    pub leaf: NodeId,
    /// Nodes created by this insert (0 when the path already existed).
    pub created: usize,
    /// False when the simplex had already been observed and nothing changed.
    pub newly_observed: bool,
}

/// Bounds for coface lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CofaceQuery {
    /// Only consider index nodes at this depth or deeper.
    pub min_depth: u32,
    /// How far below a matching node to descend. `None` walks the full subtree.
    pub max_extra_depth: Option<usize>,
}

impl Default for CofaceQuery {
    fn default() -> Self {
        Self {
            min_depth: 1,
            max_extra_depth: None,
        }
    }
}

/// Reject paths that are empty or not strictly increasing.
pub fn validate_path(path: &[VertexId]) -> Result<(), InputError> {
    if path.is_empty() {
        return Err(InputError::EmptySimplex);
    }
    if let Some(i) = path.windows(2).position(|w| w[0] >= w[1]) {
        return Err(InputError::NotStrictlyIncreasing {
            position: i + 1,
            previous: path[i].get(),
            next: path[i + 1].get(),
        });
    }
    Ok(())
}

/// Simplex-tree operations over a shared [`Store`].
#[derive(Debug, Clone)]
pub struct SimplexTree {
    store: Store,
}

impl SimplexTree {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Record `path` as an observed simplex and return its leaf node.
    ///
    /// Existing prefix nodes are reused. Re-inserting an observed simplex
    /// returns the same leaf and only records `kind` as a further context;
    /// inserting a stored prefix marks the existing node as observed without
    /// creating anything. Every vertex must belong to `user`.
    pub fn insert(
        &self,
        user: UserId,
        path: &[VertexId],
        kind: SimplexKind,
        metadata: Metadata,
    ) -> SimplicialResult<NodeId> {
        Ok(self.insert_outcome(user, path, kind, metadata)?.leaf)
    }

    /// Like [`insert`](Self::insert), reporting how much of the trie changed.
    pub fn insert_outcome(
        &self,
        user: UserId,
        path: &[VertexId],
        kind: SimplexKind,
        metadata: Metadata,
    ) -> SimplicialResult<InsertOutcome> {
        self.insert_context(user, path, SimplexContext::new(kind, metadata))
    }

    /// Record `path` as observed in `context`.
    ///
    /// A context whose source the node already holds is not recorded again.
    pub fn insert_context(
        &self,
        user: UserId,
        path: &[VertexId],
        context: SimplexContext,
    ) -> SimplicialResult<InsertOutcome> {
        validate_path(path)?;

        if let Some(leaf) = self.leaf_observed_by(user, path, &context.source)? {
            return Ok(InsertOutcome {
                leaf,
                created: 0,
                newly_observed: false,
            });
        }

        // redb serializes write transactions and the child index is checked
        // and written inside one, so a conflict cannot arise here. The retry
        // covers a store that lets two writers interleave.
        for attempt in 0..MAX_CONFLICT_RETRIES {
            let txn = self.store.begin_write()?;
            match insert_in_txn(&txn, user, path, context.clone()) {
                Ok(outcome) => {
                    txn.commit().map_err(StoreError::from)?;
                    tracing::debug!(
                        %user,
                        leaf = %outcome.leaf,
                        created = outcome.created,
                        size = path.len(),
                        source = %context.source,
                        "inserted simplex"
                    );
                    return Ok(outcome);
                }
                Err(StoreError::ConstraintViolation { .. }) => {
                    drop(txn);
                    tracing::debug!(%user, attempt, "simplex path conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::ConstraintViolation {
            table: "simplex_children",
            key: format!("{user}/{path:?}"),
        }
        .into())
    }

    fn leaf_observed_by(
        &self,
        user: UserId,
        path: &[VertexId],
        source: &str,
    ) -> StoreResult<Option<NodeId>> {
        let txn = self.store.begin_read()?;
        let children = txn.open_table(NODE_CHILDREN)?;
        let matched = traverse::walk(&children, user, path)?;
        let Some(&leaf) = matched.last().filter(|_| matched.len() == path.len()) else {
            return Ok(None);
        };
        let nodes = txn.open_table(NODES)?;
        let node = traverse::load_node(&nodes, leaf)?;
        Ok(node.observed_by(source).then_some(leaf))
    }

    /// Leaf node of `path` if it is an observed simplex.
    pub fn find(&self, user: UserId, path: &[VertexId]) -> StoreResult<Option<NodeId>> {
        if path.is_empty() {
            return Ok(None);
        }
        let txn = self.store.begin_read()?;
        let children = txn.open_table(NODE_CHILDREN)?;
        let matched = traverse::walk(&children, user, path)?;
        if matched.len() != path.len() {
            return Ok(None);
        }
        let Some(&leaf) = matched.last() else {
            return Ok(None);
        };
        let nodes = txn.open_table(NODES)?;
        let node = traverse::load_node(&nodes, leaf)?;
        Ok(node.is_terminal().then_some(leaf))
    }

    /// Whether the vertex set was observed as a simplex. Input order and
    /// duplicates do not matter.
    pub fn contains(&self, user: UserId, vertices: &[VertexId]) -> StoreResult<bool> {
        let path = canonical_path(vertices);
        Ok(self.find(user, &path)?.is_some())
    }

    pub fn node(&self, id: NodeId) -> StoreResult<SimplexNode> {
        let txn = self.store.begin_read()?;
        let nodes = txn.open_table(NODES)?;
        traverse::load_node(&nodes, id)
    }

    /// Immediate children of a node, in vertex order.
    pub fn children(&self, id: NodeId) -> StoreResult<Vec<NodeId>> {
        let txn = self.store.begin_read()?;
        let nodes = txn.open_table(NODES)?;
        let node = traverse::load_node(&nodes, id)?;
        let children = txn.open_table(NODE_CHILDREN)?;
        traverse::children_of(&children, node.user, Some(id))
    }

    /// Top-level nodes of a user's trie.
    pub fn roots(&self, user: UserId) -> StoreResult<Vec<NodeId>> {
        let txn = self.store.begin_read()?;
        let children = txn.open_table(NODE_CHILDREN)?;
        traverse::children_of(&children, user, None)
    }

    /// Parent of a node; `None` for top-level nodes.
    pub fn parent(&self, id: NodeId) -> StoreResult<Option<NodeId>> {
        Ok(self.node(id)?.parent)
    }

    /// Vertex path from the root to `id`.
    pub fn path_of(&self, id: NodeId) -> StoreResult<Vec<VertexId>> {
        let txn = self.store.begin_read()?;
        let nodes = txn.open_table(NODES)?;
        let node = traverse::load_node(&nodes, id)?;
        traverse::path_to_root(&nodes, &node)
    }

    /// The observed simplex ending at `id`, if that node is terminal.
    pub fn simplex_at(&self, id: NodeId) -> StoreResult<Option<Simplex>> {
        let txn = self.store.begin_read()?;
        let nodes = txn.open_table(NODES)?;
        let node = traverse::load_node(&nodes, id)?;
        if !node.is_terminal() {
            return Ok(None);
        }
        let path = traverse::path_to_root(&nodes, &node)?;
        Ok(Some(Simplex::from_node(node, path)))
    }

    /// Every observed simplex that contains `vertex`.
    ///
    /// Index nodes shallower than `min_depth` are ignored. Results are in
    /// canonical path order with no duplicates.
    pub fn cofaces_containing(
        &self,
        user: UserId,
        vertex: VertexId,
        min_depth: u32,
    ) -> StoreResult<Vec<Simplex>> {
        self.cofaces(
            user,
            &[vertex],
            CofaceQuery {
                min_depth,
                ..CofaceQuery::default()
            },
        )
    }

    /// Every observed simplex whose vertex set includes all of `face`.
    pub fn cofaces_of(
        &self,
        user: UserId,
        face: &[VertexId],
        query: CofaceQuery,
    ) -> SimplicialResult<Vec<Simplex>> {
        let face = canonical_path(face);
        if face.is_empty() {
            return Err(InputError::EmptySimplex.into());
        }
        Ok(self.cofaces(user, &face, query)?)
    }

    fn cofaces(&self, user: UserId, face: &[VertexId], query: CofaceQuery) -> StoreResult<Vec<Simplex>> {
        let Some(&last) = face.last() else {
            return Ok(Vec::new());
        };
        // The largest face vertex sits at depth >= |face| in any coface path.
        let min_depth = query.min_depth.max(face.len() as u32).max(1);

        let txn = self.store.begin_read()?;
        let index = txn.open_table(NODE_COFACES)?;
        let nodes = txn.open_table(NODES)?;
        let children = txn.open_table(NODE_CHILDREN)?;

        let mut out = Vec::new();
        let range = (user.0, last.get(), min_depth, 0)..=(user.0, last.get(), u32::MAX, u64::MAX);
        for entry in index.range(range)? {
            let (key, _) = entry?;
            let (_, _, _, raw) = key.value();
            let Some(id) = NodeId::new(raw) else {
                continue;
            };
            let node = traverse::load_node(&nodes, id)?;
            let path = traverse::path_to_root(&nodes, &node)?;
            if !is_subset(face, &path) {
                continue;
            }
            traverse::collect_terminals(&children, &nodes, node, path, query.max_extra_depth, &mut out)?;
        }

        let mut seen = BTreeSet::new();
        out.retain(|s| seen.insert(s.leaf));
        out.sort_by(|a, b| a.vertices.cmp(&b.vertices));
        Ok(out)
    }

    /// Stop recording `path` as an observed simplex, whatever observed it.
    ///
    /// Nodes that no longer lie on any observed simplex are removed; nodes
    /// still shared with other simplices stay. Returns false if `path` was not
    /// an observed simplex.
    pub fn delete(&self, user: UserId, path: &[VertexId]) -> SimplicialResult<bool> {
        validate_path(path)?;
        let txn = self.store.begin_write()?;
        let retired = retire_in_txn(&txn, user, path, None)?;
        if retired {
            txn.commit().map_err(StoreError::from)?;
            tracing::debug!(%user, size = path.len(), "deleted simplex");
        }
        Ok(retired)
    }

    /// Drop one context from the simplex at `path`.
    ///
    /// The simplex stays observed while other contexts remain. Returns false
    /// if the node held no context from `source`.
    pub fn release(&self, user: UserId, path: &[VertexId], source: &str) -> SimplicialResult<bool> {
        validate_path(path)?;
        let txn = self.store.begin_write()?;
        let released = retire_in_txn(&txn, user, path, Some(source))?;
        if released {
            txn.commit().map_err(StoreError::from)?;
            tracing::debug!(%user, size = path.len(), source, "released simplex context");
        }
        Ok(released)
    }

    /// Remove `path` together with every observed simplex extending it.
    ///
    /// Returns the number of observed simplices removed.
    pub fn delete_with_cofaces(&self, user: UserId, path: &[VertexId]) -> SimplicialResult<usize> {
        validate_path(path)?;
        let txn = self.store.begin_write()?;
        let removed = {
            let mut tables = open_trie(&txn)?;
            let matched = traverse::walk(&tables.children, user, path)?;
            if matched.len() != path.len() {
                return Ok(0);
            }
            let Some(&top) = matched.last() else {
                return Ok(0);
            };

            let mut removed = 0;
            for id in traverse::descendants(&tables.children, user, top)? {
                let node = traverse::load_node(&tables.nodes, id)?;
                removed += usize::from(node.is_terminal());
                tables.unlink_node(&node)?;
            }
            let node = traverse::load_node(&tables.nodes, top)?;
            removed += usize::from(node.is_terminal());
            tables.unlink_node(&node)?;
            tables.prune_upward(user, node.parent)?;
            removed
        };
        txn.commit().map_err(StoreError::from)?;
        tracing::debug!(%user, size = path.len(), removed, "deleted simplex with cofaces");
        Ok(removed)
    }

    /// Number of trie nodes owned by `user`, shared prefix nodes included.
    pub fn node_count(&self, user: UserId) -> StoreResult<usize> {
        let txn = self.store.begin_read()?;
        let children = txn.open_table(NODE_CHILDREN)?;
        let count = children
            .range((user.0, 0, 0)..=(user.0, u64::MAX, u64::MAX))?
            .count();
        Ok(count)
    }

    /// Number of observed simplices owned by `user`.
    pub fn simplex_count(&self, user: UserId) -> StoreResult<usize> {
        Ok(self.all_simplices(user)?.len())
    }

    /// Every observed simplex owned by `user`, in canonical path order.
    pub fn all_simplices(&self, user: UserId) -> StoreResult<Vec<Simplex>> {
        let txn = self.store.begin_read()?;
        let nodes = txn.open_table(NODES)?;
        let children = txn.open_table(NODE_CHILDREN)?;
        let mut out = Vec::new();
        for root in traverse::children_of(&children, user, None)? {
            let node = traverse::load_node(&nodes, root)?;
            let path = vec![node.vertex];
            traverse::collect_terminals(&children, &nodes, node, path, None, &mut out)?;
        }
        out.sort_by(|a, b| a.vertices.cmp(&b.vertices));
        Ok(out)
    }
}

fn open_trie(txn: &WriteTransaction) -> StoreResult<TrieTables<'_>> {
    Ok(TrieTables {
        nodes: txn.open_table(NODES)?,
        children: txn.open_table(NODE_CHILDREN)?,
        cofaces: txn.open_table(NODE_COFACES)?,
    })
}

/// Insert `path` inside an open write transaction. `path` must already be
/// validated.
///
/// When the leaf is already observed, `context` is appended unless the leaf
/// holds one from the same source.
pub(crate) fn insert_in_txn(
    txn: &WriteTransaction,
    user: UserId,
    path: &[VertexId],
    context: SimplexContext,
) -> StoreResult<InsertOutcome> {
    require_owned(txn, user, path)?;

    let mut tables = open_trie(txn)?;
    let mut parent: Option<NodeId> = None;
    let mut created = 0;

    for (i, &vertex) in path.iter().enumerate() {
        if let Some(id) = traverse::child_of(&tables.children, user, parent, vertex)? {
            parent = Some(id);
            continue;
        }
        let raw = allocate_id(txn, NODE_COUNTER)?;
        let id = NodeId::new(raw).ok_or(StoreError::NotFound {
            what: "simplex node",
            id: raw,
        })?;
        let node = SimplexNode {
            id,
            user,
            parent,
            vertex,
            depth: i as u32 + 1,
            contexts: Vec::new(),
        };
        tables.link_node(&node)?;
        created += 1;
        parent = Some(id);
    }

    let Some(leaf) = parent else {
        return Err(StoreError::NotFound {
            what: "simplex path",
            id: 0,
        });
    };
    let mut node = traverse::load_node(&tables.nodes, leaf)?;
    let newly_observed = !node.is_terminal();
    if !node.observed_by(&context.source) {
        node.contexts.push(context);
        tables.write_node(&node)?;
    }

    Ok(InsertOutcome {
        leaf,
        created,
        newly_observed,
    })
}

/// Drop contexts from the simplex at `path` inside an open write
/// transaction: the one from `source`, or all of them for `None`.
///
/// Once no context remains the node is unmarked and nodes left unused are
/// pruned. Returns whether any context was dropped.
pub(crate) fn retire_in_txn(
    txn: &WriteTransaction,
    user: UserId,
    path: &[VertexId],
    source: Option<&str>,
) -> StoreResult<bool> {
    let mut tables = open_trie(txn)?;
    let matched = traverse::walk(&tables.children, user, path)?;
    if matched.len() != path.len() {
        return Ok(false);
    }
    let Some(&leaf) = matched.last() else {
        return Ok(false);
    };
    let mut node = traverse::load_node(&tables.nodes, leaf)?;
    let before = node.contexts.len();
    match source {
        Some(source) => node.contexts.retain(|c| c.source != source),
        None => node.contexts.clear(),
    }
    if node.contexts.len() == before {
        return Ok(false);
    }

    if node.is_terminal() || traverse::has_children(&tables.children, user, Some(leaf))? {
        tables.write_node(&node)?;
    } else {
        tables.unlink_node(&node)?;
        tables.prune_upward(user, node.parent)?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::vertex_ids;
    use crate::metadata::{MetaValue, metadata};
    use crate::store::seed_vertices;

    const U: UserId = UserId(1);

    fn tree() -> SimplexTree {
        let store = Store::in_memory().unwrap();
        seed_vertices(&store, U, 12);
        SimplexTree::new(store)
    }

    fn insert(tree: &SimplexTree, raw: &[u64]) -> NodeId {
        tree.insert(U, &vertex_ids(raw), SimplexKind::TemporalSession, Metadata::new())
            .unwrap()
    }

    fn paths(simplices: &[Simplex]) -> Vec<Vec<u64>> {
        simplices
            .iter()
            .map(|s| s.vertices.iter().map(|v| v.get()).collect())
            .collect()
    }

    #[test]
    fn insert_creates_chain_and_is_idempotent() {
        let t = tree();
        let first = t
            .insert_outcome(U, &vertex_ids(&[1, 2, 3]), SimplexKind::TemporalSession, Metadata::new())
            .unwrap();
        assert_eq!(first.created, 3);
        assert!(first.newly_observed);

        let again = t
            .insert_outcome(U, &vertex_ids(&[1, 2, 3]), SimplexKind::Location, Metadata::new())
            .unwrap();
        assert_eq!(again.leaf, first.leaf);
        assert_eq!(again.created, 0);
        assert!(!again.newly_observed);
        assert_eq!(t.node_count(U).unwrap(), 3);

        // The first context stays primary; the second is recorded beside it.
        let s = t.simplex_at(first.leaf).unwrap().unwrap();
        assert_eq!(s.kind, Some(SimplexKind::TemporalSession));
        assert_eq!(s.contexts.len(), 2);
        assert!(s.observed_as(&SimplexKind::Location));

        t.insert(U, &vertex_ids(&[1, 2, 3]), SimplexKind::Location, Metadata::new())
            .unwrap();
        assert_eq!(t.simplex_at(first.leaf).unwrap().unwrap().contexts.len(), 2);
    }

    #[test]
    fn faces_are_not_materialized() {
        let t = tree();
        insert(&t, &[1, 2, 3]);
        assert!(t.contains(U, &vertex_ids(&[1, 2, 3])).unwrap());
        assert!(t.contains(U, &vertex_ids(&[3, 1, 2])).unwrap());
        assert!(!t.contains(U, &vertex_ids(&[1, 2])).unwrap());
        assert!(!t.contains(U, &vertex_ids(&[1])).unwrap());
        assert!(!t.contains(U, &vertex_ids(&[2, 3])).unwrap());
        assert!(!t.contains(U, &[]).unwrap());
    }

    #[test]
    fn inserting_a_prefix_promotes_the_existing_node() {
        let t = tree();
        insert(&t, &[1, 2, 3]);
        let outcome = t
            .insert_outcome(U, &vertex_ids(&[1, 2]), SimplexKind::TemporalSession, Metadata::new())
            .unwrap();
        assert_eq!(outcome.created, 0);
        assert!(outcome.newly_observed);
        assert_eq!(t.node_count(U).unwrap(), 3);
        assert!(t.contains(U, &vertex_ids(&[1, 2])).unwrap());
        assert_eq!(t.simplex_count(U).unwrap(), 2);
    }

    #[test]
    fn shared_prefix_branches() {
        let t = tree();
        let a = insert(&t, &[1, 2, 3]);
        let b = insert(&t, &[1, 2, 4]);
        assert_ne!(a, b);
        assert_eq!(t.node_count(U).unwrap(), 4);
        assert_eq!(t.parent(a).unwrap(), t.parent(b).unwrap());

        let mid = t.parent(a).unwrap().unwrap();
        assert_eq!(t.children(mid).unwrap(), vec![a, b]);
        assert_eq!(t.path_of(b).unwrap(), vertex_ids(&[1, 2, 4]));

        let root = t.parent(mid).unwrap().unwrap();
        assert_eq!(t.parent(root).unwrap(), None);
        assert_eq!(t.roots(U).unwrap(), vec![root]);
    }

    #[test]
    fn rejects_unsorted_and_empty_paths() {
        let t = tree();
        let err = t
            .insert(U, &vertex_ids(&[2, 1]), SimplexKind::TemporalSession, Metadata::new())
            .unwrap_err();
        assert!(err.is_malformed_input());
        let err = t
            .insert(U, &vertex_ids(&[1, 1]), SimplexKind::TemporalSession, Metadata::new())
            .unwrap_err();
        assert!(err.is_malformed_input());
        let err = t
            .insert(U, &[], SimplexKind::TemporalSession, Metadata::new())
            .unwrap_err();
        assert!(err.is_malformed_input());
        assert_eq!(t.node_count(U).unwrap(), 0);
    }

    #[test]
    fn cofaces_containing_a_vertex() {
        let t = tree();
        insert(&t, &[1, 2, 3]);
        insert(&t, &[2, 5]);
        insert(&t, &[4, 6]);

        let found = t.cofaces_containing(U, VertexId::new(2).unwrap(), 1).unwrap();
        assert_eq!(paths(&found), vec![vec![1, 2, 3], vec![2, 5]]);

        // Depth filter applies to the index node holding the vertex.
        let deep = t.cofaces_containing(U, VertexId::new(2).unwrap(), 2).unwrap();
        assert_eq!(paths(&deep), vec![vec![1, 2, 3]]);

        assert!(t.cofaces_containing(U, VertexId::new(9).unwrap(), 1).unwrap().is_empty());
    }

    #[test]
    fn cofaces_of_a_face() {
        let t = tree();
        insert(&t, &[1, 2, 3]);
        insert(&t, &[1, 3, 4]);
        insert(&t, &[2, 3]);

        let found = t
            .cofaces_of(U, &vertex_ids(&[1, 3]), CofaceQuery::default())
            .unwrap();
        assert_eq!(paths(&found), vec![vec![1, 2, 3], vec![1, 3, 4]]);

        let bounded = t
            .cofaces_of(
                U,
                &vertex_ids(&[1, 3]),
                CofaceQuery {
                    max_extra_depth: Some(0),
                    ..CofaceQuery::default()
                },
            )
            .unwrap();
        assert_eq!(paths(&bounded), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn facet_and_coface_duality() {
        let t = tree();
        insert(&t, &[1, 2, 3]);
        insert(&t, &[1, 2]);
        for facet in facets_of(&vertex_ids(&[1, 2, 3])) {
            if t.contains(U, &facet).unwrap() {
                let cofaces = t.cofaces_of(U, &facet, CofaceQuery::default()).unwrap();
                assert!(cofaces.iter().any(|s| s.vertices == vertex_ids(&[1, 2, 3])));
            }
        }
    }

    #[test]
    fn delete_keeps_shared_prefix() {
        let t = tree();
        insert(&t, &[1, 2, 3]);
        insert(&t, &[1, 2, 4]);
        assert!(t.delete(U, &vertex_ids(&[1, 2, 3])).unwrap());
        assert!(!t.contains(U, &vertex_ids(&[1, 2, 3])).unwrap());
        assert!(t.contains(U, &vertex_ids(&[1, 2, 4])).unwrap());
        assert_eq!(t.node_count(U).unwrap(), 3);

        assert!(!t.delete(U, &vertex_ids(&[1, 2, 3])).unwrap());
        assert!(!t.delete(U, &vertex_ids(&[7])).unwrap());
    }

    #[test]
    fn delete_prunes_unused_chain() {
        let t = tree();
        insert(&t, &[1, 2, 3]);
        assert!(t.delete(U, &vertex_ids(&[1, 2, 3])).unwrap());
        assert_eq!(t.node_count(U).unwrap(), 0);
        assert!(t.cofaces_containing(U, VertexId::new(1).unwrap(), 1).unwrap().is_empty());
    }

    #[test]
    fn delete_of_inner_simplex_keeps_descendants() {
        let t = tree();
        insert(&t, &[1, 2, 3]);
        insert(&t, &[1, 2]);
        assert!(t.delete(U, &vertex_ids(&[1, 2])).unwrap());
        assert!(!t.contains(U, &vertex_ids(&[1, 2])).unwrap());
        assert!(t.contains(U, &vertex_ids(&[1, 2, 3])).unwrap());
        assert_eq!(t.node_count(U).unwrap(), 3);
    }

    #[test]
    fn delete_with_cofaces_removes_subtree() {
        let t = tree();
        insert(&t, &[1, 2]);
        insert(&t, &[1, 2, 3]);
        insert(&t, &[1, 2, 4, 5]);
        insert(&t, &[1, 6]);
        let removed = t.delete_with_cofaces(U, &vertex_ids(&[1, 2])).unwrap();
        assert_eq!(removed, 3);
        assert_eq!(paths(&t.all_simplices(U).unwrap()), vec![vec![1, 6]]);
        assert_eq!(t.node_count(U).unwrap(), 2);
    }

    #[test]
    fn users_have_separate_tries() {
        let t = tree();
        insert(&t, &[1, 2]);
        assert!(!t.contains(UserId(2), &vertex_ids(&[1, 2])).unwrap());
        assert_eq!(t.node_count(UserId(2)).unwrap(), 0);
    }

    #[test]
    fn metadata_is_kept_on_the_leaf_only() {
        let t = tree();
        let leaf = t
            .insert(
                U,
                &vertex_ids(&[1, 2]),
                SimplexKind::Location,
                metadata([("location", "jodhpur")]),
            )
            .unwrap();
        let node = t.node(leaf).unwrap();
        assert_eq!(node.contexts[0].metadata["location"], MetaValue::from("jodhpur"));
        assert_eq!(node.kind(), Some(&SimplexKind::Location));
        let root = t.node(node.parent.unwrap()).unwrap();
        assert!(root.contexts.is_empty());
        assert_eq!(root.kind(), None);
        assert!(!root.is_terminal());
    }

    #[test]
    fn insert_rejects_vertices_the_user_does_not_own() {
        let t = tree();
        let err = t
            .insert(UserId(2), &vertex_ids(&[1, 2]), SimplexKind::TemporalSession, Metadata::new())
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::SimplicialError::Store(StoreError::NotFound { what: "vertex", id: 1 })
        ));

        let err = t
            .insert(U, &vertex_ids(&[1, 99]), SimplexKind::TemporalSession, Metadata::new())
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::SimplicialError::Store(StoreError::NotFound { what: "vertex", id: 99 })
        ));
        assert_eq!(t.node_count(U).unwrap(), 0);
        assert_eq!(t.node_count(UserId(2)).unwrap(), 0);
    }

    #[test]
    fn release_keeps_the_simplex_while_other_contexts_remain() {
        let t = tree();
        let path = vertex_ids(&[1, 2]);
        let leaf = insert(&t, &[1, 2]);
        insert(&t, &[1, 2, 3]);
        t.insert_context(
            U,
            &path,
            SimplexContext::new(SimplexKind::Location, Metadata::new()).with_source("location:paris"),
        )
        .unwrap();

        assert!(t.release(U, &path, "temporal-session").unwrap());
        let s = t.simplex_at(leaf).unwrap().unwrap();
        assert_eq!(s.kind, Some(SimplexKind::Location));
        assert_eq!(s.contexts.len(), 1);
        assert!(!t.release(U, &path, "temporal-session").unwrap());

        assert!(t.release(U, &path, "location:paris").unwrap());
        assert!(!t.contains(U, &path).unwrap());
        // The node stays as a prefix of [1, 2, 3].
        assert_eq!(t.node_count(U).unwrap(), 3);
    }

    #[test]
    fn delete_drops_every_context() {
        let t = tree();
        let path = vertex_ids(&[4, 6]);
        insert(&t, &[4, 6]);
        t.insert(U, &path, SimplexKind::Location, Metadata::new()).unwrap();
        assert!(t.delete(U, &path).unwrap());
        assert!(!t.contains(U, &path).unwrap());
        assert_eq!(t.node_count(U).unwrap(), 0);
    }

    #[test]
    fn concurrent_inserts_share_nodes() {
        use std::sync::Arc;
        let t = Arc::new(tree());
        let handles: Vec<_> = (0..6u64)
            .map(|i| {
                let t = Arc::clone(&t);
                std::thread::spawn(move || {
                    t.insert(
                        U,
                        &vertex_ids(&[1, 2, 10 + i % 2]),
                        SimplexKind::TemporalSession,
                        Metadata::new(),
                    )
                    .unwrap()
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(t.node_count(U).unwrap(), 4);
        assert_eq!(t.simplex_count(U).unwrap(), 2);
    }

    #[test]
    fn simplex_helpers() {
        let t = tree();
        let leaf = insert(&t, &[2, 4, 8]);
        let s = t.simplex_at(leaf).unwrap().unwrap();
        assert_eq!(s.dimension(), 2);
        assert!(s.contains(VertexId::new(4).unwrap()));
        assert!(!s.contains(VertexId::new(3).unwrap()));
        let mid = t.parent(leaf).unwrap().unwrap();
        assert!(t.simplex_at(mid).unwrap().is_none());
    }
}
