//! Transaction-level trie walks shared by the read and write paths.
//!
//! Everything here takes already-open tables so a caller can compose several
//! steps inside one transaction. `parent` arguments use `None` for the
//! virtual root, stored as raw `0` in the children index.

use redb::{ReadableTable, Table};

use crate::error::StoreError;
use crate::ids::{NodeId, UserId, VertexId};
use crate::store::{StoreResult, decode, encode};

use super::{Simplex, SimplexNode};

type ChildKey = (u64, u64, u64);
type CofaceKey = (u64, u64, u32, u64);

fn raw_parent(parent: Option<NodeId>) -> u64 {
    parent.map_or(0, NodeId::get)
}

fn node_id(raw: u64) -> StoreResult<NodeId> {
    NodeId::new(raw).ok_or(StoreError::NotFound {
        what: "simplex node",
        id: raw,
    })
}

/// The child of `parent` labelled `vertex`, if any.
pub(crate) fn child_of<C>(
    children: &C,
    user: UserId,
    parent: Option<NodeId>,
    vertex: VertexId,
) -> StoreResult<Option<NodeId>>
where
    C: ReadableTable<ChildKey, u64>,
{
    Ok(children
        .get((user.0, raw_parent(parent), vertex.get()))?
        .and_then(|g| NodeId::new(g.value())))
}

/// All children of `parent` in vertex order.
pub(crate) fn children_of<C>(
    children: &C,
    user: UserId,
    parent: Option<NodeId>,
) -> StoreResult<Vec<NodeId>>
where
    C: ReadableTable<ChildKey, u64>,
{
    let p = raw_parent(parent);
    let mut out = Vec::new();
    for entry in children.range((user.0, p, 0)..=(user.0, p, u64::MAX))? {
        let (_, value) = entry?;
        out.push(node_id(value.value())?);
    }
    Ok(out)
}

pub(crate) fn has_children<C>(children: &C, user: UserId, parent: Option<NodeId>) -> StoreResult<bool>
where
    C: ReadableTable<ChildKey, u64>,
{
    let p = raw_parent(parent);
    Ok(children
        .range((user.0, p, 0)..=(user.0, p, u64::MAX))?
        .next()
        .is_some())
}

/// Follow `path` from the root, returning the nodes matched so far.
///
/// The result is shorter than `path` when the trie diverges before the end.
pub(crate) fn walk<C>(children: &C, user: UserId, path: &[VertexId]) -> StoreResult<Vec<NodeId>>
where
    C: ReadableTable<ChildKey, u64>,
{
    let mut matched = Vec::with_capacity(path.len());
    let mut parent = None;
    for &vertex in path {
        match child_of(children, user, parent, vertex)? {
            Some(id) => {
                matched.push(id);
                parent = Some(id);
            }
            None => break,
        }
    }
    Ok(matched)
}

pub(crate) fn load_node<N>(nodes: &N, id: NodeId) -> StoreResult<SimplexNode>
where
    N: ReadableTable<u64, &'static [u8]>,
{
    let guard = nodes.get(id.get())?.ok_or(StoreError::NotFound {
        what: "simplex node",
        id: id.get(),
    })?;
    decode(guard.value())
}

/// Vertex sequence from the root down to `node`, inclusive.
pub(crate) fn path_to_root<N>(nodes: &N, node: &SimplexNode) -> StoreResult<Vec<VertexId>>
where
    N: ReadableTable<u64, &'static [u8]>,
{
    let mut path = Vec::with_capacity(node.depth as usize);
    path.push(node.vertex);
    let mut parent = node.parent;
    while let Some(id) = parent {
        let ancestor = load_node(nodes, id)?;
        path.push(ancestor.vertex);
        parent = ancestor.parent;
    }
    path.reverse();
    Ok(path)
}

/// Collect every terminal node in the subtree rooted at `start`, the start
/// node included, as a [`Simplex`].
///
/// `max_extra_depth` bounds how far below `start` the walk descends;
/// `Some(0)` considers only `start` itself.
pub(crate) fn collect_terminals<C, N>(
    children: &C,
    nodes: &N,
    start: SimplexNode,
    start_path: Vec<VertexId>,
    max_extra_depth: Option<usize>,
    out: &mut Vec<Simplex>,
) -> StoreResult<()>
where
    C: ReadableTable<ChildKey, u64>,
    N: ReadableTable<u64, &'static [u8]>,
{
    let mut stack = vec![(start, start_path, 0usize)];
    while let Some((node, path, extra)) = stack.pop() {
        if max_extra_depth.is_none_or(|max| extra < max) {
            for child_id in children_of(children, node.user, Some(node.id))? {
                let child = load_node(nodes, child_id)?;
                let mut child_path = path.clone();
                child_path.push(child.vertex);
                stack.push((child, child_path, extra + 1));
            }
        }
        if node.is_terminal() {
            out.push(Simplex::from_node(node, path));
        }
    }
    Ok(())
}

/// Node ids of every strict descendant of `start`.
pub(crate) fn descendants<C>(children: &C, user: UserId, start: NodeId) -> StoreResult<Vec<NodeId>>
where
    C: ReadableTable<ChildKey, u64>,
{
    let mut out = Vec::new();
    let mut stack = vec![start];
    while let Some(id) = stack.pop() {
        for child in children_of(children, user, Some(id))? {
            out.push(child);
            stack.push(child);
        }
    }
    Ok(out)
}

/// Open write-side handles on the three trie tables.
pub(crate) struct TrieTables<'txn> {
    pub nodes: Table<'txn, u64, &'static [u8]>,
    pub children: Table<'txn, ChildKey, u64>,
    pub cofaces: Table<'txn, CofaceKey, ()>,
}

impl TrieTables<'_> {
    pub(crate) fn write_node(&mut self, node: &SimplexNode) -> StoreResult<()> {
        self.nodes
            .insert(node.id.get(), encode(node)?.as_slice())?;
        Ok(())
    }

    /// Link a freshly allocated node under its parent and into the coface index.
    pub(crate) fn link_node(&mut self, node: &SimplexNode) -> StoreResult<()> {
        let key = (node.user.0, raw_parent(node.parent), node.vertex.get());
        if self.children.insert(key, node.id.get())?.is_some() {
            return Err(StoreError::ConstraintViolation {
                table: "simplex_children",
                key: format!("{}/{}/{}", node.user, raw_parent(node.parent), node.vertex),
            });
        }
        self.cofaces
            .insert((node.user.0, node.vertex.get(), node.depth, node.id.get()), ())?;
        self.write_node(node)
    }

    /// Remove one node record and its index entries. Children are not touched.
    pub(crate) fn unlink_node(&mut self, node: &SimplexNode) -> StoreResult<()> {
        self.children
            .remove((node.user.0, raw_parent(node.parent), node.vertex.get()))?;
        self.cofaces
            .remove((node.user.0, node.vertex.get(), node.depth, node.id.get()))?;
        self.nodes.remove(node.id.get())?;
        Ok(())
    }

    /// Remove non-terminal childless ancestors, starting at `from` and moving up.
    pub(crate) fn prune_upward(&mut self, user: UserId, mut from: Option<NodeId>) -> StoreResult<usize> {
        let mut removed = 0;
        while let Some(id) = from {
            let node = load_node(&self.nodes, id)?;
            if node.is_terminal() || has_children(&self.children, user, Some(id))? {
                break;
            }
            self.unlink_node(&node)?;
            removed += 1;
            from = node.parent;
        }
        Ok(removed)
    }
}
