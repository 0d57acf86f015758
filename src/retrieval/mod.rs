//! Retrieval Engine: query embedding in, grounded context out.
//!
//! 1. Match the user's vertices against the query ([`VertexMatcher`]).
//! 2. Collect every stored simplex containing a matched vertex.
//! 3. Detect gaps inside each of those simplices separately.
//! 4. Assemble labels and the edges among the retrieved vertices.
//!
//! An empty match set is an empty result, not an error.

pub mod gaps;
pub mod matcher;
mod render;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::collab::Embedder;
use crate::config::RetrievalConfig;
use crate::error::SimplicialResult;
use crate::ids::{NodeId, UserId, VertexId};
use crate::simplex::{Simplex, SimplexTree};
use crate::store::{Edge, VertexStore};

pub use gaps::{GapBounds, KnowledgeGap, detect_gaps};
pub use matcher::{BruteForceMatcher, MatchedVertex, VertexMatcher, cosine_similarity};

/// Everything retrieved for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    /// Matched vertices, most similar first.
    pub matched: Vec<MatchedVertex>,
    /// Stored simplices containing at least one matched vertex, deduplicated.
    pub cofaces: Vec<Simplex>,
    pub gaps: Vec<KnowledgeGap>,
    /// Labels of every vertex in `matched` and `cofaces`.
    pub labels: BTreeMap<VertexId, String>,
    /// Edges whose endpoints both appear in `labels`.
    pub edges: Vec<Edge>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }

    /// Label of a vertex, falling back to its id.
    pub fn label(&self, vertex: VertexId) -> String {
        self.labels
            .get(&vertex)
            .cloned()
            .unwrap_or_else(|| vertex.to_string())
    }

    /// Gaps attributed to the coface ending at `context`.
    pub fn gaps_in(&self, context: NodeId) -> impl Iterator<Item = &KnowledgeGap> {
        self.gaps.iter().filter(move |g| g.context == context)
    }
}

/// Query-time view over the store.
#[derive(Clone)]
pub struct RetrievalEngine {
    vertices: VertexStore,
    tree: SimplexTree,
    matcher: Arc<dyn VertexMatcher>,
    config: RetrievalConfig,
}

impl std::fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RetrievalEngine {
    /// Engine with the exhaustive [`BruteForceMatcher`].
    pub fn new(vertices: VertexStore, tree: SimplexTree, config: RetrievalConfig) -> Self {
        let matcher = Arc::new(BruteForceMatcher::new(vertices.clone()));
        Self {
            vertices,
            tree,
            matcher,
            config,
        }
    }

    /// Replace the vertex matcher, e.g. with an external ANN index.
    pub fn with_matcher(mut self, matcher: Arc<dyn VertexMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve with the configured `top_k` and threshold.
    pub fn retrieve(&self, user: UserId, query: &[f32]) -> SimplicialResult<RetrievalResult> {
        self.retrieve_with(user, query, self.config.top_k, self.config.similarity_threshold)
    }

    /// Embed `text` and retrieve.
    pub fn retrieve_text(
        &self,
        user: UserId,
        text: &str,
        embedder: &dyn Embedder,
        top_k: usize,
        threshold: f32,
    ) -> SimplicialResult<RetrievalResult> {
        let query = embedder.embed(text)?;
        self.retrieve_with(user, &query, top_k, threshold)
    }

    pub fn retrieve_with(
        &self,
        user: UserId,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> SimplicialResult<RetrievalResult> {
        let matched = self.matcher.top_matches(user, query, top_k, threshold)?;
        if matched.is_empty() {
            tracing::debug!(%user, threshold, "no vertex above threshold");
            return Ok(RetrievalResult::default());
        }

        let mut by_path: BTreeMap<Vec<VertexId>, Simplex> = BTreeMap::new();
        for m in &matched {
            for coface in self.tree.cofaces_containing(user, m.vertex, 1)? {
                by_path.entry(coface.vertices.clone()).or_insert(coface);
            }
        }
        let cofaces: Vec<Simplex> = by_path.into_values().collect();

        let gaps = detect_gaps(
            &self.tree,
            user,
            &cofaces,
            GapBounds {
                min_face_vertices: self.config.min_gap_vertices,
                max_coface_vertices: self.config.max_gap_vertices,
            },
        )?;

        let context: BTreeSet<VertexId> = matched
            .iter()
            .map(|m| m.vertex)
            .chain(cofaces.iter().flat_map(|c| c.vertices.iter().copied()))
            .collect();
        let labels = self.vertices.labels(context.iter().copied())?;
        let edges = self
            .vertices
            .lookup_edges(user, None, None)?
            .into_iter()
            .filter(|e| context.contains(&e.tail) && context.contains(&e.head))
            .collect();

        tracing::debug!(
            %user,
            matched = matched.len(),
            cofaces = cofaces.len(),
            gaps = gaps.len(),
            "retrieval complete"
        );
        Ok(RetrievalResult {
            matched,
            cofaces,
            gaps,
            labels,
            edges,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::vertex_ids;
    use crate::metadata::Metadata;
    use crate::simplex::SimplexKind;
    use crate::store::Store;

    const U: UserId = UserId(1);

    struct Fixture {
        engine: RetrievalEngine,
        vertices: VertexStore,
        tree: SimplexTree,
    }

    fn fixture() -> Fixture {
        let store = Store::in_memory().unwrap();
        let vertices = VertexStore::new(store.clone(), None);
        let tree = SimplexTree::new(store);
        Fixture {
            engine: RetrievalEngine::new(vertices.clone(), tree.clone(), RetrievalConfig::default()),
            vertices,
            tree,
        }
    }

    fn vertex(f: &Fixture, name: &str, embedding: &[f32]) -> VertexId {
        f.vertices
            .canonicalize(U, name, embedding, Metadata::new())
            .unwrap()
    }

    #[test]
    fn empty_store_gives_empty_result() {
        let f = fixture();
        let result = f.engine.retrieve(U, &[1.0, 0.0]).unwrap();
        assert!(result.is_empty());
        assert!(result.cofaces.is_empty());
        assert!(result.gaps.is_empty());
    }

    #[test]
    fn match_lookup_and_gaps() {
        let f = fixture();
        let a = vertex(&f, "Jodhpur", &[1.0, 0.0]);
        let b = vertex(&f, "restaurants", &[0.0, 1.0]);
        let c = vertex(&f, "Indana Palace", &[0.0, 1.0]);
        let d = vertex(&f, "Marais", &[0.0, 1.0]);
        f.tree
            .insert(U, &[a, b, c], SimplexKind::TemporalSession, Metadata::new())
            .unwrap();
        f.tree
            .insert(U, &[c, d], SimplexKind::TemporalSession, Metadata::new())
            .unwrap();
        f.vertices
            .record_edge(U, c, a, "located_in", Metadata::new())
            .unwrap();

        let result = f.engine.retrieve(U, &[1.0, 0.0]).unwrap();
        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.matched[0].vertex, a);
        assert_eq!(result.cofaces.len(), 1);
        assert_eq!(result.cofaces[0].vertices, vec![a, b, c]);

        // Marais is not in any coface of Jodhpur.
        assert!(result.gaps.iter().all(|g| !g.face.contains(&d)));
        assert!(result.gaps.iter().any(|g| g.face == vec![a, b]));
        assert_eq!(result.gaps_in(result.cofaces[0].leaf).count(), result.gaps.len());

        assert_eq!(result.label(a), "Jodhpur");
        assert!(!result.labels.contains_key(&d));
        assert_eq!(result.edges.len(), 1);
    }

    #[test]
    fn cofaces_are_deduplicated_across_matches() {
        let f = fixture();
        let a = vertex(&f, "a", &[1.0, 0.0]);
        let b = vertex(&f, "b", &[0.9, 0.1]);
        f.tree
            .insert(U, &[a, b], SimplexKind::TemporalSession, Metadata::new())
            .unwrap();
        let result = f.engine.retrieve(U, &[1.0, 0.0]).unwrap();
        assert_eq!(result.matched.len(), 2);
        assert_eq!(result.cofaces.len(), 1);
        // Gaps {a} and {b}, each reported once.
        assert_eq!(result.gaps.len(), 2);
    }

    #[test]
    fn custom_matcher_is_used() {
        struct Fixed(VertexId);
        impl VertexMatcher for Fixed {
            fn top_matches(
                &self,
                _user: UserId,
                _query: &[f32],
                _top_k: usize,
                _threshold: f32,
            ) -> SimplicialResult<Vec<MatchedVertex>> {
                Ok(vec![MatchedVertex {
                    vertex: self.0,
                    content: "fixed".into(),
                    similarity: 1.0,
                    metadata: Metadata::new(),
                }])
            }
        }

        let f = fixture();
        let a = vertex(&f, "a", &[0.0, 1.0]);
        let b = vertex(&f, "b", &[0.0, 1.0]);
        f.tree
            .insert(U, &vertex_ids(&[a.get(), b.get()]), SimplexKind::Location, Metadata::new())
            .unwrap();
        let engine = f.engine.clone().with_matcher(Arc::new(Fixed(b)));
        let result = engine.retrieve(U, &[1.0, 0.0]).unwrap();
        assert_eq!(result.matched[0].vertex, b);
        assert_eq!(result.cofaces.len(), 1);
    }
}
