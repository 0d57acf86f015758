//! Vertex matching: scoring a user's vertices against a query embedding.

use rayon::prelude::*;
use serde::Serialize;

use crate::error::SimplicialResult;
use crate::ids::{UserId, VertexId};
use crate::metadata::Metadata;
use crate::store::VertexStore;

/// A vertex that matched a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedVertex {
    pub vertex: VertexId,
    pub content: String,
    pub similarity: f32,
    pub metadata: Metadata,
}

/// Finds the vertices of a user most similar to a query embedding.
///
/// Implementations return at most `top_k` matches with
/// `similarity >= threshold`, ordered by descending similarity.
pub trait VertexMatcher: Send + Sync {
    fn top_matches(
        &self,
        user: UserId,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> SimplicialResult<Vec<MatchedVertex>>;
}

/// Cosine similarity. Zero for mismatched lengths or a zero-norm input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Exhaustive scan over every vertex of the user, scored in parallel.
#[derive(Debug, Clone)]
pub struct BruteForceMatcher {
    vertices: VertexStore,
}

impl BruteForceMatcher {
    pub fn new(vertices: VertexStore) -> Self {
        Self { vertices }
    }
}

impl VertexMatcher for BruteForceMatcher {
    fn top_matches(
        &self,
        user: UserId,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> SimplicialResult<Vec<MatchedVertex>> {
        let all = self.vertices.vertices(user)?;

        let mismatched = all
            .iter()
            .filter(|v| v.embedding.len() != query.len())
            .count();
        if mismatched > 0 {
            tracing::warn!(
                %user,
                mismatched,
                query_dim = query.len(),
                "skipping vertices with a different embedding dimension"
            );
        }

        let mut scored: Vec<MatchedVertex> = all
            .into_par_iter()
            .filter(|v| v.embedding.len() == query.len())
            .filter_map(|v| {
                let similarity = cosine_similarity(query, &v.embedding);
                (similarity >= threshold).then(|| MatchedVertex {
                    vertex: v.id,
                    content: v.content,
                    similarity,
                    metadata: v.metadata,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.vertex.cmp(&b.vertex))
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}
