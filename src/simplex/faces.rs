//! Combinatorial face computations on simplex paths.
//!
//! Pure functions with no storage access. Downward closure is only ever
//! computed here, never materialized in the tree.

use crate::error::InputError;
use crate::ids::VertexId;

/// Largest vertex set whose theoretical faces may be enumerated (2^20 - 1 faces).
pub const MAX_ENUMERABLE_VERTICES: usize = 20;

/// Sort and deduplicate a vertex set into its canonical path order.
pub fn canonical_path(vertices: &[VertexId]) -> Vec<VertexId> {
    let mut path = vertices.to_vec();
    path.sort_unstable();
    path.dedup();
    path
}

/// Maximal proper faces: the paths obtained by omitting exactly one position.
///
/// A 0-simplex has no non-empty proper face, so a single-vertex path yields
/// no facets.
pub fn facets_of(path: &[VertexId]) -> Vec<Vec<VertexId>> {
    if path.len() < 2 {
        return Vec::new();
    }
    (0..path.len())
        .map(|skip| {
            path.iter()
                .enumerate()
                .filter(|&(i, _)| i != skip)
                .map(|(_, &v)| v)
                .collect()
        })
        .collect()
}

/// All non-empty subsets of the path's vertex set, including the set itself.
///
/// A `j`-vertex input yields exactly `2^j - 1` faces, each in canonical order,
/// listed by size and then lexicographically. Exponential: only call this on
/// the vertex set of one retrieved simplex.
pub fn theoretical_faces_of(path: &[VertexId]) -> Result<Vec<Vec<VertexId>>, InputError> {
    let path = canonical_path(path);
    if path.is_empty() {
        return Err(InputError::EmptySimplex);
    }
    if path.len() > MAX_ENUMERABLE_VERTICES {
        return Err(InputError::TooManyVertices {
            count: path.len(),
            max: MAX_ENUMERABLE_VERTICES,
        });
    }

    let n = path.len();
    let mut faces: Vec<Vec<VertexId>> = (1u32..(1u32 << n))
        .map(|mask| {
            (0..n)
                .filter(|i| mask & (1 << i) != 0)
                .map(|i| path[i])
                .collect()
        })
        .collect();
    faces.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    Ok(faces)
}

/// Whether every vertex of `face` appears in `of`. Both must be canonical.
pub fn is_subset(face: &[VertexId], of: &[VertexId]) -> bool {
    let mut rest = of.iter();
    face.iter().all(|v| rest.any(|w| w == v))
}
