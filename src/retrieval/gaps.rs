//! Per-coface gap detection.
//!
//! A gap is a face of a retrieved simplex that was never observed on its
//! own. Faces are only ever enumerated inside a single coface, so every gap
//! is a subset of the context it is attributed to; vertices that never
//! co-occurred are never paired.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::SimplicialResult;
use crate::ids::{NodeId, UserId, VertexId};
use crate::simplex::{Simplex, SimplexTree, theoretical_faces_of};

/// A combinatorially implied face missing from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnowledgeGap {
    pub face: Vec<VertexId>,
    /// Leaf node of the coface the gap was found in.
    pub context: NodeId,
}

/// Size bounds for gap detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapBounds {
    /// Smallest face reported.
    pub min_face_vertices: usize,
    /// Cofaces with more vertices are skipped.
    pub max_coface_vertices: usize,
}

/// Detect gaps in each coface independently.
///
/// Membership answers are memoized across cofaces, but a face missing from
/// two cofaces is reported once per context.
pub fn detect_gaps(
    tree: &SimplexTree,
    user: UserId,
    cofaces: &[Simplex],
    bounds: GapBounds,
) -> SimplicialResult<Vec<KnowledgeGap>> {
    let mut known: HashMap<Vec<VertexId>, bool> = HashMap::new();
    let mut gaps = Vec::new();

    for coface in cofaces {
        if coface.vertices.len() > bounds.max_coface_vertices {
            tracing::warn!(
                %user,
                context = %coface.leaf,
                vertices = coface.vertices.len(),
                max = bounds.max_coface_vertices,
                "coface too large for gap detection, skipped"
            );
            continue;
        }

        for face in theoretical_faces_of(&coface.vertices)? {
            if face.len() < bounds.min_face_vertices || face == coface.vertices {
                continue;
            }
            let present = match known.get(&face) {
                Some(&present) => present,
                None => {
                    let present = tree.find(user, &face)?.is_some();
                    known.insert(face.clone(), present);
                    present
                }
            };
            if !present {
                gaps.push(KnowledgeGap {
                    face,
                    context: coface.leaf,
                });
            }
        }
    }
    Ok(gaps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::vertex_ids;
    use crate::metadata::Metadata;
    use crate::simplex::SimplexKind;
    use crate::store::{Store, seed_vertices};

    const U: UserId = UserId(1);
    const DEFAULT: GapBounds = GapBounds {
        min_face_vertices: 1,
        max_coface_vertices: 12,
    };

    fn tree_with(simplices: &[&[u64]]) -> SimplexTree {
        let store = Store::in_memory().unwrap();
        seed_vertices(&store, U, 4);
        let tree = SimplexTree::new(store);
        for raw in simplices {
            tree.insert(U, &vertex_ids(raw), SimplexKind::TemporalSession, Metadata::new())
                .unwrap();
        }
        tree
    }

    fn faces(gaps: &[KnowledgeGap]) -> Vec<Vec<u64>> {
        gaps.iter()
            .map(|g| g.face.iter().map(|v| v.get()).collect())
            .collect()
    }

    #[test]
    fn unobserved_faces_are_gaps() {
        let tree = tree_with(&[&[1, 2, 3]]);
        let cofaces = tree.cofaces_containing(U, VertexId::new(2).unwrap(), 1).unwrap();
        let gaps = detect_gaps(&tree, U, &cofaces, DEFAULT).unwrap();
        let found = faces(&gaps);
        assert_eq!(found.len(), 6);
        for expected in [vec![1, 2], vec![1, 3], vec![2]] {
            assert!(found.contains(&expected), "{expected:?}");
        }
        assert!(!found.contains(&vec![1, 2, 3]));
        assert!(gaps.iter().all(|g| g.context == cofaces[0].leaf));
    }

    #[test]
    fn observed_faces_are_not_gaps() {
        let tree = tree_with(&[&[1, 2, 3], &[1, 2], &[3]]);
        let cofaces: Vec<Simplex> = tree
            .all_simplices(U)
            .unwrap()
            .into_iter()
            .filter(|s| s.vertices.len() == 3)
            .collect();
        let found = faces(&detect_gaps(&tree, U, &cofaces, DEFAULT).unwrap());
        assert!(!found.contains(&vec![1, 2]));
        assert!(!found.contains(&vec![3]));
        assert!(found.contains(&vec![2, 3]));
    }

    #[test]
    fn gaps_stay_inside_their_context() {
        let tree = tree_with(&[&[1, 2, 3], &[3, 4]]);
        let cofaces = tree.cofaces_containing(U, VertexId::new(3).unwrap(), 1).unwrap();
        assert_eq!(cofaces.len(), 2);
        let gaps = detect_gaps(&tree, U, &cofaces, DEFAULT).unwrap();
        for gap in &gaps {
            let context = cofaces.iter().find(|c| c.leaf == gap.context).unwrap();
            assert!(crate::simplex::is_subset(&gap.face, &context.vertices));
        }
        // 1 and 4 never co-occurred.
        assert!(!faces(&gaps).iter().any(|f| f.contains(&1) && f.contains(&4)));
    }

    #[test]
    fn bounds_filter_faces_and_cofaces() {
        let tree = tree_with(&[&[1, 2, 3]]);
        let cofaces = tree.all_simplices(U).unwrap();

        let pairs_only = GapBounds {
            min_face_vertices: 2,
            ..DEFAULT
        };
        assert_eq!(detect_gaps(&tree, U, &cofaces, pairs_only).unwrap().len(), 3);

        let tiny = GapBounds {
            max_coface_vertices: 2,
            ..DEFAULT
        };
        assert!(detect_gaps(&tree, U, &cofaces, tiny).unwrap().is_empty());
    }
}
