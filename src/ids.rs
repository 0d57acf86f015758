//! Typed identifiers for users, vertices, edges and simplex-tree nodes.
//!
//! Vertex, edge and node ids are niche-optimized around `NonZeroU64`, so
//! `Option<NodeId>` costs no more than `NodeId` and the raw value `0` stays free
//! to stand for the virtual root in composite index keys.

use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

/// Owning-user identifier. Every stored record is partitioned by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct UserId(pub u64);

impl UserId {
    /// Get the underlying `u64` value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user:{}", self.0)
    }
}

macro_rules! nonzero_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(NonZeroU64);

        impl $name {
            /// Create an id from a raw `u64`. Returns `None` if `raw` is zero.
            pub fn new(raw: u64) -> Option<Self> {
                NonZeroU64::new(raw).map($name)
            }

            /// Get the underlying `u64` value.
            pub fn get(self) -> u64 {
                self.0.get()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

nonzero_id!(
    /// Identifier of a canonical entity record.
    ///
    /// Ordering matters: simplex paths list vertex ids in strictly increasing order.
    VertexId,
    "v"
);

nonzero_id!(
    /// Identifier of a pairwise relationship record.
    EdgeId,
    "e"
);

nonzero_id!(
    /// Identifier of a node in the persistent simplex trie.
    NodeId,
    "n"
);

/// Build a vertex id list from raw values, dropping zeros.
///
/// Mostly useful in tests and at the CLI boundary.
pub fn vertex_ids(raw: &[u64]) -> Vec<VertexId> {
    raw.iter().copied().filter_map(VertexId::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_niche_optimization() {
        assert_eq!(
            std::mem::size_of::<Option<NodeId>>(),
            std::mem::size_of::<NodeId>()
        );
    }

    #[test]
    fn zero_is_not_an_id() {
        assert!(VertexId::new(0).is_none());
        assert_eq!(VertexId::new(42).unwrap().get(), 42);
    }

    #[test]
    fn display_prefixes() {
        assert_eq!(VertexId::new(3).unwrap().to_string(), "v:3");
        assert_eq!(NodeId::new(9).unwrap().to_string(), "n:9");
        assert_eq!(EdgeId::new(1).unwrap().to_string(), "e:1");
        assert_eq!(UserId(7).to_string(), "user:7");
    }

    #[test]
    fn vertex_ids_follow_raw_order() {
        let ids = vertex_ids(&[1, 0, 5]);
        assert_eq!(ids.len(), 2);
        assert!(ids[0] < ids[1]);
    }
}
