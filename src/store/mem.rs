//! In-memory canonicalization cache backed by DashMap.
//!
//! Maps `(user, canonical content)` to the vertex that owns it, so repeated
//! mentions of the same entity skip the database lookup. Vertices are never
//! deleted, so an entry can never go stale; the unique index in the store
//! remains the source of truth and the cache is only filled after a commit.

use dashmap::DashMap;

use crate::ids::{UserId, VertexId};

/// Concurrent `(user, canonical content) -> vertex` cache.
#[derive(Debug, Default)]
pub struct CanonicalCache {
    entries: DashMap<(UserId, String), VertexId>,
}

impl CanonicalCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, user: UserId, key: &str) -> Option<VertexId> {
        self.entries
            .get(&(user, key.to_owned()))
            .map(|entry| *entry.value())
    }

    pub fn insert(&self, user: UserId, key: String, vertex: VertexId) {
        self.entries.insert((user, key), vertex);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
