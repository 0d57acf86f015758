//! Engine facade: top-level API for simplicial memory.
//!
//! The `Engine` owns the store and wires the Vertex/Edge Store, the Simplex
//! Tree, the Witness Complex Builder and the Retrieval Engine over it. All
//! components share one database handle, so the engine is cheap to clone.

use crate::collab::{Embedder, Extractor};
use crate::config::MemoryConfig;
use crate::error::SimplicialResult;
use crate::ids::{UserId, VertexId};
use crate::retrieval::{RetrievalEngine, RetrievalResult};
use crate::simplex::{Simplex, SimplexTree};
use crate::store::{Store, VertexStore};
use crate::witness::checkpoint::checkpoint_path;
use crate::witness::{IngestReport, Observation, TextObservation, WitnessBuilder};

/// Top-level simplicial memory.
#[derive(Clone)]
pub struct Engine {
    config: MemoryConfig,
    store: Store,
    vertices: VertexStore,
    tree: SimplexTree,
    witness: WitnessBuilder,
    retrieval: RetrievalEngine,
}

impl Engine {
    /// Validate the configuration and open (or create) the store.
    pub fn new(config: MemoryConfig) -> SimplicialResult<Self> {
        config.validate()?;

        let store = match config.data_dir {
            Some(ref dir) => Store::open(dir)?,
            None => Store::in_memory()?,
        };
        tracing::info!(
            persistent = store.is_persistent(),
            embedding_dim = ?config.embedding_dim,
            window_minutes = config.witness.window_minutes,
            location_policy = %config.witness.location_policy,
            "opened simplicial memory"
        );

        let vertices = VertexStore::new(store.clone(), config.embedding_dim);
        let tree = SimplexTree::new(store.clone());
        let witness = WitnessBuilder::new(
            store.clone(),
            vertices.clone(),
            tree.clone(),
            config.witness.clone(),
        );
        let retrieval = RetrievalEngine::new(vertices.clone(), tree.clone(), config.retrieval.clone());

        Ok(Self {
            config,
            store,
            vertices,
            tree,
            witness,
            retrieval,
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn vertices(&self) -> &VertexStore {
        &self.vertices
    }

    pub fn tree(&self) -> &SimplexTree {
        &self.tree
    }

    pub fn witness(&self) -> &WitnessBuilder {
        &self.witness
    }

    pub fn retrieval(&self) -> &RetrievalEngine {
        &self.retrieval
    }

    /// Ingest a batch of observations for one user.
    pub fn ingest(&self, user: UserId, observations: Vec<Observation>) -> SimplicialResult<IngestReport> {
        self.witness.ingest(user, observations)
    }

    /// Extract and ingest a batch of raw text for one user.
    ///
    /// With a data directory, extraction progress is checkpointed there and
    /// `resume` continues an interrupted batch without extracting its
    /// finished entries again.
    pub fn ingest_text(
        &self,
        user: UserId,
        items: Vec<TextObservation>,
        extractor: &dyn Extractor,
        resume: bool,
    ) -> SimplicialResult<IngestReport> {
        match self.config.data_dir {
            Some(ref dir) => self.witness.ingest_text_resumable(
                user,
                items,
                extractor,
                &checkpoint_path(dir, user),
                resume,
            ),
            None => self.witness.ingest_text(user, items, extractor),
        }
    }

    /// Retrieve with the configured limits.
    pub fn query(&self, user: UserId, embedding: &[f32]) -> SimplicialResult<RetrievalResult> {
        self.retrieval.retrieve(user, embedding)
    }

    /// Embed `text` and retrieve with explicit limits.
    pub fn query_text(
        &self,
        user: UserId,
        text: &str,
        embedder: &dyn Embedder,
        top_k: usize,
        threshold: f32,
    ) -> SimplicialResult<RetrievalResult> {
        self.retrieval.retrieve_text(user, text, embedder, top_k, threshold)
    }

    /// Stored simplices containing the vertex whose content matches `content`.
    ///
    /// `None` when no such vertex exists.
    pub fn cofaces_of_content(
        &self,
        user: UserId,
        content: &str,
    ) -> SimplicialResult<Option<(VertexId, Vec<Simplex>)>> {
        let Some(vertex) = self.vertices.lookup_vertex(user, content)? else {
            return Ok(None);
        };
        let cofaces = self.tree.cofaces_containing(user, vertex, 1)?;
        Ok(Some((vertex, cofaces)))
    }

    /// Counts for one user.
    pub fn info(&self, user: UserId) -> SimplicialResult<EngineInfo> {
        Ok(EngineInfo {
            user,
            vertex_count: self.store.vertex_count(user)?,
            edge_count: self.store.edge_count(user)?,
            node_count: self.tree.node_count(user)?,
            simplex_count: self.tree.simplex_count(user)?,
            persistent: self.store.is_persistent(),
        })
    }
}

/// Summary information about one user's memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInfo {
    pub user: UserId,
    pub vertex_count: usize,
    pub edge_count: usize,
    /// Trie nodes, shared prefixes included.
    pub node_count: usize,
    /// Observed simplices.
    pub simplex_count: usize,
    pub persistent: bool,
}

impl std::fmt::Display for EngineInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "simplicial memory info ({})", self.user)?;
        writeln!(f, "  vertices:     {}", self.vertex_count)?;
        writeln!(f, "  edges:        {}", self.edge_count)?;
        writeln!(f, "  nodes:        {}", self.node_count)?;
        writeln!(f, "  simplices:    {}", self.simplex_count)?;
        writeln!(f, "  persistent:   {}", self.persistent)?;
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("store", &self.store)
            .finish()
    }
}
