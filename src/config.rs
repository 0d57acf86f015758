//! Memory configuration, persisted as TOML.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration backed by an in-memory store.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::simplex::faces::MAX_ENUMERABLE_VERTICES;
use crate::witness::LocationPolicy;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Directory holding the database. `None` keeps everything in memory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Embedding dimension enforced on every vertex.
    #[serde(default)]
    pub embedding_dim: Option<usize>,
    #[serde(default)]
    pub witness: WitnessConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// Witness Complex Builder settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WitnessConfig {
    /// Temporal window length, measured from the window's first observation.
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,
    /// Closed windows with fewer distinct vertices are not inserted.
    #[serde(default = "default_min_simplex_vertices")]
    pub min_simplex_vertices: usize,
    /// Pause between extraction calls during raw-text ingestion.
    #[serde(default)]
    pub inter_call_delay_ms: u64,
    #[serde(default)]
    pub location_policy: LocationPolicy,
}

fn default_window_minutes() -> u32 {
    30
}
fn default_min_simplex_vertices() -> usize {
    2
}

impl Default for WitnessConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_window_minutes(),
            min_simplex_vertices: default_min_simplex_vertices(),
            inter_call_delay_ms: 0,
            location_policy: LocationPolicy::default(),
        }
    }
}

/// Retrieval Engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Minimum cosine similarity for a vertex to match.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// Cofaces with more vertices are skipped by gap detection.
    #[serde(default = "default_max_gap_vertices")]
    pub max_gap_vertices: usize,
    /// Smallest face reported as a gap.
    #[serde(default = "default_min_gap_vertices")]
    pub min_gap_vertices: usize,
}

fn default_top_k() -> usize {
    10
}
fn default_similarity_threshold() -> f32 {
    0.5
}
fn default_max_gap_vertices() -> usize {
    12
}
fn default_min_gap_vertices() -> usize {
    1
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            max_gap_vertices: default_max_gap_vertices(),
            min_gap_vertices: default_min_gap_vertices(),
        }
    }
}

impl MemoryConfig {
    /// Default configuration persisted under `data_dir`.
    pub fn persistent(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Default::default()
        }
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Parse and validate TOML text. `origin` names the source in errors.
    pub fn parse(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| Err(ConfigError::Invalid { message });

        if self.witness.window_minutes == 0 {
            return invalid("witness.window_minutes must be greater than 0".into());
        }
        if self.witness.min_simplex_vertices == 0 {
            return invalid("witness.min_simplex_vertices must be at least 1".into());
        }
        if self.retrieval.top_k == 0 {
            return invalid("retrieval.top_k must be greater than 0".into());
        }
        let t = self.retrieval.similarity_threshold;
        if !(0.0..=1.0).contains(&t) {
            return invalid(format!(
                "retrieval.similarity_threshold must be within [0, 1], got {t}"
            ));
        }
        if self.retrieval.max_gap_vertices > MAX_ENUMERABLE_VERTICES {
            return invalid(format!(
                "retrieval.max_gap_vertices must be at most {MAX_ENUMERABLE_VERTICES}"
            ));
        }
        if self.retrieval.min_gap_vertices == 0 {
            return invalid("retrieval.min_gap_vertices must be at least 1".into());
        }
        if self.embedding_dim == Some(0) {
            return invalid("embedding_dim must be greater than 0".into());
        }
        Ok(())
    }
}
