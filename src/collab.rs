//! Collaborator interfaces: entity extraction and text embedding.
//!
//! Both are external services in a full deployment (an LLM extractor, an
//! embedding model). The core only depends on these traits.
//! [`HashingEmbedder`] is a deterministic local embedder and
//! [`DelimitedExtractor`] a phrase splitter, for running the binary and the
//! tests without a model.

use serde::{Deserialize, Serialize};

use crate::error::{CollaboratorError, SimplicialResult};
use crate::witness::Relationship;

// ── Traits ──────────────────────────────────────────────────────────────

/// Turns text into a dense vector.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> SimplicialResult<Vec<f32>>;

    /// Output dimension, when fixed.
    fn dimension(&self) -> Option<usize> {
        None
    }
}

/// One entity found in raw text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub content: String,
    pub embedding: Vec<f32>,
}

/// Entities and relationships extracted from one piece of raw text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

/// Extracts entities (with embeddings) and relationships from raw text.
pub trait Extractor: Send + Sync {
    fn extract(&self, text: &str) -> SimplicialResult<Extraction>;
}

// ── HashingEmbedder ─────────────────────────────────────────────────────

/// Feature-hashing bag-of-words embedder.
///
/// Each lowercase alphanumeric token is hashed into one of `dimension`
/// buckets with a hash-derived sign; the result is L2-normalized. Texts that
/// share words get positive cosine similarity; identical token bags get 1.0.
/// Stable across runs and platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub const DEFAULT_DIMENSION: usize = 256;

    pub fn new(dimension: usize) -> Result<Self, CollaboratorError> {
        if dimension == 0 {
            return Err(CollaboratorError::Embedding {
                message: "hashing embedder dimension must be positive".into(),
            });
        }
        Ok(Self { dimension })
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimension: Self::DEFAULT_DIMENSION,
        }
    }
}

/// 64-bit FNV-1a.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> SimplicialResult<Vec<f32>> {
        let mut v = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }
}

// ── DelimitedExtractor ──────────────────────────────────────────────────

/// Takes every comma-, semicolon- or newline-separated phrase as one entity
/// and embeds it with a [`HashingEmbedder`]. Finds no relationships.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DelimitedExtractor {
    embedder: HashingEmbedder,
}

impl DelimitedExtractor {
    pub fn new(embedder: HashingEmbedder) -> Self {
        Self { embedder }
    }
}

impl Extractor for DelimitedExtractor {
    fn extract(&self, text: &str) -> SimplicialResult<Extraction> {
        let entities = text
            .split([',', ';', '\n'])
            .map(str::trim)
            .filter(|phrase| !phrase.is_empty())
            .map(|phrase| {
                Ok(ExtractedEntity {
                    content: phrase.to_owned(),
                    embedding: self.embedder.embed(phrase)?,
                })
            })
            .collect::<SimplicialResult<Vec<_>>>()?;
        Ok(Extraction {
            entities,
            relationships: Vec::new(),
        })
    }
}
