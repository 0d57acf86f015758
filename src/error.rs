//! Rich diagnostic error types for simplicial memory.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains. Lookups that find nothing
//! return `Ok(None)` or an empty result; the `NotFound` variants are reserved for
//! references that callers claim exist (a node id, a vertex id).

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for simplicial memory.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum SimplicialError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl SimplicialError {
    /// Whether this error came from an unreachable or failing persistence layer.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(
            self,
            SimplicialError::Store(StoreError::Unavailable { .. } | StoreError::Io { .. })
        )
    }

    /// Whether this error rejected caller input before any write.
    pub fn is_malformed_input(&self) -> bool {
        matches!(self, SimplicialError::Input(_))
    }
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(simplicial::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("store unavailable: {message}")]
    #[diagnostic(
        code(simplicial::store::unavailable),
        help(
            "The embedded database could not complete the operation. No partial \
             write was committed. Check that no other process holds the database \
             file and that the file is not corrupted."
        )
    )]
    Unavailable { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(simplicial::store::serde),
        help(
            "Failed to encode or decode a stored record. This usually means the \
             stored data format has changed between versions."
        )
    )]
    Serialization { message: String },

    #[error("{what} not found: {id}")]
    #[diagnostic(
        code(simplicial::store::not_found),
        help("The referenced record does not exist for this user. Verify the identifier.")
    )]
    NotFound { what: &'static str, id: u64 },

    #[error("uniqueness constraint violated in {table}: {key}")]
    #[diagnostic(
        code(simplicial::store::constraint),
        help(
            "Another writer created the same record concurrently. The operation \
             re-reads and returns the existing record; seeing this error means the \
             conflict persisted across every retry."
        )
    )]
    ConstraintViolation { table: &'static str, key: String },
}

impl From<redb::DatabaseError> for StoreError {
    fn from(e: redb::DatabaseError) -> Self {
        StoreError::Unavailable {
            message: format!("database: {e}"),
        }
    }
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        StoreError::Unavailable {
            message: format!("transaction: {e}"),
        }
    }
}

impl From<redb::TableError> for StoreError {
    fn from(e: redb::TableError) -> Self {
        StoreError::Unavailable {
            message: format!("table: {e}"),
        }
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(e: redb::StorageError) -> Self {
        StoreError::Unavailable {
            message: format!("storage: {e}"),
        }
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(e: redb::CommitError) -> Self {
        StoreError::Unavailable {
            message: format!("commit: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Input errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum InputError {
    #[error("empty simplex: at least one vertex is required")]
    #[diagnostic(
        code(simplicial::input::empty_simplex),
        help("A simplex is a non-empty vertex set. Provide one or more vertex ids.")
    )]
    EmptySimplex,

    #[error(
        "vertex sequence not strictly increasing at position {position}: {previous} then {next}"
    )]
    #[diagnostic(
        code(simplicial::input::not_increasing),
        help(
            "Simplex paths are canonical: vertex ids must be sorted ascending with \
             no duplicates. Sort and deduplicate the vertex set before inserting."
        )
    )]
    NotStrictlyIncreasing {
        position: usize,
        previous: u64,
        next: u64,
    },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    #[diagnostic(
        code(simplicial::input::dim_mismatch),
        help(
            "Every embedding stored for this memory must share one dimension. \
             Check that the same embedding model produced all vectors."
        )
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("empty entity content")]
    #[diagnostic(
        code(simplicial::input::empty_content),
        help("Vertex content is the canonical label of an entity and cannot be blank.")
    )]
    EmptyContent,

    #[error("simplex has {count} vertices; face enumeration is limited to {max}")]
    #[diagnostic(
        code(simplicial::input::too_many_vertices),
        help(
            "Theoretical face enumeration is exponential in the vertex count. \
             Only enumerate the faces of a single retrieved simplex."
        )
    )]
    TooManyVertices { count: usize, max: usize },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(simplicial::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(simplicial::config::parse),
        help("Check the TOML syntax and field names in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(simplicial::config::invalid), help("{message}"))]
    Invalid { message: String },
}

// ---------------------------------------------------------------------------
// Collaborator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum CollaboratorError {
    #[error("extraction failed: {message}")]
    #[diagnostic(
        code(simplicial::collab::extraction),
        help("The entity extraction service returned an error or an unusable response.")
    )]
    Extraction { message: String },

    #[error("embedding failed: {message}")]
    #[diagnostic(
        code(simplicial::collab::embedding),
        help("The embedding service returned an error or an unusable vector.")
    )]
    Embedding { message: String },
}

/// Convenience result type for simplicial memory operations.
pub type SimplicialResult<T> = std::result::Result<T, SimplicialError>;
