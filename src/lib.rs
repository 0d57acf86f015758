// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # simplicial-memory
//!
//! Agent memory stored as a simplicial complex. Entities observed together
//! in one context are recorded as one simplex, so retrieval can tell which
//! entities were jointly observed and which combinations were never seen.
//!
//! ## Architecture
//!
//! - **Vertex/Edge Store** (`store`): canonical entities and flat relationships on redb
//! - **Simplex Tree** (`simplex`): persistent trie of sorted vertex paths with a coface index
//! - **Witness Complex Builder** (`witness`): temporal and location windows over an observation stream
//! - **Retrieval Engine** (`retrieval`): vertex matching, coface lookup, per-coface gap detection
//!
//! ## Library usage
//!
//! ```no_run
//! use chrono::Utc;
//! use simplicial_memory::config::MemoryConfig;
//! use simplicial_memory::engine::Engine;
//! use simplicial_memory::ids::UserId;
//! use simplicial_memory::witness::{EntityObservation, Observation};
//!
//! let engine = Engine::new(MemoryConfig::default()).unwrap();
//! let user = UserId(1);
//! let obs = Observation::new(
//!     Utc::now(),
//!     vec![
//!         EntityObservation::new("Jodhpur", vec![1.0, 0.0]),
//!         EntityObservation::new("restaurants", vec![0.0, 1.0]),
//!     ],
//! );
//! engine.ingest(user, vec![obs]).unwrap();
//! let result = engine.query(user, &[1.0, 0.0]).unwrap();
//! println!("{}", result.render());
//! ```

pub mod collab;
pub mod config;
pub mod engine;
pub mod error;
pub mod ids;
pub mod metadata;
pub mod retrieval;
pub mod simplex;
pub mod store;
pub mod witness;
