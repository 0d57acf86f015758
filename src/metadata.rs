//! Open key/value metadata restricted to a closed set of value types.
//!
//! Vertices, edges and simplex nodes all carry a [`Metadata`] map. Values are
//! limited to the variants of [`MetaValue`] so stored records stay checkable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata key: RFC 3339 timestamp of the first observation of a vertex.
pub const FIRST_SEEN: &str = "first_seen";
/// Metadata key: RFC 3339 timestamp of the most recent observation of a vertex.
pub const LAST_SEEN: &str = "last_seen";
/// Metadata key: number of times a vertex has been resolved by canonicalization.
pub const FREQUENCY: &str = "frequency";

/// A single metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    IntList(Vec<i64>),
    TextList(Vec<String>),
}

impl MetaValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetaValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl std::fmt::Display for MetaValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetaValue::Bool(b) => write!(f, "{b}"),
            MetaValue::Int(i) => write!(f, "{i}"),
            MetaValue::Float(x) => write!(f, "{x}"),
            MetaValue::Text(s) => write!(f, "{s}"),
            MetaValue::IntList(v) => write!(f, "{v:?}"),
            MetaValue::TextList(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for MetaValue {
    fn from(b: bool) -> Self {
        MetaValue::Bool(b)
    }
}

impl From<i64> for MetaValue {
    fn from(i: i64) -> Self {
        MetaValue::Int(i)
    }
}

impl From<f64> for MetaValue {
    fn from(x: f64) -> Self {
        MetaValue::Float(x)
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Text(s.to_owned())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::Text(s)
    }
}

/// Ordered metadata map. Ordering keeps encoded records deterministic.
pub type Metadata = BTreeMap<String, MetaValue>;

/// Build a [`Metadata`] map from `(key, value)` pairs.
pub fn metadata<K, V, I>(pairs: I) -> Metadata
where
    K: Into<String>,
    V: Into<MetaValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Merge an incoming observation's metadata into an existing vertex's metadata.
///
/// Incoming keys overwrite existing ones, except that [`FIRST_SEEN`] keeps the
/// earliest recorded value and [`FREQUENCY`] is incremented rather than replaced.
pub fn merge_observation(existing: &mut Metadata, incoming: Metadata) {
    let frequency = existing
        .get(FREQUENCY)
        .and_then(MetaValue::as_int)
        .unwrap_or(0);

    for (key, value) in incoming {
        if key == FIRST_SEEN && existing.contains_key(FIRST_SEEN) {
            continue;
        }
        if key == FREQUENCY {
            continue;
        }
        existing.insert(key, value);
    }

    existing.insert(FREQUENCY.to_owned(), MetaValue::Int(frequency + 1));
}

/// Metadata for a vertex seen for the first time.
pub fn first_observation(mut incoming: Metadata) -> Metadata {
    incoming.insert(FREQUENCY.to_owned(), MetaValue::Int(1));
    if let Some(last) = incoming.get(LAST_SEEN).cloned() {
        incoming.entry(FIRST_SEEN.to_owned()).or_insert(last);
    }
    incoming
}
