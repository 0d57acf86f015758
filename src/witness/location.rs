//! Location-anchored simplices and their supersession.
//!
//! Each `(user, location)` pair has at most one current location simplex,
//! tracked by an anchor record. Under [`LocationPolicy::RetireAndReplace`] a
//! new window at a known location inserts the union of the previous and new
//! vertex sets and retires the previous simplex in the same write
//! transaction, so readers see either the old simplex or the new one.
//!
//! Retiring only drops this location's context from the previous node. A
//! temporal session or another location that observed the same vertex set
//! keeps it stored.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::ids::{NodeId, UserId, VertexId};
use crate::metadata::{MetaValue, Metadata};
use crate::simplex::{self, SimplexContext, SimplexKind};
use crate::store::{LOCATION_ANCHORS, Store, StoreResult, canonical_key, decode, encode};
use crate::witness::window::OpenWindow;

/// Metadata key: normalized location of a location simplex.
pub const LOCATION: &str = "location";
/// Metadata key: location as first written.
pub const LOCATION_LABEL: &str = "location_label";

/// What happens to an earlier simplex when its location is observed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocationPolicy {
    /// Insert the merged vertex set and retire the previous location simplex.
    #[default]
    RetireAndReplace,
    /// Leave earlier location simplices in place.
    KeepHistory,
}

impl std::fmt::Display for LocationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationPolicy::RetireAndReplace => f.write_str("retire-and-replace"),
            LocationPolicy::KeepHistory => f.write_str("keep-history"),
        }
    }
}

/// Normalized location key: whitespace collapsed, then the canonical content
/// key. `None` for blank input.
pub fn normalize_location(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let key = canonical_key(&collapsed);
    (!key.is_empty()).then_some(key)
}

/// Most recent location simplex recorded for a `(user, location)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationAnchor {
    pub vertices: Vec<VertexId>,
    pub leaf: NodeId,
    pub label: String,
    pub updated_at: DateTime<Utc>,
}

/// Result of flushing one location window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationFlush {
    pub leaf: NodeId,
    pub inserted: bool,
    pub superseded: bool,
}

pub fn load_anchor(store: &Store, user: UserId, key: &str) -> StoreResult<Option<LocationAnchor>> {
    let txn = store.begin_read()?;
    let table = txn.open_table(LOCATION_ANCHORS)?;
    match table.get((user.0, key))? {
        Some(guard) => Ok(Some(decode(guard.value())?)),
        None => Ok(None),
    }
}

/// Context source of the location simplex anchored at `key`.
pub fn location_source(key: &str) -> String {
    format!("{LOCATION}:{key}")
}

/// Open window at one location.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationWindow {
    /// Normalized location key.
    pub key: String,
    /// Location as first written in this window.
    pub label: String,
    pub window: OpenWindow,
}

impl LocationWindow {
    pub fn metadata(&self) -> Metadata {
        let mut meta = self.window.bounds_metadata();
        meta.insert(LOCATION.to_owned(), MetaValue::from(self.key.as_str()));
        meta.insert(LOCATION_LABEL.to_owned(), MetaValue::from(self.label.as_str()));
        meta
    }
}

/// Record the location simplex for a closed window, superseding the previous
/// one according to `policy`.
pub(crate) fn record_location_simplex(
    store: &Store,
    user: UserId,
    closed: &LocationWindow,
    policy: LocationPolicy,
) -> StoreResult<LocationFlush> {
    let key = closed.key.as_str();
    let vertices = closed.window.path();
    let txn = store.begin_write()?;

    let prior: Option<LocationAnchor> = {
        let table = txn.open_table(LOCATION_ANCHORS)?;
        match table.get((user.0, key))? {
            Some(guard) => Some(decode(guard.value())?),
            None => None,
        }
    };

    let path = match (&prior, policy) {
        (Some(prior), LocationPolicy::RetireAndReplace) => {
            let mut merged = prior.vertices.clone();
            merged.extend_from_slice(&vertices);
            simplex::canonical_path(&merged)
        }
        _ => vertices,
    };

    let source = location_source(key);
    let context =
        SimplexContext::new(SimplexKind::Location, closed.metadata()).with_source(source.as_str());
    let outcome = simplex::insert_in_txn(&txn, user, &path, context)?;

    let mut superseded = false;
    if policy == LocationPolicy::RetireAndReplace {
        if let Some(prior) = prior.as_ref().filter(|p| p.vertices != path) {
            superseded = simplex::retire_in_txn(&txn, user, &prior.vertices, Some(&source))?;
        }
    }

    let anchor = LocationAnchor {
        vertices: path,
        leaf: outcome.leaf,
        label: closed.label.clone(),
        updated_at: closed.window.end,
    };
    txn.open_table(LOCATION_ANCHORS)?
        .insert((user.0, key), encode(&anchor)?.as_slice())?;
    txn.commit().map_err(StoreError::from)?;

    if superseded {
        tracing::info!(%user, location = key, leaf = %outcome.leaf, "superseded location simplex");
    }
    Ok(LocationFlush {
        leaf: outcome.leaf,
        inserted: outcome.newly_observed,
        superseded,
    })
}
