//! Open co-occurrence windows.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};

use crate::ids::VertexId;
use crate::metadata::{Metadata, metadata};

/// Metadata key: RFC 3339 start of the window that produced a simplex.
pub const WINDOW_START: &str = "window_start";
/// Metadata key: RFC 3339 timestamp of the last observation in the window.
pub const WINDOW_END: &str = "window_end";
/// Metadata key: configured temporal window length.
pub const WINDOW_MINUTES: &str = "window_minutes";

/// Accumulated vertices for one open window.
///
/// The window is measured from its first observation: a later observation
/// belongs to it while `timestamp - start <= duration`.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub vertices: BTreeSet<VertexId>,
}

impl OpenWindow {
    pub fn open(timestamp: DateTime<Utc>, vertices: impl IntoIterator<Item = VertexId>) -> Self {
        Self {
            start: timestamp,
            end: timestamp,
            vertices: vertices.into_iter().collect(),
        }
    }

    pub fn admits(&self, timestamp: DateTime<Utc>, duration: Duration) -> bool {
        timestamp - self.start <= duration
    }

    pub fn absorb(&mut self, timestamp: DateTime<Utc>, vertices: impl IntoIterator<Item = VertexId>) {
        if timestamp > self.end {
            self.end = timestamp;
        }
        self.vertices.extend(vertices);
    }

    /// Vertex set in canonical path order.
    pub fn path(&self) -> Vec<VertexId> {
        self.vertices.iter().copied().collect()
    }

    /// Window bounds as simplex metadata.
    pub fn bounds_metadata(&self) -> Metadata {
        metadata([
            (WINDOW_START, self.start.to_rfc3339()),
            (WINDOW_END, self.end.to_rfc3339()),
        ])
    }
}
