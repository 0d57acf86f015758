//! Plain-text rendering of a retrieval result, for prompts and the CLI.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::metadata::MetaValue;
use crate::simplex::{Simplex, SimplexKind};
use crate::witness::location::{LOCATION, LOCATION_LABEL};
use crate::witness::window_bounds;

use super::RetrievalResult;

const MAX_PATTERNS: usize = 10;
const MAX_RELATIONSHIPS: usize = 10;
const MAX_GAPS: usize = 5;

impl RetrievalResult {
    /// Render as sectioned text. Empty sections are omitted.
    pub fn render(&self) -> String {
        let mut sections: Vec<String> = Vec::new();

        if !self.matched.is_empty() {
            let mut s = String::from("=== Matched Entities ===");
            for m in &self.matched {
                let _ = write!(s, "\n  - {} (similarity: {:.2})", m.content, m.similarity);
            }
            sections.push(s);
        }

        if !self.cofaces.is_empty() {
            let mut s = String::from("=== Co-occurrence Patterns (Simplices) ===");
            for coface in self.cofaces.iter().take(MAX_PATTERNS) {
                let _ = write!(s, "\n  - [{}] {}", self.context_of(coface), self.set_of(&coface.vertices));
            }
            sections.push(s);
        }

        if !self.edges.is_empty() {
            let mut s = String::from("=== Known Relationships ===");
            for e in self.edges.iter().take(MAX_RELATIONSHIPS) {
                let _ = write!(s, "\n  - ({}) --[{}]--> ({})", self.label(e.tail), e.label, self.label(e.head));
            }
            sections.push(s);
        }

        if !self.gaps.is_empty() {
            let mut s = String::from("=== Knowledge Gaps (Unconfirmed Relationships) ===");
            let mut shown = BTreeSet::new();
            for gap in self.gaps.iter().filter(|g| shown.insert(g.face.clone())).take(MAX_GAPS) {
                let note = if gap.face.len() == 1 {
                    "never observed on its own"
                } else {
                    "never directly observed together"
                };
                let _ = write!(s, "\n  - {} - {note}", self.set_of(&gap.face));
            }
            sections.push(s);
        }

        sections.join("\n\n")
    }

    fn set_of(&self, vertices: &[crate::ids::VertexId]) -> String {
        let names: Vec<String> = vertices.iter().map(|v| self.label(*v)).collect();
        format!("{{{}}}", names.join(", "))
    }

    fn context_of(&self, coface: &Simplex) -> String {
        match &coface.kind {
            Some(SimplexKind::TemporalSession) => match window_bounds(&coface.metadata) {
                Some((start, end)) => format!("from {start} to {end}"),
                None => SimplexKind::TemporalSession.to_string(),
            },
            Some(SimplexKind::Location) => {
                let place = coface
                    .metadata
                    .get(LOCATION_LABEL)
                    .or_else(|| coface.metadata.get(LOCATION))
                    .and_then(MetaValue::as_text)
                    .unwrap_or("?");
                format!("at {place}")
            }
            Some(kind) => kind.to_string(),
            None => "observed".to_string(),
        }
    }
}
