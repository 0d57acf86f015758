//! Witness Complex Builder: turns a stream of timestamped observations into
//! simplex insertions.
//!
//! Entities observed within one temporal window form one simplex of kind
//! [`SimplexKind::TemporalSession`]; entities observed at one location form
//! one simplex of kind [`SimplexKind::Location`]. Only the jointly observed
//! set is inserted, never its faces.
//!
//! Open windows live in an [`IngestionState`] owned by the caller. Nothing in
//! it is persisted: a crash loses at most the windows that were still open.
//! Text batches can keep a [`TextCheckpoint`] so that an interrupted run does
//! not extract the same text twice.

pub mod checkpoint;
pub mod location;
pub mod window;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::collab::{Embedder, Extractor};
use crate::config::WitnessConfig;
use crate::error::SimplicialResult;
use crate::ids::{UserId, VertexId};
use crate::metadata::{self, MetaValue, Metadata};
use crate::simplex::{SimplexKind, SimplexTree};
use crate::store::{Store, VertexStore, canonical_key};

pub use checkpoint::{ResolvedEntry, TextCheckpoint};
pub use location::{LocationPolicy, LocationWindow, normalize_location};
pub use window::OpenWindow;

/// Edge metadata key: RFC 3339 time the relationship was first observed.
pub const CREATED_AT: &str = "created_at";

// ── Input types ─────────────────────────────────────────────────────────

/// One entity mention with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityObservation {
    pub content: String,
    /// Empty when the caller expects it to be filled by an [`Embedder`].
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl EntityObservation {
    pub fn new(content: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            content: content.into(),
            embedding,
        }
    }
}

/// A directed, labelled relationship between two entities of one observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub subject: String,
    #[serde(alias = "predicate")]
    pub label: String,
    pub object: String,
}

/// Entities observed together at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub location: Option<String>,
    pub entities: Vec<EntityObservation>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, entities: Vec<EntityObservation>) -> Self {
        Self {
            timestamp,
            location: None,
            entities,
            relationships: Vec::new(),
        }
    }

    pub fn at_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_relationship(
        mut self,
        subject: impl Into<String>,
        label: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        self.relationships.push(Relationship {
            subject: subject.into(),
            label: label.into(),
            object: object.into(),
        });
        self
    }

    /// Embed every entity that arrived without an embedding.
    pub fn fill_embeddings(&mut self, embedder: &dyn Embedder) -> SimplicialResult<()> {
        for entity in self.entities.iter_mut().filter(|e| e.embedding.is_empty()) {
            entity.embedding = embedder.embed(&entity.content)?;
        }
        Ok(())
    }
}

/// Raw text awaiting extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextObservation {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub location: Option<String>,
    pub text: String,
}

// ── Ingestion state ─────────────────────────────────────────────────────

/// Counters for one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub observations: usize,
    /// Observations with no entities.
    pub observations_skipped: usize,
    pub vertices_resolved: usize,
    pub edges_recorded: usize,
    pub simplices_inserted: usize,
    pub simplices_superseded: usize,
    /// Closed windows with too few distinct vertices to form a simplex.
    pub windows_skipped: usize,
}

impl std::fmt::Display for IngestReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Observations:         {}", self.observations)?;
        writeln!(f, "  skipped (empty):    {}", self.observations_skipped)?;
        writeln!(f, "Vertices resolved:    {}", self.vertices_resolved)?;
        writeln!(f, "Edges recorded:       {}", self.edges_recorded)?;
        writeln!(f, "Simplices inserted:   {}", self.simplices_inserted)?;
        writeln!(f, "Simplices superseded: {}", self.simplices_superseded)?;
        write!(f, "Windows skipped:      {}", self.windows_skipped)
    }
}

#[derive(Debug, Default)]
struct UserWindows {
    temporal: Option<OpenWindow>,
    location: Option<LocationWindow>,
}

/// Open windows of one ingestion run, per user.
#[derive(Debug, Default)]
pub struct IngestionState {
    windows: HashMap<UserId, UserWindows>,
    report: IngestReport,
}

impl IngestionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self) -> &IngestReport {
        &self.report
    }

    /// The open temporal window for `user`, if any.
    pub fn temporal_window(&self, user: UserId) -> Option<&OpenWindow> {
        self.windows.get(&user)?.temporal.as_ref()
    }

    /// The open location window for `user`, if any.
    pub fn location_window(&self, user: UserId) -> Option<&LocationWindow> {
        self.windows.get(&user)?.location.as_ref()
    }

    pub fn has_open_windows(&self) -> bool {
        self.windows
            .values()
            .any(|w| w.temporal.is_some() || w.location.is_some())
    }
}

// ── Builder ─────────────────────────────────────────────────────────────

/// Streams observations into the simplex tree.
#[derive(Debug, Clone)]
pub struct WitnessBuilder {
    store: Store,
    vertices: VertexStore,
    tree: SimplexTree,
    config: WitnessConfig,
}

impl WitnessBuilder {
    pub fn new(store: Store, vertices: VertexStore, tree: SimplexTree, config: WitnessConfig) -> Self {
        Self {
            store,
            vertices,
            tree,
            config,
        }
    }

    pub fn config(&self) -> &WitnessConfig {
        &self.config
    }

    fn window_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.config.window_minutes))
    }

    /// Canonicalize the observation's entities, record its relationships and
    /// fold its vertices into the open windows, flushing any window it closes.
    ///
    /// Returns the resolved vertex ids in entity order.
    pub fn observe(
        &self,
        state: &mut IngestionState,
        user: UserId,
        observation: &Observation,
    ) -> SimplicialResult<Vec<VertexId>> {
        let resolved = self.resolve(&mut state.report, user, observation)?;
        self.fold(
            state,
            user,
            observation.timestamp,
            observation.location.as_deref(),
            &resolved,
        )?;
        Ok(resolved)
    }

    /// Fold an entry whose vertices were resolved by an earlier call.
    pub fn observe_resolved(
        &self,
        state: &mut IngestionState,
        user: UserId,
        entry: &ResolvedEntry,
    ) -> SimplicialResult<()> {
        self.fold(state, user, entry.timestamp, entry.location.as_deref(), &entry.vertices)
    }

    /// Canonicalize the entities and record the relationships of one
    /// observation, without touching any window.
    fn resolve(
        &self,
        report: &mut IngestReport,
        user: UserId,
        observation: &Observation,
    ) -> SimplicialResult<Vec<VertexId>> {
        let seen = observation.timestamp.to_rfc3339();
        let mut resolved = Vec::with_capacity(observation.entities.len());
        let mut by_key: BTreeMap<String, VertexId> = BTreeMap::new();
        for entity in &observation.entities {
            let id = self.vertices.canonicalize(
                user,
                &entity.content,
                &entity.embedding,
                metadata::metadata([
                    (metadata::FIRST_SEEN, seen.as_str()),
                    (metadata::LAST_SEEN, seen.as_str()),
                ]),
            )?;
            by_key.insert(canonical_key(&entity.content), id);
            resolved.push(id);
        }

        for rel in &observation.relationships {
            let tail = by_key.get(&canonical_key(&rel.subject));
            let head = by_key.get(&canonical_key(&rel.object));
            let (Some(&tail), Some(&head)) = (tail, head) else {
                tracing::debug!(%user, subject = %rel.subject, object = %rel.object, "relationship endpoint not in observation");
                continue;
            };
            self.vertices.ensure_edge(
                user,
                tail,
                head,
                &rel.label,
                metadata::metadata([(CREATED_AT, seen.as_str())]),
            )?;
            report.edges_recorded += 1;
        }
        Ok(resolved)
    }

    fn fold(
        &self,
        state: &mut IngestionState,
        user: UserId,
        ts: DateTime<Utc>,
        location: Option<&str>,
        resolved: &[VertexId],
    ) -> SimplicialResult<()> {
        state.report.observations += 1;
        if resolved.is_empty() {
            state.report.observations_skipped += 1;
            tracing::debug!(%user, timestamp = %ts, "observation has no entities, skipped");
            return Ok(());
        }
        state.report.vertices_resolved += resolved.len();

        self.fold_temporal(state, user, ts, resolved)?;
        if let Some(raw) = location {
            match normalize_location(raw) {
                Some(key) => self.fold_location(state, user, ts, key, raw.trim(), resolved)?,
                None => tracing::debug!(%user, "blank location ignored"),
            }
        }
        Ok(())
    }

    fn fold_temporal(
        &self,
        state: &mut IngestionState,
        user: UserId,
        ts: DateTime<Utc>,
        resolved: &[VertexId],
    ) -> SimplicialResult<()> {
        let duration = self.window_duration();
        let slot = &mut state.windows.entry(user).or_default().temporal;
        let closed = match slot {
            Some(open) if open.admits(ts, duration) => {
                open.absorb(ts, resolved.iter().copied());
                None
            }
            other => other.replace(OpenWindow::open(ts, resolved.iter().copied())),
        };
        if let Some(closed) = closed {
            self.flush_temporal(&mut state.report, user, closed)?;
        }
        Ok(())
    }

    fn fold_location(
        &self,
        state: &mut IngestionState,
        user: UserId,
        ts: DateTime<Utc>,
        key: String,
        label: &str,
        resolved: &[VertexId],
    ) -> SimplicialResult<()> {
        let duration = self.window_duration();
        let slot = &mut state.windows.entry(user).or_default().location;
        let closed = match slot {
            Some(open) if open.key == key && open.window.admits(ts, duration) => {
                open.window.absorb(ts, resolved.iter().copied());
                None
            }
            other => other.replace(LocationWindow {
                key,
                label: label.to_owned(),
                window: OpenWindow::open(ts, resolved.iter().copied()),
            }),
        };
        if let Some(closed) = closed {
            self.flush_location(&mut state.report, user, closed)?;
        }
        Ok(())
    }

    fn flush_temporal(
        &self,
        report: &mut IngestReport,
        user: UserId,
        closed: OpenWindow,
    ) -> SimplicialResult<()> {
        if closed.vertices.len() < self.config.min_simplex_vertices {
            report.windows_skipped += 1;
            return Ok(());
        }
        let mut meta = closed.bounds_metadata();
        meta.insert(
            window::WINDOW_MINUTES.to_owned(),
            MetaValue::Int(i64::from(self.config.window_minutes)),
        );
        let outcome =
            self.tree
                .insert_outcome(user, &closed.path(), SimplexKind::TemporalSession, meta)?;
        if outcome.newly_observed {
            report.simplices_inserted += 1;
        }
        tracing::info!(
            %user,
            leaf = %outcome.leaf,
            vertices = closed.vertices.len(),
            start = %closed.start,
            end = %closed.end,
            "flushed temporal window"
        );
        Ok(())
    }

    fn flush_location(
        &self,
        report: &mut IngestReport,
        user: UserId,
        closed: LocationWindow,
    ) -> SimplicialResult<()> {
        if closed.window.vertices.len() < self.config.min_simplex_vertices {
            report.windows_skipped += 1;
            return Ok(());
        }
        let flush = location::record_location_simplex(
            &self.store,
            user,
            &closed,
            self.config.location_policy,
        )?;
        if flush.inserted {
            report.simplices_inserted += 1;
        }
        if flush.superseded {
            report.simplices_superseded += 1;
        }
        tracing::info!(
            %user,
            leaf = %flush.leaf,
            location = %closed.key,
            vertices = closed.window.vertices.len(),
            "flushed location window"
        );
        Ok(())
    }

    /// Flush every open window and return the run's counters.
    pub fn finish(&self, state: &mut IngestionState) -> SimplicialResult<IngestReport> {
        let mut users: Vec<UserId> = state.windows.keys().copied().collect();
        users.sort();
        for user in users {
            let Some(windows) = state.windows.remove(&user) else {
                continue;
            };
            if let Some(closed) = windows.temporal {
                self.flush_temporal(&mut state.report, user, closed)?;
            }
            if let Some(closed) = windows.location {
                self.flush_location(&mut state.report, user, closed)?;
            }
        }
        Ok(std::mem::take(&mut state.report))
    }

    /// Run a whole batch: observations are ordered by timestamp (ties keep
    /// input order), streamed through one state and flushed at the end.
    pub fn ingest(
        &self,
        user: UserId,
        mut observations: Vec<Observation>,
    ) -> SimplicialResult<IngestReport> {
        observations.sort_by_key(|o| o.timestamp);
        let mut state = IngestionState::new();
        for observation in &observations {
            self.observe(&mut state, user, observation)?;
        }
        let report = self.finish(&mut state)?;
        tracing::info!(
            %user,
            observations = report.observations,
            inserted = report.simplices_inserted,
            superseded = report.simplices_superseded,
            "ingestion complete"
        );
        Ok(report)
    }

    /// Extract entities from raw text and observe them.
    pub fn observe_text(
        &self,
        state: &mut IngestionState,
        user: UserId,
        item: &TextObservation,
        extractor: &dyn Extractor,
    ) -> SimplicialResult<Vec<VertexId>> {
        let observation = extract_observation(item, extractor)?;
        self.observe(state, user, &observation)
    }

    /// Batch form of [`observe_text`](Self::observe_text), sleeping the
    /// configured inter-call delay between extraction calls.
    pub fn ingest_text(
        &self,
        user: UserId,
        items: Vec<TextObservation>,
        extractor: &dyn Extractor,
    ) -> SimplicialResult<IngestReport> {
        self.run_text(user, items, extractor, None)
    }

    /// Like [`ingest_text`](Self::ingest_text), keeping extraction progress in
    /// a checkpoint file at `checkpoint`.
    ///
    /// The checkpoint is saved every [`checkpoint::CHECKPOINT_EVERY`]
    /// extracted entries and when extraction fails. With `resume`, entries the
    /// checkpoint already holds are folded from their saved vertices and the
    /// extractor is not called for them. The file is deleted once the batch
    /// completes.
    pub fn ingest_text_resumable(
        &self,
        user: UserId,
        items: Vec<TextObservation>,
        extractor: &dyn Extractor,
        checkpoint: &Path,
        resume: bool,
    ) -> SimplicialResult<IngestReport> {
        let checkpoint = TextCheckpoint::open(checkpoint, items.len(), resume)?;
        self.run_text(user, items, extractor, Some(checkpoint))
    }

    fn run_text(
        &self,
        user: UserId,
        mut items: Vec<TextObservation>,
        extractor: &dyn Extractor,
        mut checkpoint: Option<TextCheckpoint>,
    ) -> SimplicialResult<IngestReport> {
        items.sort_by_key(|i| i.timestamp);
        let delay = StdDuration::from_millis(self.config.inter_call_delay_ms);
        let mut state = IngestionState::new();
        let mut entries = Vec::with_capacity(items.len());
        let mut calls = 0usize;

        for (index, item) in items.iter().enumerate() {
            if let Some(saved) = checkpoint.as_ref().and_then(|c| c.entry(index)) {
                entries.push(saved.clone());
                continue;
            }
            if calls > 0 && !delay.is_zero() {
                std::thread::sleep(delay);
            }
            calls += 1;

            let extracted = extract_observation(item, extractor)
                .and_then(|obs| self.resolve(&mut state.report, user, &obs));
            let vertices = match extracted {
                Ok(vertices) => vertices,
                Err(e) => {
                    if let Some(cp) = checkpoint.as_mut() {
                        match cp.save() {
                            Ok(()) => tracing::warn!(
                                %user,
                                index,
                                path = %cp.path().display(),
                                processed = cp.processed(),
                                "text ingestion interrupted, checkpoint saved"
                            ),
                            Err(save) => {
                                tracing::error!(%user, index, error = %save, "failed to save checkpoint")
                            }
                        }
                    }
                    return Err(e);
                }
            };
            let entry = ResolvedEntry {
                timestamp: item.timestamp,
                location: item.location.clone(),
                vertices,
            };
            if let Some(cp) = checkpoint.as_mut() {
                cp.record(index, entry.clone())?;
            }
            entries.push(entry);
        }
        if let Some(cp) = checkpoint.as_mut() {
            cp.save()?;
        }

        for entry in &entries {
            self.observe_resolved(&mut state, user, entry)?;
        }
        let report = self.finish(&mut state)?;
        if let Some(cp) = checkpoint {
            cp.remove()?;
        }
        tracing::info!(
            %user,
            items = items.len(),
            extracted = calls,
            inserted = report.simplices_inserted,
            superseded = report.simplices_superseded,
            "text ingestion complete"
        );
        Ok(report)
    }
}

/// Run the extractor over one text item.
fn extract_observation(
    item: &TextObservation,
    extractor: &dyn Extractor,
) -> SimplicialResult<Observation> {
    let extraction = extractor.extract(&item.text)?;
    Ok(Observation {
        timestamp: item.timestamp,
        location: item.location.clone(),
        entities: extraction
            .entities
            .into_iter()
            .map(|e| EntityObservation::new(e.content, e.embedding))
            .collect(),
        relationships: extraction.relationships,
    })
}

/// Metadata describing the window a simplex came from, if any.
pub fn window_bounds(meta: &Metadata) -> Option<(&str, &str)> {
    let start = meta.get(window::WINDOW_START)?.as_text()?;
    let end = meta.get(window::WINDOW_END)?.as_text()?;
    Some((start, end))
}
