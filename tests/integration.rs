//! End-to-end tests for simplicial memory.
//!
//! These exercise the simplex tree, the witness builder and retrieval
//! together through the public engine API.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, TimeZone, Utc};

use simplicial_memory::collab::{Embedder, HashingEmbedder};
use simplicial_memory::config::MemoryConfig;
use simplicial_memory::error::{SimplicialError, StoreError};
use simplicial_memory::engine::Engine;
use simplicial_memory::ids::{UserId, VertexId, vertex_ids};
use simplicial_memory::metadata::Metadata;
use simplicial_memory::simplex::{SimplexKind, facets_of, theoretical_faces_of};
use simplicial_memory::store::{Store, VertexStore};
use simplicial_memory::witness::{EntityObservation, Observation};

const U: UserId = UserId(1);

fn test_engine() -> Engine {
    Engine::new(MemoryConfig::default()).unwrap()
}

/// Engine whose user owns vertices with ids 1 to 12, for tests that address
/// simplices by raw id.
fn seeded_engine() -> Engine {
    let engine = test_engine();
    for i in 1..=12u64 {
        let id = engine
            .vertices()
            .canonicalize(U, &format!("v{i}"), &[], Metadata::new())
            .unwrap();
        assert_eq!(id.get(), i);
    }
    engine
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn observation(at: DateTime<Utc>, names: &[&str], embedder: &HashingEmbedder) -> Observation {
    let mut obs = Observation::new(
        at,
        names
            .iter()
            .map(|n| EntityObservation::new(*n, Vec::new()))
            .collect(),
    );
    obs.fill_embeddings(embedder).unwrap();
    obs
}

fn insert(engine: &Engine, raw: &[u64]) {
    engine
        .tree()
        .insert(U, &vertex_ids(raw), SimplexKind::TemporalSession, Metadata::new())
        .unwrap();
}

#[test]
fn reinsertion_is_idempotent() {
    let engine = seeded_engine();
    let path = vertex_ids(&[1, 2, 3]);
    let first = engine
        .tree()
        .insert(U, &path, SimplexKind::TemporalSession, Metadata::new())
        .unwrap();
    let nodes = engine.tree().node_count(U).unwrap();

    let again = engine
        .tree()
        .insert(U, &path, SimplexKind::Location, Metadata::new())
        .unwrap();
    assert_eq!(first, again);
    assert_eq!(engine.tree().node_count(U).unwrap(), nodes);
    assert_eq!(engine.tree().simplex_count(U).unwrap(), 1);
}

#[test]
fn implied_faces_are_not_materialized() {
    let engine = seeded_engine();
    insert(&engine, &[1, 2, 3]);

    // Only the three path nodes exist; no face besides the simplex is stored.
    assert_eq!(engine.tree().node_count(U).unwrap(), 3);
    assert!(engine.tree().contains(U, &vertex_ids(&[1, 2, 3])).unwrap());
    for face in theoretical_faces_of(&vertex_ids(&[1, 2, 3])).unwrap() {
        if face.len() < 3 {
            assert!(!engine.tree().contains(U, &face).unwrap(), "{face:?}");
        }
    }
}

#[test]
fn membership_and_gaps_of_one_triangle() {
    let engine = seeded_engine();
    insert(&engine, &[1, 2, 3]);

    assert!(!engine.tree().contains(U, &vertex_ids(&[1, 2])).unwrap());
    let cofaces = engine
        .tree()
        .cofaces_containing(U, VertexId::new(2).unwrap(), 1)
        .unwrap();
    assert_eq!(cofaces.len(), 1);
    assert_eq!(cofaces[0].vertices, vertex_ids(&[1, 2, 3]));

    let gaps = simplicial_memory::retrieval::detect_gaps(
        engine.tree(),
        U,
        &cofaces,
        simplicial_memory::retrieval::GapBounds {
            min_face_vertices: 1,
            max_coface_vertices: 12,
        },
    )
    .unwrap();
    let faces: BTreeSet<Vec<VertexId>> = gaps.into_iter().map(|g| g.face).collect();
    let expected_gaps: [&[u64]; 3] = [&[1, 2], &[1, 3], &[2]];
    for expected in expected_gaps {
        assert!(faces.contains(&vertex_ids(expected)), "{expected:?}");
    }
    let four = VertexId::new(4).unwrap();
    assert!(faces.iter().all(|f| !f.contains(&four)));
}

#[test]
fn inserting_a_prefix_marks_the_existing_node() {
    let engine = seeded_engine();
    insert(&engine, &[1, 2, 3]);
    assert_eq!(engine.tree().node_count(U).unwrap(), 3);

    let outcome = engine
        .tree()
        .insert_outcome(
            U,
            &vertex_ids(&[1, 2]),
            SimplexKind::TemporalSession,
            Metadata::new(),
        )
        .unwrap();
    assert_eq!(outcome.created, 0);
    assert!(outcome.newly_observed);
    assert_eq!(engine.tree().node_count(U).unwrap(), 3);
    assert!(engine.tree().contains(U, &vertex_ids(&[1, 2])).unwrap());
    assert_eq!(engine.tree().simplex_count(U).unwrap(), 2);
}

#[test]
fn facets_and_cofaces_agree() {
    let engine = seeded_engine();
    let top = vertex_ids(&[2, 5, 7, 9]);
    engine
        .tree()
        .insert(U, &top, SimplexKind::TemporalSession, Metadata::new())
        .unwrap();

    let facets = facets_of(&top);
    assert_eq!(facets.len(), 4);
    for facet in &facets {
        let cofaces = engine
            .tree()
            .cofaces_of(U, facet, Default::default())
            .unwrap();
        assert!(cofaces.iter().any(|c| c.vertices == top), "{facet:?}");
    }
}

#[test]
fn every_face_round_trips_through_the_tree() {
    let engine = seeded_engine();
    let path = vertex_ids(&[1, 3, 4, 8, 11]);
    let faces = theoretical_faces_of(&path).unwrap();
    assert_eq!(faces.len(), (1 << path.len()) - 1);

    for face in &faces {
        engine
            .tree()
            .insert(U, face, SimplexKind::TemporalSession, Metadata::new())
            .unwrap();
    }
    for face in &faces {
        assert!(engine.tree().contains(U, face).unwrap(), "{face:?}");
    }
    assert_eq!(engine.tree().simplex_count(U).unwrap(), faces.len());
}

#[test]
fn users_do_not_see_each_other() {
    let engine = seeded_engine();
    insert(&engine, &[1, 2]);
    assert!(!engine.tree().contains(UserId(2), &vertex_ids(&[1, 2])).unwrap());
    assert!(
        engine
            .tree()
            .cofaces_containing(UserId(2), VertexId::new(1).unwrap(), 1)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn concurrent_canonicalize_yields_one_vertex() {
    let vertices = VertexStore::new(Store::in_memory().unwrap(), None);

    let ids: Vec<VertexId> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let vertices = vertices.clone();
                s.spawn(move || {
                    vertices
                        .canonicalize(U, "Jodhpur", &[1.0, 0.0], Metadata::new())
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(vertices.vertices(U).unwrap().len(), 1);
}

#[test]
fn observations_to_gaps_end_to_end() {
    let engine = test_engine();
    let embedder = HashingEmbedder::default();
    let start = t0();

    let observations = vec![
        observation(start, &["Jodhpur", "restaurants"], &embedder).at_location("Jodhpur"),
        observation(start + Duration::minutes(10), &["Indana Palace"], &embedder),
        observation(start + Duration::hours(3), &["Marais", "bakery"], &embedder)
            .at_location("Paris"),
    ];
    let report = engine.ingest(U, observations).unwrap();
    assert_eq!(report.observations, 3);
    assert_eq!(report.windows_skipped, 0);
    // The Paris location window repeats the second temporal session.
    assert_eq!(report.simplices_inserted, 3);

    let vs = engine.vertices();
    let jodhpur = vs.lookup_vertex(U, "jodhpur").unwrap().unwrap();
    let restaurants = vs.lookup_vertex(U, "Restaurants").unwrap().unwrap();
    let palace = vs.lookup_vertex(U, "Indana Palace").unwrap().unwrap();
    let marais = vs.lookup_vertex(U, "Marais").unwrap().unwrap();

    let info = engine.info(U).unwrap();
    assert_eq!(info.vertex_count, 5);
    assert_eq!(info.simplex_count, 3);
    assert_eq!(info.node_count, 5);

    let result = engine
        .query_text(U, "Jodhpur", &embedder, 10, 0.5)
        .unwrap();
    assert_eq!(result.matched.len(), 1);
    assert_eq!(result.matched[0].vertex, jodhpur);

    let paths: Vec<Vec<VertexId>> = result.cofaces.iter().map(|c| c.vertices.clone()).collect();
    let mut session = vec![jodhpur, restaurants, palace];
    session.sort();
    let mut visit = vec![jodhpur, restaurants];
    visit.sort();
    assert_eq!(paths.len(), 2);
    assert!(paths.contains(&session));
    assert!(paths.contains(&visit));

    let at_location = result
        .cofaces
        .iter()
        .find(|c| c.vertices == visit)
        .unwrap();
    assert_eq!(at_location.kind, Some(SimplexKind::Location));

    // Paris was never observed with Jodhpur, so no gap pairs them.
    assert!(result.gaps.iter().all(|g| !g.face.contains(&marais)));
    // The visit was observed on its own, so it is no gap inside the session.
    assert!(result.gaps.iter().all(|g| g.face != visit));
    assert!(
        result
            .gaps
            .iter()
            .any(|g| g.face.len() == 2 && g.face.contains(&palace))
    );

    let text = result.render();
    assert!(text.contains("=== Matched Entities ==="));
    assert!(text.contains("at Jodhpur"));
    assert!(text.contains("=== Knowledge Gaps (Unconfirmed Relationships) ==="));
    assert!(!text.contains("Marais"));
}

#[test]
fn relationships_are_returned_with_their_context() {
    let engine = test_engine();
    let embedder = HashingEmbedder::default();

    let obs = observation(t0(), &["Indana Palace", "Jodhpur"], &embedder).with_relationship(
        "Indana Palace",
        "located_in",
        "Jodhpur",
    );
    engine.ingest(U, vec![obs]).unwrap();

    let query = embedder.embed("jodhpur").unwrap();
    let result = engine.query(U, &query).unwrap();
    assert_eq!(result.edges.len(), 1);
    assert_eq!(result.edges[0].label, "located_in");
    assert!(
        result
            .render()
            .contains("(Indana Palace) --[located_in]--> (Jodhpur)")
    );
}

#[test]
fn delete_with_cofaces_clears_the_subtree() {
    let engine = seeded_engine();
    insert(&engine, &[1, 2]);
    insert(&engine, &[1, 2, 3]);
    insert(&engine, &[1, 2, 4]);
    insert(&engine, &[5]);

    let removed = engine
        .tree()
        .delete_with_cofaces(U, &vertex_ids(&[1, 2]))
        .unwrap();
    assert_eq!(removed, 3);
    assert_eq!(engine.tree().simplex_count(U).unwrap(), 1);
    assert_eq!(engine.tree().node_count(U).unwrap(), 1);
}

#[test]
fn simplices_only_reference_the_users_own_vertices() {
    let engine = seeded_engine();
    let err = engine
        .tree()
        .insert(UserId(2), &vertex_ids(&[1, 2]), SimplexKind::TemporalSession, Metadata::new())
        .unwrap_err();
    assert!(matches!(
        err,
        SimplicialError::Store(StoreError::NotFound { what: "vertex", .. })
    ));
    let err = engine
        .tree()
        .insert(U, &vertex_ids(&[3, 40]), SimplexKind::TemporalSession, Metadata::new())
        .unwrap_err();
    assert!(matches!(
        err,
        SimplicialError::Store(StoreError::NotFound { what: "vertex", id: 40 })
    ));
    assert_eq!(engine.tree().node_count(UserId(2)).unwrap(), 0);
    assert_eq!(engine.tree().node_count(U).unwrap(), 0);
}

#[test]
fn location_supersession_keeps_jointly_observed_simplices() {
    let engine = test_engine();
    let embedder = HashingEmbedder::default();
    let start = t0();
    let report = engine
        .ingest(
            U,
            vec![
                observation(start, &["a", "b"], &embedder).at_location("Paris"),
                observation(start + Duration::minutes(1), &["a", "b"], &embedder)
                    .at_location("Rome"),
                observation(start + Duration::minutes(40), &["x", "y"], &embedder)
                    .at_location("Paris"),
            ],
        )
        .unwrap();
    assert_eq!(report.simplices_superseded, 1);

    let vs = engine.vertices();
    let id = |name: &str| vs.lookup_vertex(U, name).unwrap().unwrap();
    let pair = vec![id("a"), id("b")];
    assert!(engine.tree().contains(U, &pair).unwrap());

    // The pair was observed directly, so retrieval must not call it a gap.
    let result = engine.query_text(U, "a", &embedder, 10, 0.5).unwrap();
    assert!(result.gaps.iter().all(|g| g.face != pair));

    let located: Vec<_> = engine
        .tree()
        .all_simplices(U)
        .unwrap()
        .into_iter()
        .filter(|s| s.observed_as(&SimplexKind::Location))
        .map(|s| s.vertices)
        .collect();
    let mut merged = vec![id("a"), id("b"), id("x"), id("y")];
    merged.sort();
    assert_eq!(located, vec![pair, merged]);
}
