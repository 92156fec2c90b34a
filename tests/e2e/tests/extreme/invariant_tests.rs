//! Invariants under adversarial input
//!
//! Whatever callers throw at the graph, structural counters stay exact,
//! scores stay in range and bounded logs stay bounded.

use serde_json::json;
use trellis_core::decay::{MAX_BOOSTS_PER_ENTITY, MAX_RUN_HISTORY};
use trellis_core::{
    EdgeFilter, EdgeInput, EdgePatch, EdgeType, GraphError, MAX_QUERY_LIMIT, NodeFilter,
    NodeInput, NodePatch, NodeType, Point3, SpatialQuery,
};
use trellis_e2e_tests::harness::TestGraphManager;
use trellis_e2e_tests::mocks::TestDataFactory;

fn is_validation<T: std::fmt::Debug>(result: trellis_core::Result<T>) -> bool {
    matches!(result, Err(GraphError::Validation(_)))
}

// ============================================================================
// STRUCTURE
// ============================================================================

#[test]
fn test_degree_matches_active_edges_after_churn() {
    let db = TestGraphManager::new_temp();
    let ids = db.seed_nodes(8);

    let mut edges = Vec::new();
    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            if (i + j) % 3 == 0 {
                edges.push(db.graph.create_edge(TestDataFactory::edge(&ids[i], &ids[j])).unwrap());
            }
        }
    }
    db.graph.prune_node(&ids[0]).unwrap().unwrap();
    db.graph.prune_node(&ids[3]).unwrap().unwrap();
    // Pruning twice is a no-op
    assert!(db.graph.prune_node(&ids[3]).unwrap().unwrap().already_pruned);

    for id in &ids {
        let node = db.graph.get_node(id).unwrap().unwrap();
        let active = db
            .graph
            .query_edges(&EdgeFilter::touching(id.clone()), MAX_QUERY_LIMIT, 0)
            .unwrap()
            .into_iter()
            .filter(|e| e.is_active)
            .count();
        assert_eq!(node.degree as usize, active, "degree drift on {}", id);
    }

    assert_eq!(db.graph.optimize().unwrap().degrees_repaired, 0);
}

#[test]
fn test_duplicate_edge_rejected_but_variants_allowed() {
    let db = TestGraphManager::new_temp();
    let ids = db.seed_nodes(2);

    db.graph.create_edge(TestDataFactory::edge(&ids[0], &ids[1])).unwrap();
    assert!(is_validation(db.graph.create_edge(TestDataFactory::edge(&ids[0], &ids[1]))));

    // Reverse direction and other types are distinct edges
    db.graph.create_edge(TestDataFactory::edge(&ids[1], &ids[0])).unwrap();
    db.graph
        .create_edge(TestDataFactory::typed_edge(&ids[0], &ids[1], EdgeType::Causal, 0.7))
        .unwrap();
    assert_eq!(db.edge_count(), 3);
}

#[test]
fn test_dangling_and_self_edges_rejected() {
    let db = TestGraphManager::new_temp();
    let ids = db.seed_nodes(1);

    let missing = db.graph.create_edge(TestDataFactory::edge(&ids[0], "no-such-node"));
    assert!(matches!(missing, Err(GraphError::Reference(_))));

    assert!(is_validation(db.graph.create_edge(TestDataFactory::edge(&ids[0], &ids[0]))));
    assert!(is_validation(db.graph.create_edge(TestDataFactory::edge("", &ids[0]))));
    assert_eq!(db.edge_count(), 0);
}

// ============================================================================
// RANGES
// ============================================================================

#[test]
fn test_out_of_range_inputs_rejected() {
    let db = TestGraphManager::new_temp();
    let ids = db.seed_nodes(2);

    for bad in [-0.1, 1.5, f64::NAN, f64::INFINITY] {
        let mut input = NodeInput::new(NodeType::Concept, json!("bad score"));
        input.relevance_score = Some(bad);
        assert!(is_validation(db.graph.create_node(input)), "accepted relevance {}", bad);

        let edge = EdgeInput::new(ids[0].as_str(), ids[1].as_str(), EdgeType::Temporal, "")
            .with_strength(bad);
        assert!(is_validation(db.graph.create_edge(edge)), "accepted strength {}", bad);
    }

    let mut blank_tag = NodeInput::new(NodeType::Concept, json!("tagged"));
    blank_tag.tags = vec!["  ".into()];
    assert!(is_validation(db.graph.create_node(blank_tag)));

    let patch = NodePatch {
        confidence: Some(2.0),
        ..Default::default()
    };
    assert!(is_validation(db.graph.update_node(&ids[0], patch)));

    let edge = db.graph.create_edge(TestDataFactory::edge(&ids[0], &ids[1])).unwrap();
    let patch = EdgePatch {
        probability: Some(-1.0),
        ..Default::default()
    };
    assert!(is_validation(db.graph.update_edge(&edge.id, patch)));
}

#[test]
fn test_scores_stay_in_unit_interval_under_repeated_use() {
    let db = TestGraphManager::new_temp();
    let (ids, edges) = db.seed_chain(3);

    for _ in 0..20 {
        for id in &ids {
            db.graph.access_node(id).unwrap();
        }
        for edge in &edges {
            db.graph.interact_edge(&edge.id).unwrap();
        }
        db.graph.apply_decay(true).unwrap();
    }

    for node in db.all_nodes() {
        assert!((0.0..=1.0).contains(&node.relevance_score));
    }
    for edge in db.graph.query_edges(&EdgeFilter::default(), 100, 0).unwrap() {
        assert!((0.0..=1.0).contains(&edge.strength));
    }
}

#[test]
fn test_query_limits_enforced() {
    let db = TestGraphManager::new_temp();
    assert!(is_validation(db.graph.query_nodes(&NodeFilter::default(), MAX_QUERY_LIMIT + 1, 0)));

    let inverted = NodeFilter {
        min_relevance: Some(0.9),
        max_relevance: Some(0.1),
        ..Default::default()
    };
    assert!(is_validation(db.graph.query_nodes(&inverted, 10, 0)));
    assert!(is_validation(db.graph.find_similar_nodes("any", 10, 1.5)));
}

// ============================================================================
// BOUNDED LOGS
// ============================================================================

#[test]
fn test_run_history_is_bounded() {
    let db = TestGraphManager::new_temp();
    for _ in 0..(MAX_RUN_HISTORY + 5) {
        db.graph.apply_decay(true).unwrap();
    }
    let history = db.graph.get_decay_history(MAX_RUN_HISTORY * 2).unwrap();
    assert_eq!(history.len(), MAX_RUN_HISTORY);
    assert_eq!(db.graph.get_decay_stats().unwrap().totals.runs, (MAX_RUN_HISTORY + 5) as u64);
}

#[test]
fn test_boost_log_is_bounded() {
    let db = TestGraphManager::new_temp();
    let id = db.seed_nodes(1).remove(0);
    for _ in 0..(MAX_BOOSTS_PER_ENTITY + 10) {
        db.graph.access_node(&id).unwrap().unwrap();
    }
    let history = db.graph.decay().node_boost_history(&id).unwrap();
    assert_eq!(history.len(), MAX_BOOSTS_PER_ENTITY);
    assert!(history.iter().all(|b| b.after >= b.before && b.after <= 1.0));
}

// ============================================================================
// SIMILARITY & SPATIAL
// ============================================================================

#[test]
fn test_similarity_is_symmetric() {
    let db = TestGraphManager::new_temp();
    let scenario = TestDataFactory::create_topic_scenario(&db.graph);
    let nodes: Vec<_> = scenario
        .node_ids
        .iter()
        .map(|id| db.graph.get_node(id).unwrap().unwrap())
        .collect();

    for a in &nodes {
        for b in &nodes {
            let ab = db.graph.similarity().similarity_between(a, b).unwrap();
            let ba = db.graph.similarity().similarity_between(b, a).unwrap();
            assert!((ab.total - ba.total).abs() < 1e-9);
            assert!((0.0..=1.0).contains(&ab.total));
        }
    }
}

#[test]
fn test_sphere_results_stay_inside_radius() {
    let db = TestGraphManager::new_temp();
    for i in 0..30 {
        db.graph
            .create_node(TestDataFactory::pattern(
                &format!("Recurring pattern {}", i),
                i as f64 * 0.5,
                0.5 + (i % 5) as f64 * 0.1,
            ))
            .unwrap();
    }
    let anchor = db.all_nodes().remove(0);
    let t = trellis_core::spatial::epoch_hours(anchor.timestamp) + 12.0;

    let query = SpatialQuery {
        limit: 100,
        ..SpatialQuery::around(Point3::new(5.0, 0.7, t), 2.5)
    };
    let result = db.graph.spatial_query(&query).unwrap();
    assert!(!result.results.is_empty());
    for hit in &result.results {
        assert!(hit.distance.unwrap() <= 2.5);
        assert!((0.0..=1.0).contains(&hit.score));
    }
}

#[test]
fn test_malformed_spatial_queries_rejected() {
    let db = TestGraphManager::new_temp();
    let center_only = SpatialQuery {
        center: Some(Point3::new(0.0, 0.0, 0.0)),
        ..Default::default()
    };
    assert!(is_validation(db.graph.spatial_query(&center_only)));

    let radius_only = SpatialQuery {
        radius: Some(1.0),
        ..Default::default()
    };
    assert!(is_validation(db.graph.spatial_query(&radius_only)));

    assert!(is_validation(
        db.graph.spatial_query(&SpatialQuery::around(Point3::new(0.0, 0.0, 0.0), -1.0))
    ));
    assert!(is_validation(
        db.graph.spatial_query(&SpatialQuery::around(Point3::new(f64::NAN, 0.0, 0.0), 1.0))
    ));
}
