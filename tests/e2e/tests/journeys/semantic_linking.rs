//! Semantic linking journeys
//!
//! Similar memories find each other, get linked with semantic edges and feed
//! the structure analytics run by `optimize`.

use std::collections::HashSet;

use trellis_core::{EdgeFilter, EdgeType, GraphError, NodeType};
use trellis_e2e_tests::harness::TestGraphManager;
use trellis_e2e_tests::mocks::{TestDataFactory, TestScenario};

fn cluster(scenario: &TestScenario, key: &str) -> HashSet<String> {
    let rust_count: usize = scenario.metadata["rust_count"].parse().unwrap();
    let ids = &scenario.node_ids;
    match key {
        "rust" => ids[..rust_count].iter().cloned().collect(),
        _ => ids[rust_count..].iter().cloned().collect(),
    }
}

// ============================================================================
// FINDING
// ============================================================================

#[test]
fn test_similar_nodes_stay_in_topic() {
    let db = TestGraphManager::new_temp();
    let scenario = TestDataFactory::create_topic_scenario(&db.graph);
    let rust = cluster(&scenario, "rust");
    let first = &scenario.metadata["first_rust"];

    let similar = db.graph.find_similar_nodes(first, 10, 0.0).unwrap();
    assert!(!similar.is_empty());
    assert!(similar.iter().all(|s| &s.node.id != first));
    assert!(rust.contains(&similar[0].node.id));

    let best_rust = similar
        .iter()
        .filter(|s| rust.contains(&s.node.id))
        .map(|s| s.score)
        .fold(0.0, f64::max);
    let best_other = similar
        .iter()
        .filter(|s| !rust.contains(&s.node.id))
        .map(|s| s.score)
        .fold(0.0, f64::max);
    assert!(best_rust > best_other);

    for pair in similar.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn test_threshold_filters_unrelated_nodes() {
    let db = TestGraphManager::new_temp();
    let scenario = TestDataFactory::create_topic_scenario(&db.graph);
    let rust = cluster(&scenario, "rust");

    let similar = db
        .graph
        .find_similar_nodes(&scenario.metadata["first_rust"], 10, 0.3)
        .unwrap();
    assert_eq!(similar.len(), rust.len() - 1);
    assert!(similar.iter().all(|s| rust.contains(&s.node.id)));
    assert!(similar.iter().all(|s| s.breakdown.keyword > 0.0));
}

#[test]
fn test_unknown_node_is_not_found() {
    let db = TestGraphManager::new_temp();
    let err = db.graph.find_similar_nodes("missing", 5, 0.3).unwrap_err();
    assert!(matches!(err, GraphError::NotFound(_)));
}

// ============================================================================
// LINKING
// ============================================================================

#[test]
fn test_semantic_edges_respect_max_and_skip_linked_peers() {
    let db = TestGraphManager::new_temp();
    let scenario = TestDataFactory::create_topic_scenario(&db.graph);
    let rust = cluster(&scenario, "rust");
    let first = &scenario.metadata["first_rust"];

    let edges = db.graph.create_semantic_edges(first, 2).unwrap();
    assert_eq!(edges.len(), 2);
    for edge in &edges {
        assert_eq!(edge.edge_type, EdgeType::Semantic);
        assert!(edge.bidirectional);
        assert!(edge.strength >= 0.3 && edge.strength <= 1.0);
        assert!(rust.contains(edge.other_end(first).unwrap()));
    }

    let rest = db.graph.create_semantic_edges(first, 5).unwrap();
    assert_eq!(rest.len(), 1);
    assert!(db.graph.create_semantic_edges(first, 5).unwrap().is_empty());

    assert_eq!(db.graph.get_node(first).unwrap().unwrap().degree, 3);
}

#[test]
fn test_pruned_node_cannot_be_linked() {
    let db = TestGraphManager::new_temp();
    let scenario = TestDataFactory::create_topic_scenario(&db.graph);
    let first = &scenario.metadata["first_rust"];
    let victim = scenario.node_ids[1].clone();

    db.graph.prune_node(&victim).unwrap().unwrap();

    let similar = db.graph.find_similar_nodes(first, 10, 0.0).unwrap();
    assert!(similar.iter().all(|s| s.node.id != victim));

    let err = db.graph.create_semantic_edges(&victim, 5).unwrap_err();
    assert!(matches!(err, GraphError::Reference(_)));
}

// ============================================================================
// SWEEPS
// ============================================================================

#[test]
fn test_sweep_links_within_clusters_only() {
    let db = TestGraphManager::new_temp();
    let scenario = TestDataFactory::create_topic_scenario(&db.graph);
    let rust = cluster(&scenario, "rust");
    let cooking = cluster(&scenario, "cooking");

    let stats = db.graph.run_semantic_sweep(true).unwrap();
    assert!(!stats.skipped);
    assert_eq!(stats.nodes_scanned, scenario.node_ids.len());
    assert!(stats.edges_created > 0);

    let filter = EdgeFilter {
        edge_types: vec![EdgeType::Semantic],
        ..Default::default()
    };
    let edges = db.graph.query_edges(&filter, 100, 0).unwrap();
    assert_eq!(edges.len(), stats.edges_created);
    for edge in &edges {
        let same_cluster = (rust.contains(&edge.source_id) && rust.contains(&edge.target_id))
            || (cooking.contains(&edge.source_id) && cooking.contains(&edge.target_id));
        assert!(same_cluster, "edge {} crosses clusters", edge.id);
    }

    // Within the interval nothing runs unless forced
    assert!(db.graph.run_semantic_sweep(false).unwrap().skipped);
}

#[test]
fn test_sweep_only_scans_changed_nodes() {
    let db = TestGraphManager::new_temp();
    TestDataFactory::create_topic_scenario(&db.graph);
    db.graph.run_semantic_sweep(true).unwrap();

    db.graph
        .create_node(TestDataFactory::node("Sourdough bread needs a long cold proof in winter"))
        .unwrap();
    let stats = db.graph.run_semantic_sweep(true).unwrap();
    assert_eq!(stats.nodes_scanned, 1);
    assert!(stats.edges_created >= 1);
}

// ============================================================================
// STRUCTURE
// ============================================================================

#[test]
fn test_optimize_reports_structure() {
    let db = TestGraphManager::new_temp();
    TestDataFactory::create_topic_scenario(&db.graph);
    db.graph.run_semantic_sweep(true).unwrap();
    let hub = TestDataFactory::create_hub_scenario(&db.graph, 4);

    let report = db.graph.optimize().unwrap();
    assert_eq!(report.degrees_repaired, 0);
    assert_eq!(report.summary.node_count, db.node_count());
    assert!(report.communities >= 1);
    assert_eq!(report.spatial_entries, db.node_count());

    let hub = db.graph.get_node(&hub.metadata["hub"]).unwrap().unwrap();
    assert_eq!(hub.node_type, NodeType::Project);
    assert_eq!(hub.degree, 4);
    assert!(hub.community_id.is_some());
}
