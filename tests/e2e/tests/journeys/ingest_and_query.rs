//! Ingestion and retrieval journeys
//!
//! Nodes go in through the facade and come back out through predicate
//! queries and the spatial-temporal index.

use chrono::{Duration, Utc};
use serde_json::json;
use trellis_core::spatial::epoch_hours;
use trellis_core::{
    EdgeFilter, EdgeType, NodeFilter, NodeOrder, NodePatch, NodeType, Point3, SpatialQuery,
};
use trellis_e2e_tests::harness::TestGraphManager;
use trellis_e2e_tests::mocks::{BatchConfig, TestDataFactory};

// ============================================================================
// PREDICATE QUERIES
// ============================================================================

#[test]
fn test_query_by_type_and_tag() {
    let db = TestGraphManager::new_temp();
    db.seed_diverse(2);
    let tagged = TestDataFactory::create_batch(&BatchConfig {
        count: 3,
        node_type: NodeType::Code,
        tags: vec!["parser".into()],
        ..Default::default()
    });
    for input in tagged {
        db.graph.create_node(input).unwrap();
    }

    let concepts = db.graph.query_nodes(&NodeFilter::of_type(NodeType::Concept), 50, 0).unwrap();
    assert_eq!(concepts.len(), 2);
    assert!(concepts.iter().all(|n| n.node_type == NodeType::Concept));

    let filter = NodeFilter {
        tags_any: vec!["parser".into()],
        ..Default::default()
    };
    let parsers = db.graph.query_nodes(&filter, 50, 0).unwrap();
    assert_eq!(parsers.len(), 3);
    assert!(parsers.iter().all(|n| n.tags.contains(&"parser".to_string())));
}

#[test]
fn test_query_orders_and_pages() {
    let db = TestGraphManager::new_temp();
    for input in TestDataFactory::create_batch(&BatchConfig {
        count: 6,
        spacing_hours: Some(3),
        ..Default::default()
    }) {
        db.graph.create_node(input).unwrap();
    }

    let oldest_first = NodeFilter {
        order: NodeOrder::TimestampAsc,
        ..Default::default()
    };
    let first_page = db.graph.query_nodes(&oldest_first, 3, 0).unwrap();
    let second_page = db.graph.query_nodes(&oldest_first, 3, 3).unwrap();
    assert_eq!(first_page.len(), 3);
    assert_eq!(second_page.len(), 3);
    assert!(first_page[2].timestamp <= second_page[0].timestamp);

    let newest_first = db.graph.query_nodes(&NodeFilter::default(), 1, 0).unwrap();
    assert_eq!(newest_first[0].id, second_page[2].id);
}

#[test]
fn test_content_search() {
    let db = TestGraphManager::new_temp();
    db.graph
        .create_node(TestDataFactory::node("Deploy checklist for the staging cluster"))
        .unwrap();
    db.graph
        .create_node(TestDataFactory::node("Grocery list for the weekend"))
        .unwrap();

    let filter = NodeFilter {
        content_contains: Some("staging".into()),
        ..Default::default()
    };
    let hits = db.graph.query_nodes(&filter, 10, 0).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, json!("Deploy checklist for the staging cluster"));
}

// ============================================================================
// SPATIAL-TEMPORAL QUERIES
// ============================================================================

#[test]
fn test_time_window_query() {
    let db = TestGraphManager::new_temp();
    let scenario = TestDataFactory::create_timeline_scenario(&db.graph);

    let query = SpatialQuery {
        time_from: Some(Utc::now() - Duration::hours(48)),
        time_to: Some(Utc::now()),
        ..Default::default()
    };
    let result = db.graph.spatial_query(&query).unwrap();
    let ids: Vec<&str> = result.results.iter().map(|r| r.node.id.as_str()).collect();

    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&scenario.metadata["h1"].as_str()));
    assert!(ids.contains(&scenario.metadata["h24"].as_str()));
}

#[test]
fn test_results_are_ranked() {
    let db = TestGraphManager::new_temp();
    db.seed_nodes(8);
    let result = db.graph.spatial_query(&SpatialQuery::default()).unwrap();
    assert_eq!(result.results.len(), 8);
    for pair in result.results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn test_sphere_query_finds_nearby_patterns() {
    let db = TestGraphManager::new_temp();
    let near = db
        .graph
        .create_node(TestDataFactory::pattern("Weekly review on Fridays", 3.0, 0.9))
        .unwrap();
    db.graph
        .create_node(TestDataFactory::pattern("Daily standup", 10.0, 0.9))
        .unwrap();

    // Pattern boxes span [t, t + 24h] on the third axis
    let center = Point3::new(3.0, 0.9, epoch_hours(near.timestamp) + 12.0);
    let result = db.graph.spatial_query(&SpatialQuery::around(center, 1.0)).unwrap();

    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].node.id, near.id);
    assert!(result.results[0].distance.unwrap() <= 1.0);
}

#[test]
fn test_repeated_query_hits_cache_until_write() {
    let db = TestGraphManager::new_temp();
    db.seed_nodes(5);
    let query = SpatialQuery::default();

    let first = db.graph.spatial_query(&query).unwrap();
    assert!(!first.from_cache);

    db.graph.create_node(TestDataFactory::node("A fresh observation")).unwrap();
    let after_write = db.graph.spatial_query(&query).unwrap();
    assert!(!after_write.from_cache);
    assert_eq!(after_write.results.len(), 6);
}

#[test]
fn test_update_reprojects_node() {
    let db = TestGraphManager::new_temp();
    let id = db.seed_nodes(1).remove(0);

    db.graph
        .update_node(
            &id,
            NodePatch {
                relevance_score: Some(0.2),
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();

    let query = SpatialQuery {
        min_relevance: Some(0.5),
        ..Default::default()
    };
    assert!(db.graph.spatial_query(&query).unwrap().results.is_empty());
}

// ============================================================================
// USE & PERSISTENCE
// ============================================================================

#[test]
fn test_access_boosts_relevance() {
    let db = TestGraphManager::new_temp();
    let mut input = TestDataFactory::node("Half-remembered fact");
    input.relevance_score = Some(0.5);
    let node = db.graph.create_node(input).unwrap();

    let outcome = db.graph.access_node(&node.id).unwrap().unwrap();
    assert!((outcome.before - 0.5).abs() < 1e-9);
    assert!((outcome.after - 0.6).abs() < 1e-9);

    let reloaded = db.graph.get_node(&node.id).unwrap().unwrap();
    assert_eq!(reloaded.access_count, 1);
    assert!(reloaded.last_accessed.is_some());
    assert_eq!(db.graph.decay().node_boost_history(&node.id).unwrap().len(), 1);
}

#[test]
fn test_graph_survives_reopen() {
    let mut db = TestGraphManager::new_temp();
    let (ids, _) = db.seed_chain(3);

    db.reopen();

    assert_eq!(db.node_count(), 3);
    let middle = db.graph.get_node(&ids[1]).unwrap().unwrap();
    assert_eq!(middle.degree, 2);
    let edges = db
        .graph
        .query_edges(&EdgeFilter::touching(ids[1].clone()), 10, 0)
        .unwrap();
    assert_eq!(edges.len(), 2);
    assert!(edges.iter().all(|e| e.edge_type == EdgeType::Association));

    // The R-tree is rebuilt from persisted projections
    let result = db.graph.spatial_query(&SpatialQuery::default()).unwrap();
    assert_eq!(result.results.len(), 3);
}

#[test]
fn test_audit_trail_records_creation() {
    let db = TestGraphManager::new_temp();
    let (ids, edges) = db.seed_chain(2);

    let node_audit = db.graph.audit_log(Some(ids[0].as_str()), 10).unwrap();
    assert!(node_audit.iter().any(|a| a.action == "create"));
    let edge_audit = db.graph.audit_log(Some(edges[0].id.as_str()), 10).unwrap();
    assert!(edge_audit.iter().any(|a| a.entity_kind == "edge"));
}
