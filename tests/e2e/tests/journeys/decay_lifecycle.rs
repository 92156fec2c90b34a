//! Decay lifecycle journeys
//!
//! Age, use, prune and reset, observed through the public facade. Nodes are
//! backdated rather than waited on.

use trellis_core::{DecayFunction, EngineConfig, GraphError, SpatialQuery, TimeUnit};
use trellis_e2e_tests::harness::TestGraphManager;
use trellis_e2e_tests::mocks::{BatchConfig, TestDataFactory};

fn graph_with(f: impl FnOnce(&mut EngineConfig)) -> TestGraphManager {
    let mut config = EngineConfig::default();
    f(&mut config);
    TestGraphManager::with_config(config)
}

fn relevance(db: &TestGraphManager, id: &str) -> f64 {
    db.graph.get_node(id).unwrap().unwrap().relevance_score
}

// ============================================================================
// CURVES
// ============================================================================

#[test]
fn test_exponential_decay_over_ten_days() {
    let db = graph_with(|c| {
        c.decay.base_rate = 0.1;
        c.decay.time_unit = TimeUnit::Day;
    });
    let id = db.seed_nodes(1).remove(0);
    db.backdate_node(&id, 240);

    let stats = db.graph.apply_decay(true).unwrap();
    assert!(!stats.skipped);
    assert_eq!(stats.nodes_processed, 1);
    assert_eq!(stats.decay_function, DecayFunction::Exponential);

    let expected = (-1.0f64).exp();
    assert!((relevance(&db, &id) - expected).abs() < 0.01);
}

#[test]
fn test_linear_decay_over_ten_days() {
    let db = graph_with(|c| {
        c.decay.decay_function = DecayFunction::Linear;
        c.decay.base_rate = 0.05;
        c.decay.time_unit = TimeUnit::Day;
    });
    let id = db.seed_nodes(1).remove(0);
    db.backdate_node(&id, 240);

    db.graph.apply_decay(true).unwrap();
    assert!((relevance(&db, &id) - 0.5).abs() < 0.01);
}

#[test]
fn test_fresh_nodes_barely_move() {
    let db = TestGraphManager::new_temp();
    let ids = db.seed_nodes(5);
    db.graph.apply_decay(true).unwrap();
    for id in &ids {
        assert!(relevance(&db, id) > 0.99);
    }
}

// ============================================================================
// PRUNING
// ============================================================================

#[test]
fn test_stale_node_is_pruned_and_cascades() {
    let db = TestGraphManager::new_temp();
    let stale = db.graph.create_node(TestDataFactory::node("Forgotten detail")).unwrap();
    let fresh = db.graph.create_node(TestDataFactory::node("Current focus")).unwrap();
    let edge = db.graph.create_edge(TestDataFactory::edge(&stale.id, &fresh.id)).unwrap();
    db.backdate_node(&stale.id, 24 * 100);

    let stats = db.graph.apply_decay(true).unwrap();
    assert_eq!(stats.nodes_pruned, 1);
    assert_eq!(stats.edges_cascaded, 1);

    let stale = db.graph.get_node(&stale.id).unwrap().unwrap();
    assert!(stale.is_pruned);
    assert!(!db.graph.get_edge(&edge.id).unwrap().unwrap().is_active);
    assert_eq!(db.graph.get_node(&fresh.id).unwrap().unwrap().degree, 0);

    let visible = db.graph.spatial_query(&SpatialQuery::default()).unwrap();
    assert_eq!(visible.results.len(), 1);
    assert_eq!(visible.results[0].node.id, fresh.id);

    // Pruned nodes cannot gain new edges
    let err = db
        .graph
        .create_edge(TestDataFactory::edge(&fresh.id, &stale.id))
        .unwrap_err();
    assert!(matches!(err, GraphError::Reference(_)));
}

#[test]
fn test_weak_edge_is_deactivated() {
    let db = TestGraphManager::new_temp();
    let (_, edges) = db.seed_chain(2);
    db.backdate_edge(&edges[0].id, 24 * 100);

    let stats = db.graph.apply_decay(true).unwrap();
    assert_eq!(stats.edges_pruned, 1);
    assert_eq!(stats.nodes_pruned, 0);
    assert!(!db.graph.get_edge(&edges[0].id).unwrap().unwrap().is_active);
}

// ============================================================================
// USE PROTECTS MEMORIES
// ============================================================================

#[test]
fn test_accessed_node_outlives_ignored_node() {
    let db = TestGraphManager::new_temp();
    let ids = db.seed_nodes(2);
    db.backdate_all(240);

    db.graph.access_node(&ids[0]).unwrap().unwrap();
    db.graph.apply_decay(true).unwrap();

    let used = relevance(&db, &ids[0]);
    let ignored = relevance(&db, &ids[1]);
    assert!(used > 0.99, "accessed node decayed to {}", used);
    assert!(ignored < 0.5, "ignored node kept {}", ignored);
}

#[test]
fn test_interaction_boosts_edge() {
    let db = TestGraphManager::new_temp();
    let (_, edges) = db.seed_chain(2);
    let outcome = db.graph.interact_edge(&edges[0].id).unwrap().unwrap();
    assert!(outcome.after > outcome.before);

    let edge = db.graph.get_edge(&edges[0].id).unwrap().unwrap();
    assert_eq!(edge.interaction_count, 1);
    assert_eq!(db.graph.decay().edge_boost_history(&edge.id).unwrap().len(), 1);
}

// ============================================================================
// SCHEDULING & HISTORY
// ============================================================================

#[test]
fn test_interval_gate_and_history() {
    let db = TestGraphManager::new_temp();
    db.seed_nodes(3);

    let first = db.graph.apply_decay(false).unwrap();
    assert!(!first.skipped);
    let second = db.graph.apply_decay(false).unwrap();
    assert!(second.skipped);
    let forced = db.graph.apply_decay(true).unwrap();
    assert!(!forced.skipped && forced.forced);

    let history = db.graph.get_decay_history(10).unwrap();
    assert_eq!(history.len(), 2);

    let stats = db.graph.get_decay_stats().unwrap();
    assert!(stats.last_run.is_some());
    assert!(stats.last_completed_at.is_some());
    assert_eq!(stats.active_nodes, 3);
}

#[test]
fn test_disabled_decay_only_runs_forced() {
    let db = graph_with(|c| c.decay.enabled = false);
    db.seed_nodes(2);
    assert!(db.graph.apply_decay(false).unwrap().skipped);
    assert!(!db.graph.apply_decay(true).unwrap().skipped);
}

#[test]
fn test_capped_run_resumes_across_calls() {
    let db = graph_with(|c| {
        c.decay.batch_size = 2;
        c.decay.max_entities_per_run = 5;
    });
    for input in TestDataFactory::create_batch(&BatchConfig {
        count: 12,
        ..Default::default()
    }) {
        db.graph.create_node(input).unwrap();
    }

    let first = db.graph.apply_decay(true).unwrap();
    assert!(first.truncated);
    assert_eq!(first.nodes_processed, 5);

    // A pending cursor bypasses the interval gate
    let second = db.graph.apply_decay(false).unwrap();
    assert!(second.truncated);
    assert_eq!(second.nodes_processed, 5);

    let third = db.graph.apply_decay(false).unwrap();
    assert!(!third.truncated);
    assert_eq!(third.nodes_processed, 2);

    assert!(db.graph.apply_decay(false).unwrap().skipped);
}

#[test]
fn test_last_run_survives_reopen() {
    let mut db = TestGraphManager::new_temp();
    db.seed_nodes(2);
    db.graph.apply_decay(false).unwrap();

    db.reopen();

    // Run history is in memory, but the interval gate is persisted
    assert!(db.graph.get_decay_history(10).unwrap().is_empty());
    assert!(db.graph.apply_decay(false).unwrap().skipped);
}

// ============================================================================
// RESET
// ============================================================================

#[test]
fn test_reset_restores_scores_but_not_prunes() {
    let db = TestGraphManager::new_temp();
    let ids = db.seed_nodes(3);
    db.backdate_node(&ids[0], 240);
    db.backdate_node(&ids[1], 24 * 100);
    db.graph.apply_decay(true).unwrap();
    assert!(relevance(&db, &ids[0]) < 0.5);

    let (nodes, _) = db.graph.reset_decay().unwrap();
    assert!(nodes >= 2);

    assert!((relevance(&db, &ids[0]) - 1.0).abs() < 1e-9);
    assert!(db.graph.get_node(&ids[1]).unwrap().unwrap().is_pruned);
    assert!(db.graph.get_decay_history(10).unwrap().is_empty());

    // The gate was cleared, so the next unforced sweep runs
    assert!(!db.graph.apply_decay(false).unwrap().skipped);
}
