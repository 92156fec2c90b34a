//! Concurrency tests
//!
//! Sweeps are single-flight; writers and readers share one graph across
//! threads without losing rows or surfacing lock errors.

use std::sync::Arc;
use std::thread;

use trellis_core::{EdgeType, MemoryGraph, NodeFilter, SpatialQuery};
use trellis_e2e_tests::harness::TestGraphManager;
use trellis_e2e_tests::mocks::{BatchConfig, TestDataFactory};

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn test_graph_is_shareable() {
    assert_send_sync::<MemoryGraph>();
}

#[test]
fn test_parallel_writers_lose_nothing() {
    let db = TestGraphManager::new_temp();

    thread::scope(|s| {
        for worker in 0..4 {
            let graph = &db.graph;
            s.spawn(move || {
                let config = BatchConfig {
                    count: 25,
                    content_prefix: format!("Worker {} note", worker),
                    ..Default::default()
                };
                for input in TestDataFactory::create_batch(&config) {
                    graph.create_node(input).unwrap();
                }
            });
        }
    });

    assert_eq!(db.node_count(), 100);
}

#[test]
fn test_parallel_edge_inserts_keep_degrees_exact() {
    let db = TestGraphManager::new_temp();
    let hub = db.graph.create_node(TestDataFactory::node("Shared hub")).unwrap();
    let leaves = db.seed_nodes(40);

    thread::scope(|s| {
        for chunk in leaves.chunks(10) {
            let graph = &db.graph;
            let hub = &hub.id;
            s.spawn(move || {
                for leaf in chunk {
                    graph
                        .create_edge(TestDataFactory::typed_edge(hub, leaf, EdgeType::Reference, 0.6))
                        .unwrap();
                }
            });
        }
    });

    let hub = db.graph.get_node(&hub.id).unwrap().unwrap();
    assert_eq!(hub.degree, 40);
}

#[test]
fn test_concurrent_decay_is_single_flight() {
    let db = TestGraphManager::new_temp();
    db.seed_nodes(200);

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let graph = &db.graph;
                s.spawn(move || graph.apply_decay(true).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let ran: Vec<_> = results.iter().filter(|r| !r.skipped).collect();
    assert!(!ran.is_empty());
    assert!(ran.iter().all(|r| r.nodes_processed == 200));
    assert_eq!(db.graph.get_decay_history(10).unwrap().len(), ran.len());
    assert!(!db.graph.decay().is_running());
}

#[test]
fn test_reads_during_sweeps() {
    let db = TestGraphManager::new_temp();
    TestDataFactory::create_topic_scenario(&db.graph);
    db.seed_nodes(100);

    thread::scope(|s| {
        let graph = &db.graph;
        s.spawn(move || {
            for _ in 0..5 {
                graph.apply_decay(true).unwrap();
            }
        });
        s.spawn(move || {
            graph.run_semantic_sweep(true).unwrap();
        });
        for _ in 0..2 {
            s.spawn(move || {
                for _ in 0..20 {
                    let hits = graph.spatial_query(&SpatialQuery::default()).unwrap();
                    assert!(hits.results.len() <= 20);
                    let nodes = graph.query_nodes(&NodeFilter::default(), 50, 0).unwrap();
                    assert!(!nodes.is_empty());
                }
            });
        }
    });

    let stats = db.graph.stats().unwrap();
    assert_eq!(stats.graph.active_nodes, 107);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scheduled_sweeps_on_blocking_pool() {
    let db = TestGraphManager::new_temp();
    TestDataFactory::create_topic_scenario(&db.graph);
    db.seed_nodes(50);
    let path = db.path().to_path_buf();
    let graph = Arc::new(MemoryGraph::open(Some(path), Default::default()).unwrap());

    let decay = {
        let graph = Arc::clone(&graph);
        tokio::task::spawn_blocking(move || graph.apply_decay(true))
    };
    let semantic = {
        let graph = Arc::clone(&graph);
        tokio::task::spawn_blocking(move || graph.run_semantic_sweep(true))
    };

    let decay = decay.await.unwrap().unwrap();
    let semantic = semantic.await.unwrap().unwrap();
    assert_eq!(decay.nodes_processed, 57);
    assert_eq!(semantic.nodes_scanned, 57);

    graph.cancel_sweeps();
    assert!(!graph.decay().is_running());
    assert!(!graph.similarity().is_running());
}
