//! Test Graph Manager
//!
//! Provides isolated graph instances for testing:
//! - Temporary databases that are automatically cleaned up
//! - Pre-seeded graphs with fixture data
//! - Backdating helpers so decay can be observed without waiting
//! - Reopening the same file to check persistence

use chrono::{Duration, Utc};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use trellis_core::storage::DecayUpdate;
use trellis_core::{EngineConfig, GraphEdge, GraphNode, MemoryGraph, NodeFilter, NodeType};

use crate::mocks::{BatchConfig, TestDataFactory};

/// Manager for test graphs
///
/// Each manager owns its own database file, so tests never interfere.
///
/// # Example
///
/// ```rust,ignore
/// let db = TestGraphManager::new_temp();
/// let ids = db.seed_nodes(10);
/// db.graph.apply_decay(true)?;
/// // Database is deleted when `db` goes out of scope
/// ```
pub struct TestGraphManager {
    /// The graph under test
    pub graph: MemoryGraph,
    /// Temporary directory (kept alive to prevent premature deletion)
    _temp_dir: Option<TempDir>,
    /// Path to the database file
    db_path: PathBuf,
    /// Configuration used to open (and reopen) the graph
    config: EngineConfig,
}

impl TestGraphManager {
    /// Create a graph with default configuration in a temporary directory
    pub fn new_temp() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create a graph with the given configuration in a temporary directory
    pub fn with_config(config: EngineConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test_trellis.db");
        let graph =
            MemoryGraph::open(Some(db_path.clone()), config.clone()).expect("Failed to open test graph");

        Self {
            graph,
            _temp_dir: Some(temp_dir),
            db_path,
            config,
        }
    }

    /// Create a graph at a specific path (not cleaned up)
    pub fn new_at_path(path: PathBuf) -> Self {
        let config = EngineConfig::default();
        let graph =
            MemoryGraph::open(Some(path.clone()), config.clone()).expect("Failed to open test graph");
        Self {
            graph,
            _temp_dir: None,
            db_path: path,
            config,
        }
    }

    /// Get the database path
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Open the same file again with fresh in-memory state
    ///
    /// Run history, boost logs, feature caches and the R-tree are rebuilt
    /// from what was persisted.
    pub fn reopen(&mut self) {
        self.graph = MemoryGraph::open(Some(self.db_path.clone()), self.config.clone())
            .expect("Failed to reopen test graph");
    }

    // ========================================================================
    // COUNTS
    // ========================================================================

    /// Check whether the graph has no live nodes
    pub fn is_empty(&self) -> bool {
        self.node_count() == 0
    }

    /// Number of non-pruned nodes
    pub fn node_count(&self) -> usize {
        self.graph
            .stats()
            .map(|s| s.graph.active_nodes as usize)
            .unwrap_or(0)
    }

    /// Number of active edges
    pub fn edge_count(&self) -> usize {
        self.graph
            .stats()
            .map(|s| s.graph.active_edges as usize)
            .unwrap_or(0)
    }

    /// Every live node, newest first
    pub fn all_nodes(&self) -> Vec<GraphNode> {
        self.graph
            .query_nodes(&NodeFilter::default(), trellis_core::MAX_QUERY_LIMIT, 0)
            .expect("Failed to list nodes")
    }

    // ========================================================================
    // SEEDING
    // ========================================================================

    /// Seed the graph with `count` learning nodes
    pub fn seed_nodes(&self, count: usize) -> Vec<String> {
        let config = BatchConfig {
            count,
            ..Default::default()
        };
        TestDataFactory::create_batch(&config)
            .into_iter()
            .map(|input| {
                self.graph
                    .create_node(input)
                    .expect("Failed to seed node")
                    .id
            })
            .collect()
    }

    /// Seed `per_type` nodes of every node type
    pub fn seed_diverse(&self, per_type: usize) -> Vec<String> {
        let mut ids = Vec::with_capacity(per_type * NodeType::ALL.len());
        for node_type in NodeType::ALL {
            let config = BatchConfig {
                count: per_type,
                node_type,
                content_prefix: format!("{} memory", node_type),
                ..Default::default()
            };
            for input in TestDataFactory::create_batch(&config) {
                ids.push(self.graph.create_node(input).expect("Failed to seed node").id);
            }
        }
        ids
    }

    /// Seed a path `n0 -> n1 -> ... -> n(count-1)` of association edges
    pub fn seed_chain(&self, count: usize) -> (Vec<String>, Vec<GraphEdge>) {
        let ids = self.seed_nodes(count);
        let edges = ids
            .windows(2)
            .map(|pair| {
                self.graph
                    .create_edge(TestDataFactory::edge(&pair[0], &pair[1]))
                    .expect("Failed to seed edge")
            })
            .collect();
        (ids, edges)
    }

    // ========================================================================
    // TIME TRAVEL
    // ========================================================================

    /// Pretend a node was last decayed `hours` ago, keeping its score
    pub fn backdate_node(&self, id: &str, hours: i64) {
        let node = self
            .graph
            .get_node(id)
            .expect("Failed to read node")
            .expect("Node to backdate does not exist");
        self.graph
            .storage()
            .apply_node_decay(
                &[DecayUpdate {
                    id: node.id,
                    score: node.relevance_score,
                    rate: node.decay_factor,
                    prune: false,
                }],
                Utc::now() - Duration::hours(hours),
            )
            .expect("Failed to backdate node");
    }

    /// Pretend an edge was last decayed `hours` ago, keeping its strength
    pub fn backdate_edge(&self, id: &str, hours: i64) {
        let edge = self
            .graph
            .get_edge(id)
            .expect("Failed to read edge")
            .expect("Edge to backdate does not exist");
        self.graph
            .storage()
            .apply_edge_decay(
                &[DecayUpdate {
                    id: edge.id,
                    score: edge.strength,
                    rate: edge.decay_rate,
                    prune: false,
                }],
                Utc::now() - Duration::hours(hours),
            )
            .expect("Failed to backdate edge");
    }

    /// Backdate every live node and active edge
    pub fn backdate_all(&self, hours: i64) {
        for node in self.all_nodes() {
            self.backdate_node(&node.id, hours);
        }
        let edges = self
            .graph
            .query_edges(&Default::default(), trellis_core::MAX_QUERY_LIMIT, 0)
            .expect("Failed to list edges");
        for edge in edges.into_iter().filter(|e| e.is_active) {
            self.backdate_edge(&edge.id, hours);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_graph_starts_empty() {
        let db = TestGraphManager::new_temp();
        assert!(db.is_empty());
        assert!(db.path().exists());
    }

    #[test]
    fn test_seed_nodes() {
        let db = TestGraphManager::new_temp();
        let ids = db.seed_nodes(10);
        assert_eq!(ids.len(), 10);
        assert_eq!(db.node_count(), 10);
    }

    #[test]
    fn test_seed_chain() {
        let db = TestGraphManager::new_temp();
        let (ids, edges) = db.seed_chain(4);
        assert_eq!(ids.len(), 4);
        assert_eq!(edges.len(), 3);
        assert_eq!(db.edge_count(), 3);
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let mut db = TestGraphManager::new_temp();
        db.seed_nodes(3);
        db.reopen();
        assert_eq!(db.node_count(), 3);
    }

    #[test]
    fn test_backdate_keeps_score() {
        let db = TestGraphManager::new_temp();
        let id = db.seed_nodes(1).remove(0);
        let before = db.graph.get_node(&id).unwrap().unwrap();
        db.backdate_node(&id, 48);
        let after = db.graph.get_node(&id).unwrap().unwrap();
        assert_eq!(before.relevance_score, after.relevance_score);

        db.graph.apply_decay(true).unwrap();
        let decayed = db.graph.get_node(&id).unwrap().unwrap();
        assert!(decayed.relevance_score < after.relevance_score);
    }
}
