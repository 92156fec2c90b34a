//! Memory Graph facade
//!
//! One entry point over the store and the three engines. Writes go through
//! here so that features, the spatial projection and the query cache stay in
//! step with the rows they derive from.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::decay::{DecayEngine, DecayRunStats, DecayStats};
use crate::error::Result;
use crate::graph::{
    AuditEntry, EdgeFilter, EdgeInput, EdgePatch, GraphEdge, GraphNode, GraphStats, GraphSummary,
    NodeFilter, NodeInput, NodePatch, analytics,
};
use crate::similarity::{
    EmbeddingProvider, HashedPositionalEmbedder, SemanticSweepStats, SimilarNode, SimilarityEngine,
};
use crate::spatial::{SpatialIndex, SpatialQuery, SpatialResult, SpatialStats};
use crate::storage::{BoostOutcome, PruneOutcome, Storage};

/// Outcome of `optimize()`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeReport {
    pub degrees_repaired: usize,
    pub summary: GraphSummary,
    pub communities: usize,
    pub clusters: usize,
    pub patterns: usize,
    pub spatial_entries: usize,
    /// Milliseconds
    pub duration_ms: u64,
}

/// Store counters plus index footprint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub graph: GraphStats,
    pub spatial: SpatialStats,
}

/// Persistent memory graph with decay, spatial retrieval and semantic linking
pub struct MemoryGraph {
    storage: Arc<Storage>,
    decay: DecayEngine,
    spatial: SpatialIndex,
    similarity: SimilarityEngine,
    config: EngineConfig,
}

impl MemoryGraph {
    /// Open (or create) a graph with the built-in hashed encoder
    ///
    /// `None` uses the platform data directory.
    pub fn open(db_path: Option<PathBuf>, config: EngineConfig) -> Result<Self> {
        Self::with_provider(db_path, config, Arc::new(HashedPositionalEmbedder::default()))
    }

    pub fn with_provider(
        db_path: Option<PathBuf>,
        config: EngineConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let storage = Arc::new(Storage::new(db_path)?);
        let decay = DecayEngine::new(storage.clone(), config.decay.clone())?;
        let spatial = SpatialIndex::new(storage.clone(), config.spatial.clone())?;
        let similarity =
            SimilarityEngine::new(storage.clone(), provider, config.similarity.clone())?;

        tracing::info!(
            path = %storage.path().display(),
            model = similarity.provider().model_name(),
            "Memory graph opened"
        );
        Ok(Self {
            storage,
            decay,
            spatial,
            similarity,
            config,
        })
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn decay(&self) -> &DecayEngine {
        &self.decay
    }

    pub fn spatial(&self) -> &SpatialIndex {
        &self.spatial
    }

    pub fn similarity(&self) -> &SimilarityEngine {
        &self.similarity
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // INGESTION
    // ========================================================================

    /// Store a node, extract its features and index it
    ///
    /// Once the row is committed the node is returned even if extraction or
    /// indexing fails; the next semantic sweep and index rebuild catch up.
    pub fn create_node(&self, input: NodeInput) -> Result<GraphNode> {
        let node = self.storage.insert_node(&input)?;
        let node = self.refresh_derived(node, true);
        tracing::debug!(id = %node.id, node_type = %node.node_type, "Node created");
        Ok(node)
    }

    /// Features and projection for a committed node
    fn refresh_derived(&self, node: GraphNode, extract: bool) -> GraphNode {
        let node = if extract {
            match self.similarity.ingest(&node) {
                Ok(stored) => stored,
                Err(e) => {
                    tracing::warn!(id = %node.id, "Feature extraction failed, left for the semantic sweep: {}", e);
                    node
                }
            }
        } else {
            node
        };
        if let Err(e) = self.spatial.index_node(&node) {
            tracing::warn!(id = %node.id, "Spatial indexing failed, left for the next rebuild: {}", e);
        }
        node
    }

    /// Store an edge between two live nodes
    pub fn create_edge(&self, input: EdgeInput) -> Result<GraphEdge> {
        let edge = self.storage.insert_edge(&input)?;
        tracing::debug!(id = %edge.id, edge_type = %edge.edge_type, "Edge created");
        Ok(edge)
    }

    /// Patch a node; content or tag changes refresh its features
    pub fn update_node(&self, id: &str, patch: NodePatch) -> Result<Option<GraphNode>> {
        let Some(node) = self.storage.update_node(id, &patch)? else {
            return Ok(None);
        };
        let extract = patch.content.is_some() || patch.tags.is_some() || patch.metadata.is_some();
        Ok(Some(self.refresh_derived(node, extract)))
    }

    pub fn update_edge(&self, id: &str, patch: EdgePatch) -> Result<Option<GraphEdge>> {
        self.storage.update_edge(id, &patch)
    }

    /// Soft-prune a node and deactivate its outgoing edges
    pub fn prune_node(&self, id: &str) -> Result<Option<PruneOutcome>> {
        let outcome = self.storage.prune_node(id)?;
        if outcome.is_some() {
            self.spatial.remove_node(id)?;
        }
        Ok(outcome)
    }

    // ========================================================================
    // READS
    // ========================================================================

    pub fn get_node(&self, id: &str) -> Result<Option<GraphNode>> {
        self.storage.get_node(id)
    }

    pub fn get_edge(&self, id: &str) -> Result<Option<GraphEdge>> {
        self.storage.get_edge(id)
    }

    pub fn query_nodes(&self, filter: &NodeFilter, limit: usize, offset: usize) -> Result<Vec<GraphNode>> {
        self.storage.query_nodes(filter, limit, offset)
    }

    pub fn query_edges(&self, filter: &EdgeFilter, limit: usize, offset: usize) -> Result<Vec<GraphEdge>> {
        self.storage.query_edges(filter, limit, offset)
    }

    pub fn spatial_query(&self, query: &SpatialQuery) -> Result<SpatialResult> {
        self.spatial.query(query)
    }

    pub fn find_similar_nodes(
        &self,
        node_id: &str,
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<SimilarNode>> {
        self.similarity.find_similar_nodes(node_id, limit, threshold)
    }

    // ========================================================================
    // USE
    // ========================================================================

    /// Record an access: boosts relevance and refreshes the projection
    pub fn access_node(&self, id: &str) -> Result<Option<BoostOutcome>> {
        let outcome = self.decay.boost_node_on_access(id)?;
        if outcome.is_some() {
            if let Some(node) = self.storage.get_node(id)? {
                self.spatial.index_node(&node)?;
            }
        }
        Ok(outcome)
    }

    /// Record an interaction: boosts strength
    pub fn interact_edge(&self, id: &str) -> Result<Option<BoostOutcome>> {
        self.decay.boost_edge_on_interaction(id)
    }

    pub fn create_semantic_edges(&self, node_id: &str, max_connections: usize) -> Result<Vec<GraphEdge>> {
        self.similarity.create_semantic_edges(node_id, max_connections)
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Run a decay sweep, then drop newly pruned nodes from the index
    pub fn apply_decay(&self, force: bool) -> Result<DecayRunStats> {
        let stats = self.decay.apply_decay(force)?;
        if !stats.pruned_node_ids.is_empty() {
            self.spatial.remove_nodes(&stats.pruned_node_ids)?;
        } else if stats.nodes_processed + stats.edges_processed > 0 {
            self.spatial.invalidate_cache()?;
        }
        Ok(stats)
    }

    /// Restore full relevance and strength and reproject every node
    pub fn reset_decay(&self) -> Result<(usize, usize)> {
        let counts = self.decay.reset_decay()?;
        self.spatial.rebuild()?;
        Ok(counts)
    }

    pub fn get_decay_stats(&self) -> Result<DecayStats> {
        self.decay.get_decay_stats()
    }

    pub fn get_decay_history(&self, limit: usize) -> Result<Vec<DecayRunStats>> {
        self.decay.get_decay_history(limit)
    }

    pub fn run_semantic_sweep(&self, force: bool) -> Result<SemanticSweepStats> {
        let stats = self.similarity.run_semantic_sweep(force)?;
        if stats.edges_created + stats.edges_strengthened > 0 {
            self.spatial.invalidate_cache()?;
        }
        Ok(stats)
    }

    /// Ask any running sweep to stop at its next boundary
    pub fn cancel_sweeps(&self) {
        self.decay.cancel();
        self.similarity.cancel();
    }

    /// Repair degrees, recompute structure analytics and rebuild the index
    pub fn optimize(&self) -> Result<OptimizeReport> {
        let start = Instant::now();

        let degrees_repaired = self.storage.repair_degrees()?;
        let topology = self.storage.load_topology()?;
        let report = analytics::analyze(&topology);
        self.storage.apply_analytics(&report)?;
        let spatial_entries = self.spatial.rebuild()?;
        self.storage.optimize_database()?;

        let result = OptimizeReport {
            degrees_repaired,
            communities: report.communities.len(),
            clusters: report.clusters.len(),
            patterns: report.patterns.len(),
            summary: report.summary,
            spatial_entries,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        tracing::info!(
            nodes = result.summary.node_count,
            edges = result.summary.edge_count,
            communities = result.communities,
            clusters = result.clusters,
            patterns = result.patterns,
            degrees_repaired,
            duration_ms = result.duration_ms,
            "Graph optimized"
        );
        Ok(result)
    }

    pub fn stats(&self) -> Result<EngineStats> {
        Ok(EngineStats {
            graph: self.storage.stats()?,
            spatial: self.spatial.stats()?,
        })
    }

    pub fn audit_log(&self, entity_id: Option<&str>, limit: usize) -> Result<Vec<AuditEntry>> {
        self.storage.audit_log(entity_id, limit)
    }
}
