//! Graph Module
//!
//! Core record types of the memory graph:
//! - Typed nodes and edges with their input and patch shapes
//! - Query predicates
//! - Structure analytics used by `optimize()`

pub mod analytics;
mod edge;
mod filter;
mod node;

pub use analytics::{
    AnalyticsReport, Community, DetectedPattern, GraphSummary, NodeMetrics, SemanticCluster,
    Topology, TopologyEdge,
};
pub use edge::{EdgeInput, EdgePatch, EdgeType, GraphEdge, SEMANTIC_EDGE_DECAY_RATE};
pub use filter::{EdgeFilter, MAX_QUERY_LIMIT, NodeFilter, NodeOrder, validate_limit};
pub use node::{GraphNode, NodeInput, NodePatch, NodeType, SourceType};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// STATISTICS
// ============================================================================

/// Store-wide counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub total_nodes: i64,
    pub active_nodes: i64,
    pub pruned_nodes: i64,
    pub total_edges: i64,
    pub active_edges: i64,
    pub inactive_edges: i64,
    pub semantic_edges: i64,
    pub average_relevance: f64,
    pub average_strength: f64,
    pub average_degree: f64,
    pub nodes_with_embeddings: i64,
    pub communities: i64,
    pub nodes_by_type: Vec<(String, i64)>,
    pub oldest_node: Option<DateTime<Utc>>,
    pub newest_node: Option<DateTime<Utc>>,
}

/// One row of the structural audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: i64,
    pub entity_id: String,
    pub entity_kind: String,
    pub action: String,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}
