//! Query predicates for nodes and edges

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EdgeType, NodeType, SourceType};
use crate::error::{Result, check_unit, invalid};

/// Largest page a single query may return
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Check a page size
pub fn validate_limit(limit: usize) -> Result<()> {
    if limit == 0 || limit > MAX_QUERY_LIMIT {
        return invalid(format!("limit must be within 1..={}, got {}", MAX_QUERY_LIMIT, limit));
    }
    Ok(())
}

fn check_range(
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    field: &str,
) -> Result<()> {
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return invalid(format!("{} range is inverted", field));
        }
    }
    Ok(())
}

// ============================================================================
// NODE FILTER
// ============================================================================

/// Sort order for node queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeOrder {
    /// Newest observation first
    #[default]
    TimestampDesc,
    /// Oldest observation first
    TimestampAsc,
    /// Most relevant first
    RelevanceDesc,
    /// Most recently created first
    CreatedDesc,
    /// Highest degree first
    DegreeDesc,
}

impl NodeOrder {
    pub(crate) fn sql(&self) -> &'static str {
        match self {
            NodeOrder::TimestampDesc => "n.timestamp DESC, n.id",
            NodeOrder::TimestampAsc => "n.timestamp ASC, n.id",
            NodeOrder::RelevanceDesc => "n.relevance_score DESC, n.id",
            NodeOrder::CreatedDesc => "n.created_at DESC, n.id",
            NodeOrder::DegreeDesc => "n.degree DESC, n.id",
        }
    }
}

/// Predicates for node queries; empty fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeFilter {
    pub node_types: Vec<NodeType>,
    pub source_types: Vec<SourceType>,
    pub min_relevance: Option<f64>,
    pub max_relevance: Option<f64>,
    pub timestamp_from: Option<DateTime<Utc>>,
    pub timestamp_to: Option<DateTime<Utc>>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    /// Match nodes carrying any of these tags
    pub tags_any: Vec<String>,
    pub community_id: Option<i64>,
    /// Substring match over the serialized payload
    pub content_contains: Option<String>,
    pub include_pruned: bool,
    pub order: NodeOrder,
}

impl NodeFilter {
    /// Filter on a single node type
    pub fn of_type(node_type: NodeType) -> Self {
        Self {
            node_types: vec![node_type],
            ..Default::default()
        }
    }

    /// Reject malformed predicates
    pub fn validate(&self) -> Result<()> {
        if let Some(min) = self.min_relevance {
            check_unit(min, "minRelevance")?;
        }
        if let Some(max) = self.max_relevance {
            check_unit(max, "maxRelevance")?;
        }
        if let (Some(min), Some(max)) = (self.min_relevance, self.max_relevance) {
            if min > max {
                return invalid("minRelevance exceeds maxRelevance");
            }
        }
        check_range(self.timestamp_from, self.timestamp_to, "timestamp")?;
        check_range(self.created_from, self.created_to, "createdAt")?;
        if let Some(needle) = &self.content_contains {
            if needle.is_empty() {
                return invalid("contentContains must not be empty");
            }
        }
        Ok(())
    }
}

// ============================================================================
// EDGE FILTER
// ============================================================================

/// Predicates for edge queries; empty fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EdgeFilter {
    pub edge_types: Vec<EdgeType>,
    pub source_id: Option<String>,
    pub target_id: Option<String>,
    /// Either endpoint equals this id
    pub node_id: Option<String>,
    pub min_strength: Option<f64>,
    pub bidirectional: Option<bool>,
    pub include_inactive: bool,
}

impl EdgeFilter {
    /// Active edges touching a node
    pub fn touching(node_id: impl Into<String>) -> Self {
        Self {
            node_id: Some(node_id.into()),
            ..Default::default()
        }
    }

    /// Reject malformed predicates
    pub fn validate(&self) -> Result<()> {
        if let Some(min) = self.min_strength {
            check_unit(min, "minStrength")?;
        }
        Ok(())
    }
}
