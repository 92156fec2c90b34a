//! Spatial query contract and ranking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::bbox::Point3;
use crate::error::{Result, check_unit, invalid};
use crate::graph::{GraphNode, NodeType, validate_limit};

/// Range query over the projected space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct SpatialQuery {
    /// Center of the search sphere
    pub center: Option<Point3>,
    /// Radius around `center`; required with it
    pub radius: Option<f64>,
    /// Inclusive node timestamp range
    pub time_from: Option<DateTime<Utc>>,
    pub time_to: Option<DateTime<Utc>>,
    pub min_relevance: Option<f64>,
    /// Empty means every type
    pub node_types: Vec<NodeType>,
    pub limit: usize,
}

impl Default for SpatialQuery {
    fn default() -> Self {
        Self {
            center: None,
            radius: None,
            time_from: None,
            time_to: None,
            min_relevance: None,
            node_types: vec![],
            limit: 20,
        }
    }
}

impl SpatialQuery {
    /// Sphere query around a point
    pub fn around(center: Point3, radius: f64) -> Self {
        Self {
            center: Some(center),
            radius: Some(radius),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        match (self.center, self.radius) {
            (None, Some(_)) => return invalid("radius requires a center"),
            (Some(_), None) => return invalid("center requires a radius"),
            (Some(center), Some(radius)) => {
                if !center.is_finite() {
                    return invalid("center coordinates must be finite");
                }
                if !radius.is_finite() || radius <= 0.0 {
                    return invalid(format!("radius must be positive and finite, got {}", radius));
                }
            }
            (None, None) => {}
        }
        if let (Some(from), Some(to)) = (self.time_from, self.time_to) {
            if from > to {
                return invalid("timeFrom is after timeTo");
            }
        }
        if let Some(min) = self.min_relevance {
            check_unit(min, "minRelevance")?;
        }
        validate_limit(self.limit)
    }

    /// Canonical cache key; type order does not matter
    pub fn cache_key(&self) -> String {
        let mut normalized = self.clone();
        normalized.node_types.sort_by_key(|t| t.as_str());
        normalized.node_types.dedup();
        serde_json::to_string(&normalized).unwrap_or_else(|_| format!("{:?}", normalized))
    }

    /// Record-level predicates shared by both candidate paths
    pub(crate) fn accepts(&self, node: &GraphNode) -> bool {
        !node.is_pruned
            && (self.node_types.is_empty() || self.node_types.contains(&node.node_type))
            && self.time_from.is_none_or(|from| node.timestamp >= from)
            && self.time_to.is_none_or(|to| node.timestamp <= to)
            && self.min_relevance.is_none_or(|min| node.relevance_score >= min)
    }
}

// ============================================================================
// RANKING
// ============================================================================

/// Weights of the combined score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreWeights {
    pub proximity: f64,
    pub relevance: f64,
    pub recency: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            proximity: 0.4,
            relevance: 0.4,
            recency: 0.2,
        }
    }
}

/// A ranked query hit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredNode {
    pub node: GraphNode,
    pub score: f64,
    pub proximity: f64,
    pub recency: f64,
    /// Distance from the query center to the node's box center
    pub distance: Option<f64>,
}

/// 1 for just now, 0.5 after a day, falling off hyperbolically
pub fn recency(node: &GraphNode, now: DateTime<Utc>) -> f64 {
    1.0 / (1.0 + node.age_hours(now) / 24.0)
}

/// Combined score; `distance` and `radius` come from a centered query
pub fn score(
    weights: &ScoreWeights,
    node: GraphNode,
    distance: Option<f64>,
    radius: Option<f64>,
    now: DateTime<Utc>,
) -> ScoredNode {
    let proximity = match (distance, radius) {
        (Some(d), Some(r)) if r > 0.0 => (1.0 - d / r).clamp(0.0, 1.0),
        _ => 1.0,
    };
    let recency = recency(&node, now);
    let score = weights.proximity * proximity
        + weights.relevance * node.relevance_score
        + weights.recency * recency;
    ScoredNode {
        node,
        score,
        proximity,
        recency,
        distance,
    }
}

/// Result of one spatial query
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialResult {
    pub results: Vec<ScoredNode>,
    pub from_cache: bool,
    /// Candidates considered before ranking
    pub candidates: usize,
    pub elapsed_ms: f64,
}
