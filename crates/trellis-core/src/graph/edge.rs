//! Graph Edge - a typed relationship between two nodes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, check_unit, invalid};

/// Decay rate multiplier given to new semantic edges
pub const SEMANTIC_EDGE_DECAY_RATE: f64 = 0.1;

// ============================================================================
// EDGE TYPES
// ============================================================================

/// Types of graph edges
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    /// One thing followed another
    Temporal,
    /// Similar content, synthesized by the similarity engine
    Semantic,
    /// One thing caused another
    Causal,
    /// Co-located in the projected space
    Spatial,
    /// One thing mentions another
    Reference,
    /// One thing requires another
    Dependency,
    /// Generic association
    #[default]
    Association,
}

impl EdgeType {
    /// Every edge type, in declaration order
    pub const ALL: [EdgeType; 7] = [
        EdgeType::Temporal,
        EdgeType::Semantic,
        EdgeType::Causal,
        EdgeType::Spatial,
        EdgeType::Reference,
        EdgeType::Dependency,
        EdgeType::Association,
    ];

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Temporal => "temporal",
            EdgeType::Semantic => "semantic",
            EdgeType::Causal => "causal",
            EdgeType::Spatial => "spatial",
            EdgeType::Reference => "reference",
            EdgeType::Dependency => "dependency",
            EdgeType::Association => "association",
        }
    }

    /// Decay rate multiplier an edge of this type starts with
    pub fn default_decay_rate(&self) -> f64 {
        match self {
            EdgeType::Semantic => SEMANTIC_EDGE_DECAY_RATE,
            _ => 1.0,
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EdgeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        EdgeType::ALL
            .into_iter()
            .find(|t| t.as_str() == lowered)
            .ok_or_else(|| format!("Unknown edge type: {}", s))
    }
}

// ============================================================================
// GRAPH EDGE
// ============================================================================

/// An edge in the memory graph
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Source node ID
    pub source_id: String,
    /// Target node ID
    pub target_id: String,
    /// Edge type
    pub edge_type: EdgeType,
    /// Strength (0.0 - 1.0), aged by decay
    pub strength: f64,
    /// Free-text context describing the relationship
    pub context: String,
    /// When the relationship was observed
    pub timestamp: DateTime<Utc>,
    /// Whether the relationship holds in both directions
    pub bidirectional: bool,
    /// Traversal weight
    pub weight: f64,
    /// Probability the relationship is real (0.0 - 1.0)
    pub probability: f64,
    /// Per-edge decay rate multiplier
    pub decay_rate: f64,
    /// Soft-delete flag (false once pruned)
    pub is_active: bool,
    /// Number of interactions
    pub interaction_count: i64,
    /// When the edge was last interacted with
    pub last_interaction: Option<DateTime<Utc>>,
    /// When the edge was created
    pub created_at: DateTime<Utc>,
    /// When the edge was last modified
    pub updated_at: DateTime<Utc>,
}

impl GraphEdge {
    /// The endpoint opposite `node_id`, if the edge touches it
    pub fn other_end(&self, node_id: &str) -> Option<&str> {
        if self.source_id == node_id {
            Some(&self.target_id)
        } else if self.target_id == node_id {
            Some(&self.source_id)
        } else {
            None
        }
    }
}

// ============================================================================
// INPUT TYPES
// ============================================================================

fn default_strength() -> f64 {
    0.5
}

/// Input for creating a new edge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EdgeInput {
    /// Source node ID
    pub source_id: String,
    /// Target node ID
    pub target_id: String,
    /// Edge type
    pub edge_type: EdgeType,
    /// Free-text context
    #[serde(default)]
    pub context: String,
    /// Strength (defaults to 0.5)
    #[serde(default = "default_strength")]
    pub strength: f64,
    /// Both directions
    #[serde(default)]
    pub bidirectional: bool,
    /// Weight (defaults to strength)
    #[serde(default)]
    pub weight: Option<f64>,
    /// Probability (defaults to 1.0)
    #[serde(default)]
    pub probability: Option<f64>,
    /// Decay rate multiplier (defaults per type)
    #[serde(default)]
    pub decay_rate: Option<f64>,
    /// Observation time (defaults to now)
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl EdgeInput {
    /// Convenience constructor for the common ingestion call
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        edge_type: EdgeType,
        context: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            edge_type,
            context: context.into(),
            strength: default_strength(),
            bidirectional: false,
            weight: None,
            probability: None,
            decay_rate: None,
            timestamp: None,
        }
    }

    /// Builder-style strength override
    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength;
        self
    }

    /// Validate ranges before touching the store
    pub fn validate(&self) -> Result<()> {
        if self.source_id.is_empty() || self.target_id.is_empty() {
            return invalid("sourceId and targetId are required");
        }
        if self.source_id == self.target_id {
            return invalid("self-loops are not allowed");
        }
        check_unit(self.strength, "strength")?;
        if let Some(p) = self.probability {
            check_unit(p, "probability")?;
        }
        if let Some(w) = self.weight {
            if !w.is_finite() || w < 0.0 {
                return invalid(format!("weight must be non-negative, got {}", w));
            }
        }
        if let Some(rate) = self.decay_rate {
            if !rate.is_finite() || rate <= 0.0 {
                return invalid(format!("decayRate must be positive, got {}", rate));
            }
        }
        Ok(())
    }
}

/// Partial update for an edge; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EdgePatch {
    /// Set strength
    pub strength: Option<f64>,
    /// Replace context
    pub context: Option<String>,
    /// Set weight
    pub weight: Option<f64>,
    /// Set probability
    pub probability: Option<f64>,
    /// Set decay multiplier
    pub decay_rate: Option<f64>,
    /// Set direction flag
    pub bidirectional: Option<bool>,
}

impl EdgePatch {
    /// Validate ranges before touching the store
    pub fn validate(&self) -> Result<()> {
        if let Some(s) = self.strength {
            check_unit(s, "strength")?;
        }
        if let Some(p) = self.probability {
            check_unit(p, "probability")?;
        }
        if let Some(w) = self.weight {
            if !w.is_finite() || w < 0.0 {
                return invalid(format!("weight must be non-negative, got {}", w));
            }
        }
        if let Some(rate) = self.decay_rate {
            if !rate.is_finite() || rate <= 0.0 {
                return invalid(format!("decayRate must be positive, got {}", rate));
            }
        }
        Ok(())
    }

    /// True when the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self.strength.is_none()
            && self.context.is_none()
            && self.weight.is_none()
            && self.probability.is_none()
            && self.decay_rate.is_none()
            && self.bidirectional.is_none()
    }
}
