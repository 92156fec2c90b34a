//! Graph Node - a typed observation about user activity
//!
//! Each node carries:
//! - An opaque JSON payload plus key/value metadata
//! - A relevance score that the decay engine ages over time
//! - Derived structure metrics (degree, clustering, centrality, community)
//! - Extracted semantic features (tags, embedding)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, check_unit, invalid};

// ============================================================================
// NODE TYPES
// ============================================================================

/// Types of graph nodes
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Something the user did
    #[default]
    Activity,
    /// A recurring behaviour detected over activities
    Pattern,
    /// A file, document, or other artefact
    Resource,
    /// An abstract idea
    Concept,
    /// A project grouping work
    Project,
    /// A multi-step procedure
    Workflow,
    /// An email message
    Email,
    /// A code fragment
    Code,
    /// A link to something outside the graph
    ExternalReference,
    /// Something the user learned
    Learning,
}

impl NodeType {
    /// Every node type, in declaration order
    pub const ALL: [NodeType; 10] = [
        NodeType::Activity,
        NodeType::Pattern,
        NodeType::Resource,
        NodeType::Concept,
        NodeType::Project,
        NodeType::Workflow,
        NodeType::Email,
        NodeType::Code,
        NodeType::ExternalReference,
        NodeType::Learning,
    ];

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Activity => "activity",
            NodeType::Pattern => "pattern",
            NodeType::Resource => "resource",
            NodeType::Concept => "concept",
            NodeType::Project => "project",
            NodeType::Workflow => "workflow",
            NodeType::Email => "email",
            NodeType::Code => "code",
            NodeType::ExternalReference => "external_reference",
            NodeType::Learning => "learning",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lowered = s.to_lowercase().replace('-', "_");
        NodeType::ALL
            .into_iter()
            .find(|t| t.as_str() == lowered)
            .ok_or_else(|| format!("Unknown node type: {}", s))
    }
}

/// Where an observation came from
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Captured from an event stream
    #[default]
    Event,
    /// Produced by pattern detection
    Pattern,
    /// Entered directly by the user
    User,
    /// Produced by the engine itself
    System,
}

impl SourceType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Event => "event",
            SourceType::Pattern => "pattern",
            SourceType::User => "user",
            SourceType::System => "system",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "event" => Ok(SourceType::Event),
            "pattern" => Ok(SourceType::Pattern),
            "user" => Ok(SourceType::User),
            "system" => Ok(SourceType::System),
            _ => Err(format!("Unknown source type: {}", s)),
        }
    }
}

// ============================================================================
// GRAPH NODE
// ============================================================================

/// A node in the memory graph
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Node type
    pub node_type: NodeType,
    /// When the observed thing happened
    pub timestamp: DateTime<Utc>,
    /// Opaque payload
    pub content: serde_json::Value,
    /// Free-form key/value metadata
    pub metadata: serde_json::Map<String, serde_json::Value>,

    // ========== Relevance ==========
    /// Current relevance (0.0 - 1.0), aged by decay
    pub relevance_score: f64,
    /// Per-node decay rate multiplier (1.0 = base rate)
    pub decay_factor: f64,
    /// Number of accesses
    pub access_count: i64,
    /// When the node was last accessed
    pub last_accessed: Option<DateTime<Utc>>,
    /// Confidence in the observation (0.0 - 1.0)
    pub confidence: f64,

    // ========== Structure ==========
    /// Count of active edges touching this node
    pub degree: i64,
    /// Local clustering coefficient
    pub clustering_coefficient: f64,
    /// PageRank centrality
    pub centrality: f64,
    /// Community assigned by the last optimize pass
    pub community_id: Option<i64>,

    // ========== Features ==========
    /// Tags (user supplied plus extracted topics)
    pub tags: Vec<String>,
    /// Feature vector, empty until extracted
    pub embedding: Vec<f32>,

    // ========== Provenance ==========
    /// Origin of the observation
    pub source_type: SourceType,
    /// Soft-delete flag
    pub is_pruned: bool,
    /// When the node was created
    pub created_at: DateTime<Utc>,
    /// When the node was last modified
    pub updated_at: DateTime<Utc>,
}

impl GraphNode {
    /// Whether a feature vector has been stored for this node
    pub fn has_embedding(&self) -> bool {
        !self.embedding.is_empty()
    }

    /// Read a numeric metadata value
    pub fn metadata_f64(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(|v| v.as_f64())
    }

    /// Age in hours relative to `now`, never negative
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        ((now - self.timestamp).num_milliseconds() as f64 / 3_600_000.0).max(0.0)
    }
}

// ============================================================================
// INPUT TYPES
// ============================================================================

/// Input for creating a new node
///
/// Uses `deny_unknown_fields` so payloads with misspelled keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeInput {
    /// Node type
    pub node_type: NodeType,
    /// Opaque payload
    #[serde(default)]
    pub content: serde_json::Value,
    /// Metadata map
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Origin of the observation
    #[serde(default)]
    pub source_type: SourceType,
    /// Observation time (defaults to now)
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Initial relevance (defaults to 1.0)
    #[serde(default)]
    pub relevance_score: Option<f64>,
    /// Confidence (defaults to 1.0)
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Caller supplied tags
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Default for NodeInput {
    fn default() -> Self {
        Self {
            node_type: NodeType::Activity,
            content: serde_json::Value::Null,
            metadata: serde_json::Map::new(),
            source_type: SourceType::Event,
            timestamp: None,
            relevance_score: None,
            confidence: None,
            tags: vec![],
        }
    }
}

impl NodeInput {
    /// Convenience constructor for the common ingestion call
    pub fn new(node_type: NodeType, content: serde_json::Value) -> Self {
        Self {
            node_type,
            content,
            ..Default::default()
        }
    }

    /// Validate ranges before touching the store
    pub fn validate(&self) -> Result<()> {
        if let Some(score) = self.relevance_score {
            check_unit(score, "relevanceScore")?;
        }
        if let Some(confidence) = self.confidence {
            check_unit(confidence, "confidence")?;
        }
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return invalid("tags must not be blank");
        }
        Ok(())
    }
}

/// Partial update for a node; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodePatch {
    /// Replace the payload
    pub content: Option<serde_json::Value>,
    /// Replace the metadata map
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    /// Replace the tag set
    pub tags: Option<Vec<String>>,
    /// Set relevance
    pub relevance_score: Option<f64>,
    /// Set the decay multiplier
    pub decay_factor: Option<f64>,
    /// Set confidence
    pub confidence: Option<f64>,
}

impl NodePatch {
    /// Validate ranges before touching the store
    pub fn validate(&self) -> Result<()> {
        if let Some(score) = self.relevance_score {
            check_unit(score, "relevanceScore")?;
        }
        if let Some(confidence) = self.confidence {
            check_unit(confidence, "confidence")?;
        }
        if let Some(factor) = self.decay_factor {
            if !factor.is_finite() || factor <= 0.0 {
                return invalid(format!("decayFactor must be positive, got {}", factor));
            }
        }
        Ok(())
    }

    /// True when the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.metadata.is_none()
            && self.tags.is_none()
            && self.relevance_score.is_none()
            && self.decay_factor.is_none()
            && self.confidence.is_none()
    }
}
