//! # Trellis Core
//!
//! Persistent memory graph engine. Typed nodes and weighted edges live in
//! SQLite; three engines keep the graph useful as it grows:
//!
//! - **Relevance Decay**: exponential, linear or logarithmic aging with
//!   recency boosts, adaptive per-entity rates and soft pruning
//! - **Spatial-Temporal Index**: nodes projected onto (time, relevance,
//!   semantic) boxes in an in-memory R-tree with ranked range queries and an
//!   LRU result cache
//! - **Semantic Similarity**: keyword, entity, topic, concept and embedding
//!   metrics that synthesize and strengthen semantic edges
//!
//! `optimize()` adds structure analytics on top: clustering coefficients,
//! PageRank centrality, label-propagation communities, semantic clusters and
//! recurring edge patterns.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trellis_core::{EngineConfig, MemoryGraph, NodeInput, NodeType, SpatialQuery};
//! use serde_json::json;
//!
//! let graph = MemoryGraph::open(None, EngineConfig::load(None)?)?;
//!
//! let node = graph.create_node(NodeInput::new(
//!     NodeType::Learning,
//!     json!("Project meeting with Sarah about the roadmap"),
//! ))?;
//! graph.create_semantic_edges(&node.id, 5)?;
//!
//! let recent = graph.spatial_query(&SpatialQuery::default())?;
//! let stats = graph.apply_decay(false)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): bundled SQLite
//! - `encryption`: SQLCipher, keyed by `TRELLIS_ENCRYPTION_KEY`
//! - `fastembed`: local ONNX sentence embeddings

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod decay;
pub mod engine;
pub mod error;
pub mod graph;
pub mod similarity;
pub mod spatial;
pub mod storage;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use config::EngineConfig;
pub use engine::{EngineStats, MemoryGraph, OptimizeReport};
pub use error::{GraphError, Result};

// Records
pub use graph::{
    AuditEntry, EdgeFilter, EdgeInput, EdgePatch, EdgeType, GraphEdge, GraphNode, GraphStats,
    MAX_QUERY_LIMIT, NodeFilter, NodeInput, NodeOrder, NodePatch, NodeType, SourceType,
};

// Decay
pub use decay::{
    DecayConfig, DecayEngine, DecayFunction, DecayRunStats, DecayStats, TimeUnit,
};

// Spatial
pub use spatial::{
    BoundingBox, Point3, ScoreWeights, ScoredNode, SpatialConfig, SpatialIndex, SpatialQuery,
    SpatialResult, SpatialStats,
};

// Similarity
#[cfg(feature = "fastembed")]
pub use similarity::FastEmbedProvider;
pub use similarity::{
    EmbeddingProvider, FeatureBundle, HashedPositionalEmbedder, MetricBreakdown,
    SemanticSweepStats, SimilarNode, SimilarityConfig, SimilarityEngine, SimilarityWeights,
};

// Storage
pub use storage::{BoostOutcome, PruneOutcome, Storage};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default database file name inside the data directory
pub const DEFAULT_DB_FILE: &str = "trellis.db";

/// Default embedding dimensions of the built-in encoder
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = similarity::HASHED_EMBEDDING_DIMENSIONS;
