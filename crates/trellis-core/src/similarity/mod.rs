//! Semantic Similarity Module
//!
//! - Feature extraction (keywords, entities, concepts, sentiment, topics)
//! - Pluggable embedding providers
//! - Five-metric weighted similarity
//! - Semantic edge synthesis and a gated linking sweep

mod embedding;
mod engine;
mod features;
mod metrics;

#[cfg(feature = "fastembed")]
pub use embedding::FastEmbedProvider;
pub use embedding::{
    EmbeddingProvider, HASHED_EMBEDDING_DIMENSIONS, HashedPositionalEmbedder, MAX_TEXT_LENGTH,
    cosine_similarity, embedding_from_bytes, embedding_to_bytes, l2_normalize,
};
pub use engine::{SemanticSweepStats, SimilarNode, SimilarityConfig, SimilarityEngine};
pub use features::{
    DEFAULT_TOP_KEYWORDS, FeatureBundle, FeatureExtractor, content_text, detect_language,
    sentiment, stem,
};
pub use metrics::{
    CONCEPT_MATCH_THRESHOLD, MetricBreakdown, SimilarityWeights, concept_similarity,
    edit_similarity, jaccard, levenshtein, similarity,
};
