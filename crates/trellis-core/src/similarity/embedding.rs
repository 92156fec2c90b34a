//! Feature Vectors
//!
//! The default encoder is a frequency-weighted positional hashing scheme: each
//! token is hashed into a fixed number of buckets, weighted by its frequency and
//! damped by its position, then L2-normalised. It is deterministic and needs no
//! model files. With the `fastembed` feature a local ONNX model can be used
//! through the same trait.

use crate::error::Result;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Dimensions of the hashed embedding
pub const HASHED_EMBEDDING_DIMENSIONS: usize = 128;

/// Maximum text length for embedding (truncated if longer)
pub const MAX_TEXT_LENGTH: usize = 8192;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

// ============================================================================
// PROVIDER TRAIT
// ============================================================================

/// Source of fixed-length feature vectors for node text
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier persisted next to each stored vector
    fn model_name(&self) -> &str;

    /// Length of every vector this provider returns
    fn dimensions(&self) -> usize;

    /// Embed one text; empty text yields a zero vector
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

// ============================================================================
// HASHED POSITIONAL ENCODER
// ============================================================================

/// Deterministic, model-free encoder
#[derive(Debug, Clone)]
pub struct HashedPositionalEmbedder {
    dimensions: usize,
}

impl Default for HashedPositionalEmbedder {
    fn default() -> Self {
        Self::new(HASHED_EMBEDDING_DIMENSIONS)
    }
}

impl HashedPositionalEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

impl EmbeddingProvider for HashedPositionalEmbedder {
    fn model_name(&self) -> &str {
        "hashed-positional-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = truncate(text);
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        let mut vector = vec![0.0_f32; self.dimensions];
        if tokens.is_empty() {
            return Ok(vector);
        }

        let mut frequency: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        for token in &tokens {
            *frequency.entry(token.as_str()).or_default() += 1;
        }

        for (position, token) in tokens.iter().enumerate() {
            let hash = fnv1a(token);
            let bucket = (hash % self.dimensions as u64) as usize;
            // High bit picks the sign so unrelated tokens tend to cancel
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            let tf = frequency.get(token.as_str()).copied().unwrap_or(1) as f32;
            let damping = 1.0 / (1.0 + position as f32 / 32.0);
            vector[bucket] += sign * (1.0 + tf.ln()) * damping;
        }

        Ok(l2_normalize(vector))
    }
}

// ============================================================================
// FASTEMBED PROVIDER
// ============================================================================

#[cfg(feature = "fastembed")]
mod local {
    use std::sync::Mutex;

    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

    use super::{EmbeddingProvider, l2_normalize, truncate};
    use crate::error::{GraphError, Result};

    /// Output dimensions of all-MiniLM-L6-v2
    const MINILM_DIMENSIONS: usize = 384;

    /// Get the default cache directory for fastembed models
    fn cache_dir() -> std::path::PathBuf {
        if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
            return std::path::PathBuf::from(path);
        }
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "trellis", "trellis") {
            return proj_dirs.cache_dir().join("fastembed");
        }
        std::path::PathBuf::from(".fastembed_cache")
    }

    /// Local ONNX sentence embeddings
    pub struct FastEmbedProvider {
        model: Mutex<TextEmbedding>,
    }

    impl FastEmbedProvider {
        /// Load the model, downloading it into the cache on first use
        pub fn new() -> Result<Self> {
            let cache_dir = cache_dir();
            if let Err(e) = std::fs::create_dir_all(&cache_dir) {
                tracing::warn!("Failed to create cache directory {:?}: {}", cache_dir, e);
            }
            let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                .with_show_download_progress(false)
                .with_cache_dir(cache_dir);
            let model = TextEmbedding::try_new(options)
                .map_err(|e| GraphError::Embedding(format!("model initialization failed: {}", e)))?;
            Ok(Self {
                model: Mutex::new(model),
            })
        }
    }

    impl EmbeddingProvider for FastEmbedProvider {
        fn model_name(&self) -> &str {
            "sentence-transformers/all-MiniLM-L6-v2"
        }

        fn dimensions(&self) -> usize {
            MINILM_DIMENSIONS
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let text = truncate(text);
            if text.trim().is_empty() {
                return Ok(vec![0.0; MINILM_DIMENSIONS]);
            }
            let mut model = self
                .model
                .lock()
                .map_err(|_| GraphError::Embedding("Model lock poisoned".into()))?;
            let mut out = model
                .embed(vec![text], None)
                .map_err(|e| GraphError::Embedding(e.to_string()))?;
            let vector = out
                .pop()
                .ok_or_else(|| GraphError::Embedding("No embedding generated".into()))?;
            Ok(l2_normalize(vector))
        }
    }
}

#[cfg(feature = "fastembed")]
pub use local::FastEmbedProvider;

// ============================================================================
// VECTOR HELPERS
// ============================================================================

fn truncate(text: &str) -> &str {
    if text.len() <= MAX_TEXT_LENGTH {
        return text;
    }
    let mut end = MAX_TEXT_LENGTH;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Scale to unit length; zero vectors are returned unchanged
pub fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

/// Cosine similarity over the shared prefix, floored at 0
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a[..len].iter().zip(&b[..len]) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator > 0.0 {
        (dot / denominator).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Little-endian f32 encoding for storage
pub fn embedding_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a stored vector; a trailing partial float is ignored
pub fn embedding_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashed_embedding_is_normalized_and_deterministic() {
        let embedder = HashedPositionalEmbedder::default();
        let a = embedder.embed("Meeting with Sarah about the project").unwrap();
        let b = embedder.embed("Meeting with Sarah about the project").unwrap();
        assert_eq!(a.len(), HASHED_EMBEDDING_DIMENSIONS);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_empty_text_gives_zero_vector() {
        let embedder = HashedPositionalEmbedder::new(16);
        let v = embedder.embed("   ").unwrap();
        assert_eq!(v, vec![0.0; 16]);
    }

    #[test]
    fn test_related_texts_score_higher() {
        let embedder = HashedPositionalEmbedder::default();
        let a = embedder.embed("rust borrow checker lifetimes").unwrap();
        let b = embedder.embed("rust borrow checker errors").unwrap();
        let c = embedder.embed("grocery list bananas").unwrap();
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[test]
    fn test_cosine_floors_negative_and_truncates() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 2.0, 9.0], &[1.0, 2.0]) - 1.0).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_bytes_roundtrip() {
        let v = vec![0.25_f32, -1.5, 3.0];
        assert_eq!(embedding_from_bytes(&embedding_to_bytes(&v)), v);
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let text = "é".repeat(MAX_TEXT_LENGTH);
        let cut = truncate(&text);
        assert!(cut.len() <= MAX_TEXT_LENGTH);
        assert!(text.is_char_boundary(cut.len()));
    }
}
