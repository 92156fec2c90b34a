//! Error types shared by every engine component.

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Graph engine error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Malformed input, filter, query, or configuration
    #[error("Validation error: {0}")]
    Validation(String),
    /// Edge referencing a missing or pruned node
    #[error("Reference error: {0}")]
    Reference(String),
    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// A configured resource ceiling was hit
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
    /// Embedding provider failure
    #[error("Embedding error: {0}")]
    Embedding(String),
    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

impl GraphError {
    /// Short machine-readable kind, used in logs and CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            GraphError::Database(_) => "database",
            GraphError::Validation(_) => "validation",
            GraphError::Reference(_) => "reference",
            GraphError::NotFound(_) => "not_found",
            GraphError::ResourceExhausted(_) => "resource_exhausted",
            GraphError::Embedding(_) => "embedding",
            GraphError::Serialization(_) => "serialization",
            GraphError::Io(_) => "io",
            GraphError::Init(_) => "init",
        }
    }
}

/// Graph result type
pub type Result<T> = std::result::Result<T, GraphError>;

/// Shorthand for a validation failure
pub(crate) fn invalid<T>(msg: impl Into<String>) -> Result<T> {
    Err(GraphError::Validation(msg.into()))
}

/// Check that a score-like value is finite and within [0, 1]
pub(crate) fn check_unit(value: f64, field: &str) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return invalid(format!("{} must be within [0, 1], got {}", field, value));
    }
    Ok(())
}
