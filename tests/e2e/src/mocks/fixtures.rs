//! Test Data Factory
//!
//! Provides utilities for generating realistic test data:
//! - Node and edge inputs with various properties
//! - Batch generation for stress testing
//! - Pre-built scenarios for common test cases

use chrono::{Duration, Utc};
use serde_json::json;
use std::collections::HashMap;
use trellis_core::{EdgeInput, EdgeType, MemoryGraph, NodeInput, NodeType, SourceType};

/// Factory for creating test data
///
/// Input constructors are pure; scenario creators write into a graph.
///
/// # Example
///
/// ```rust,ignore
/// let input = TestDataFactory::node("Rust ownership and borrowing");
/// let batch = TestDataFactory::create_batch(&BatchConfig { count: 100, ..Default::default() });
/// let scenario = TestDataFactory::create_topic_scenario(&graph);
/// ```
pub struct TestDataFactory;

/// Configuration for batch node generation
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Number of nodes to create
    pub count: usize,
    /// Node type for every node
    pub node_type: NodeType,
    /// Base content prefix
    pub content_prefix: String,
    /// Tags to apply
    pub tags: Vec<String>,
    /// Spread observation times this many hours apart, newest first
    pub spacing_hours: Option<i64>,
    /// Initial relevance for every node
    pub relevance: Option<f64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            count: 10,
            node_type: NodeType::Learning,
            content_prefix: "Test memory".to_string(),
            tags: vec![],
            spacing_hours: None,
            relevance: None,
        }
    }
}

/// Scenario containing related test data
#[derive(Debug)]
pub struct TestScenario {
    /// IDs of created nodes
    pub node_ids: Vec<String>,
    /// Description of the scenario
    pub description: String,
    /// Metadata for test assertions
    pub metadata: HashMap<String, String>,
}

const RUST_MEMORIES: [&str; 4] = [
    "Rust ownership rules prevent data races",
    "Rust ownership rules prevent data races across threads",
    "Rust ownership rules prevent data races and memory leaks",
    "Rust ownership rules prevent data races at compile time",
];

const COOKING_MEMORIES: [&str; 3] = [
    "Sourdough bread needs a long cold proof",
    "Sourdough bread needs a long cold proof overnight",
    "Sourdough bread needs a long cold proof and a hot oven",
];

impl TestDataFactory {
    // ========================================================================
    // INPUTS
    // ========================================================================

    /// Learning node with text content
    pub fn node(content: &str) -> NodeInput {
        NodeInput::new(NodeType::Learning, json!(content))
    }

    /// Node of a given type with tags
    pub fn typed_node(node_type: NodeType, content: &str, tags: &[&str]) -> NodeInput {
        let mut input = NodeInput::new(node_type, json!(content));
        input.tags = tags.iter().map(|t| t.to_string()).collect();
        input.source_type = SourceType::User;
        input
    }

    /// Node observed `hours` ago
    pub fn node_at(content: &str, hours_ago: i64) -> NodeInput {
        let mut input = Self::node(content);
        input.timestamp = Some(Utc::now() - Duration::hours(hours_ago));
        input
    }

    /// Pattern node carrying frequency and strength metadata
    pub fn pattern(content: &str, frequency: f64, strength: f64) -> NodeInput {
        let mut input = NodeInput::new(NodeType::Pattern, json!(content));
        input.source_type = SourceType::Pattern;
        input.metadata.insert("frequency".into(), json!(frequency));
        input.metadata.insert("strength".into(), json!(strength));
        input
    }

    /// Directed association edge
    pub fn edge(source: &str, target: &str) -> EdgeInput {
        EdgeInput::new(source, target, EdgeType::Association, "fixture")
    }

    /// Directed edge of a given type and strength
    pub fn typed_edge(source: &str, target: &str, edge_type: EdgeType, strength: f64) -> EdgeInput {
        EdgeInput::new(source, target, edge_type, "fixture").with_strength(strength)
    }

    // ========================================================================
    // BATCH
    // ========================================================================

    /// Generate inputs according to the configuration
    pub fn create_batch(config: &BatchConfig) -> Vec<NodeInput> {
        let now = Utc::now();
        (0..config.count)
            .map(|i| {
                let mut input = NodeInput::new(
                    config.node_type,
                    json!(format!("{} {} about item {}", config.content_prefix, i, i * 7)),
                );
                input.tags = config.tags.clone();
                input.relevance_score = config.relevance;
                if let Some(spacing) = config.spacing_hours {
                    input.timestamp = Some(now - Duration::hours(spacing * i as i64));
                }
                input
            })
            .collect()
    }

    // ========================================================================
    // SCENARIOS
    // ========================================================================

    /// Two unrelated topic clusters: Rust programming and sourdough baking
    ///
    /// Metadata: `rust_count`, `cooking_count`, and `first_rust`/`first_cooking` ids.
    pub fn create_topic_scenario(graph: &MemoryGraph) -> TestScenario {
        let mut node_ids = Vec::new();
        let mut metadata = HashMap::new();

        for (i, text) in RUST_MEMORIES.iter().enumerate() {
            let node = graph
                .create_node(Self::typed_node(NodeType::Learning, text, &["rust"]))
                .expect("Failed to create rust memory");
            if i == 0 {
                metadata.insert("first_rust".to_string(), node.id.clone());
            }
            node_ids.push(node.id);
        }
        for (i, text) in COOKING_MEMORIES.iter().enumerate() {
            let node = graph
                .create_node(Self::typed_node(NodeType::Learning, text, &["baking"]))
                .expect("Failed to create cooking memory");
            if i == 0 {
                metadata.insert("first_cooking".to_string(), node.id.clone());
            }
            node_ids.push(node.id);
        }
        metadata.insert("rust_count".to_string(), RUST_MEMORIES.len().to_string());
        metadata.insert("cooking_count".to_string(), COOKING_MEMORIES.len().to_string());

        TestScenario {
            node_ids,
            description: "Two near-duplicate clusters with no shared vocabulary".to_string(),
            metadata,
        }
    }

    /// Nodes observed 1, 24, 72 and 240 hours ago, oldest last
    pub fn create_timeline_scenario(graph: &MemoryGraph) -> TestScenario {
        let mut node_ids = Vec::new();
        let mut metadata = HashMap::new();
        for hours in [1, 24, 72, 240] {
            let node = graph
                .create_node(Self::node_at(&format!("Status update from {} hours ago", hours), hours))
                .expect("Failed to create timeline node");
            metadata.insert(format!("h{}", hours), node.id.clone());
            node_ids.push(node.id);
        }
        TestScenario {
            node_ids,
            description: "Observations spread over ten days".to_string(),
            metadata,
        }
    }

    /// A hub connected to `spokes` leaves with causal edges
    ///
    /// Metadata: `hub` id.
    pub fn create_hub_scenario(graph: &MemoryGraph, spokes: usize) -> TestScenario {
        let hub = graph
            .create_node(Self::typed_node(NodeType::Project, "Trellis release planning", &["release"]))
            .expect("Failed to create hub");
        let mut node_ids = vec![hub.id.clone()];
        for i in 0..spokes {
            let leaf = graph
                .create_node(Self::typed_node(
                    NodeType::Activity,
                    &format!("Release task number {}", i),
                    &["release"],
                ))
                .expect("Failed to create spoke");
            graph
                .create_edge(Self::typed_edge(&hub.id, &leaf.id, EdgeType::Causal, 0.8))
                .expect("Failed to link spoke");
            node_ids.push(leaf.id);
        }

        let mut metadata = HashMap::new();
        metadata.insert("hub".to_string(), hub.id);
        TestScenario {
            node_ids,
            description: format!("Hub with {} causal spokes", spokes),
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_respects_config() {
        let config = BatchConfig {
            count: 5,
            node_type: NodeType::Concept,
            tags: vec!["batch".into()],
            spacing_hours: Some(2),
            relevance: Some(0.6),
            ..Default::default()
        };
        let batch = TestDataFactory::create_batch(&config);
        assert_eq!(batch.len(), 5);
        assert!(batch.iter().all(|n| n.node_type == NodeType::Concept));
        assert!(batch.iter().all(|n| n.relevance_score == Some(0.6)));
        assert!(batch[0].timestamp.unwrap() > batch[4].timestamp.unwrap());
    }

    #[test]
    fn test_batch_contents_are_distinct() {
        let batch = TestDataFactory::create_batch(&BatchConfig::default());
        let mut contents: Vec<String> = batch.iter().map(|n| n.content.to_string()).collect();
        contents.dedup();
        assert_eq!(contents.len(), 10);
    }

    #[test]
    fn test_pattern_metadata() {
        let input = TestDataFactory::pattern("Weekly review", 3.0, 0.9);
        assert_eq!(input.metadata["frequency"], json!(3.0));
        assert_eq!(input.source_type, SourceType::Pattern);
    }
}
