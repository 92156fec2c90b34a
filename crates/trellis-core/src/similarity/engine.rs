//! Similarity Engine
//!
//! Scores node pairs, links similar nodes with semantic edges and keeps those
//! edges current through a gated background sweep.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};

use super::embedding::EmbeddingProvider;
use super::features::{DEFAULT_TOP_KEYWORDS, FeatureBundle, FeatureExtractor};
use super::metrics::{MetricBreakdown, SimilarityWeights, similarity};
use crate::decay::{MAX_SWEEP_INTERVAL_MINUTES, RunningGuard};
use crate::error::{GraphError, Result, check_unit, invalid};
use crate::graph::{
    EdgeInput, EdgePatch, EdgeType, GraphEdge, GraphNode, MAX_QUERY_LIMIT, NodeFilter, NodeOrder,
    SEMANTIC_EDGE_DECAY_RATE, validate_limit,
};
use crate::storage::Storage;

const LAST_RUN_KEY: &str = "semantic.last_run";
/// `updated_at` of the last node linked by an unfinished sweep
const RESUME_KEY: &str = "semantic.resume_at";

// ============================================================================
// CONFIG
// ============================================================================

/// Similarity configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimilarityConfig {
    pub enabled: bool,
    pub weights: SimilarityWeights,
    /// Multiplier for candidates of the target's node type
    pub same_type_boost: f64,
    /// Minimum score for a semantic link
    pub default_threshold: f64,
    pub max_connections: usize,
    /// Candidates scored per lookup, most relevant first
    pub scan_cap: usize,
    pub top_keywords: usize,
    pub feature_cache_capacity: usize,
    pub sweep_interval_minutes: u64,
    /// Changed nodes linked per sweep
    pub max_nodes_per_sweep: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            weights: SimilarityWeights::default(),
            same_type_boost: 1.1,
            default_threshold: 0.3,
            max_connections: 5,
            scan_cap: MAX_QUERY_LIMIT,
            top_keywords: DEFAULT_TOP_KEYWORDS,
            feature_cache_capacity: 1000,
            sweep_interval_minutes: 60,
            max_nodes_per_sweep: 500,
        }
    }
}

impl SimilarityConfig {
    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        if !self.same_type_boost.is_finite() || self.same_type_boost < 1.0 {
            return invalid(format!(
                "sameTypeBoost must be at least 1.0, got {}",
                self.same_type_boost
            ));
        }
        check_unit(self.default_threshold, "defaultThreshold")?;
        if self.scan_cap == 0 || self.scan_cap > MAX_QUERY_LIMIT {
            return invalid(format!("scanCap must be within 1..={}", MAX_QUERY_LIMIT));
        }
        if self.top_keywords == 0 {
            return invalid("topKeywords must be positive");
        }
        if self.feature_cache_capacity == 0 {
            return invalid("featureCacheCapacity must be positive");
        }
        if self.max_nodes_per_sweep == 0 {
            return invalid("maxNodesPerSweep must be positive");
        }
        if self.sweep_interval_minutes > MAX_SWEEP_INTERVAL_MINUTES {
            return invalid(format!(
                "sweepIntervalMinutes must be at most {}, got {}",
                MAX_SWEEP_INTERVAL_MINUTES, self.sweep_interval_minutes
            ));
        }
        Ok(())
    }
}

// ============================================================================
// RESULTS
// ============================================================================

/// A candidate with its combined score
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarNode {
    pub node: GraphNode,
    /// Combined score after the same-type boost
    pub score: f64,
    pub breakdown: MetricBreakdown,
}

/// Outcome of one semantic sweep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticSweepStats {
    pub nodes_scanned: usize,
    pub edges_created: usize,
    pub edges_strengthened: usize,
    pub failed: usize,
    pub skipped: bool,
    pub truncated: bool,
    pub cancelled: bool,
    pub forced: bool,
    /// Milliseconds
    pub execution_time: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SemanticSweepStats {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

#[derive(Default)]
struct LinkOutcome {
    created: Vec<GraphEdge>,
    strengthened: usize,
}

// ============================================================================
// ENGINE
// ============================================================================

type FeatureCache = LruCache<String, (DateTime<Utc>, Arc<FeatureBundle>)>;

/// Content similarity and semantic linking over the shared store
pub struct SimilarityEngine {
    storage: Arc<Storage>,
    config: SimilarityConfig,
    extractor: FeatureExtractor,
    features: Mutex<FeatureCache>,
    running: AtomicBool,
    cancel: AtomicBool,
}

impl SimilarityEngine {
    pub fn new(
        storage: Arc<Storage>,
        provider: Arc<dyn EmbeddingProvider>,
        config: SimilarityConfig,
    ) -> Result<Self> {
        config.validate()?;
        let capacity =
            NonZeroUsize::new(config.feature_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            storage,
            extractor: FeatureExtractor::new(provider, config.top_keywords),
            features: Mutex::new(LruCache::new(capacity)),
            config,
            running: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        self.extractor.embedder()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask a running sweep to stop before the next node
    pub fn cancel(&self) {
        if self.is_running() {
            self.cancel.store(true, Ordering::Release);
        }
    }

    fn cache(&self) -> Result<MutexGuard<'_, FeatureCache>> {
        self.features
            .lock()
            .map_err(|_| GraphError::Init("Feature cache lock poisoned".into()))
    }

    // ========================================================================
    // FEATURES
    // ========================================================================

    /// Feature bundle for a node, cached until the node changes
    pub fn features(&self, node: &GraphNode) -> Result<Arc<FeatureBundle>> {
        if let Some((at, bundle)) = self.cache()?.get(&node.id) {
            if *at == node.updated_at {
                return Ok(bundle.clone());
            }
        }

        let bundle = Arc::new(self.extractor.extract(node)?);
        self.cache()?
            .put(node.id.clone(), (node.updated_at, bundle.clone()));
        Ok(bundle)
    }

    /// Extract features for a node and persist tags and embedding
    ///
    /// Stored tags become the node's own tags plus its topics.
    pub fn ingest(&self, node: &GraphNode) -> Result<GraphNode> {
        let bundle = self.features(node)?;
        let mut tags = node.tags.clone();
        tags.extend(bundle.topics.iter().cloned());

        let embedding: &[f32] = if bundle.embedding.iter().any(|x| *x != 0.0) {
            &bundle.embedding
        } else {
            &[]
        };
        self.storage
            .set_node_features(&node.id, &tags, embedding, self.provider().model_name())?;

        self.storage
            .get_node(&node.id)?
            .ok_or_else(|| GraphError::NotFound(node.id.clone()))
    }

    /// Scored comparison of two nodes, without the same-type boost
    pub fn similarity_between(&self, a: &GraphNode, b: &GraphNode) -> Result<MetricBreakdown> {
        let fa = self.features(a)?;
        let fb = self.features(b)?;
        Ok(similarity(&fa, &fb, &self.config.weights))
    }

    // ========================================================================
    // LOOKUP
    // ========================================================================

    fn load_node(&self, node_id: &str) -> Result<GraphNode> {
        self.storage
            .get_node(node_id)?
            .ok_or_else(|| GraphError::NotFound(format!("node {}", node_id)))
    }

    /// Most similar non-pruned nodes to `node_id`, best first
    pub fn find_similar_nodes(
        &self,
        node_id: &str,
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<SimilarNode>> {
        validate_limit(limit)?;
        check_unit(threshold, "threshold")?;
        let target = self.load_node(node_id)?;
        self.rank(&target, limit, threshold)
    }

    fn rank(&self, target: &GraphNode, limit: usize, threshold: f64) -> Result<Vec<SimilarNode>> {
        let filter = NodeFilter {
            order: NodeOrder::RelevanceDesc,
            ..Default::default()
        };
        let candidates = self.storage.query_nodes(&filter, self.config.scan_cap, 0)?;
        let target_features = self.features(target)?;

        let mut ranked = Vec::new();
        for candidate in candidates {
            if candidate.id == target.id {
                continue;
            }
            let features = self.features(&candidate)?;
            let breakdown = similarity(&target_features, &features, &self.config.weights);
            if breakdown.total < threshold {
                continue;
            }
            let score = if candidate.node_type == target.node_type {
                (breakdown.total * self.config.same_type_boost).min(1.0)
            } else {
                breakdown.total
            };
            ranked.push(SimilarNode {
                node: candidate,
                score,
                breakdown,
            });
        }

        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.node.id.cmp(&b.node.id))
        });
        ranked.truncate(limit);
        Ok(ranked)
    }

    // ========================================================================
    // LINKING
    // ========================================================================

    /// Link a node to its most similar peers with bidirectional semantic edges
    ///
    /// Peers already joined by a semantic edge in either direction are skipped.
    pub fn create_semantic_edges(
        &self,
        node_id: &str,
        max_connections: usize,
    ) -> Result<Vec<GraphEdge>> {
        let node = self.load_node(node_id)?;
        if node.is_pruned {
            return Err(GraphError::Reference(format!("node {} is pruned", node_id)));
        }
        Ok(self.link(&node, max_connections, false)?.created)
    }

    fn link(&self, node: &GraphNode, max_connections: usize, strengthen: bool) -> Result<LinkOutcome> {
        let mut outcome = LinkOutcome::default();
        if max_connections == 0 && !strengthen {
            return Ok(outcome);
        }

        let ranked = self.rank(node, MAX_QUERY_LIMIT, self.config.default_threshold)?;
        for peer in ranked {
            if let Some(existing) =
                self.storage
                    .edge_between(&node.id, &peer.node.id, EdgeType::Semantic)?
            {
                if strengthen && existing.is_active && peer.score > existing.strength {
                    let patch = EdgePatch {
                        strength: Some(peer.score),
                        weight: Some(peer.score),
                        probability: Some(peer.score),
                        ..Default::default()
                    };
                    if self.storage.update_edge(&existing.id, &patch)?.is_some() {
                        outcome.strengthened += 1;
                    }
                }
                continue;
            }

            if outcome.created.len() >= max_connections {
                if strengthen {
                    continue;
                }
                break;
            }

            let mut input = EdgeInput::new(
                node.id.clone(),
                peer.node.id.clone(),
                EdgeType::Semantic,
                format!("similarity {:.3}", peer.score),
            );
            input.strength = peer.score;
            input.weight = Some(peer.score);
            input.probability = Some(peer.score);
            input.decay_rate = Some(SEMANTIC_EDGE_DECAY_RATE);
            input.bidirectional = true;

            match self.storage.insert_edge(&input) {
                Ok(edge) => outcome.created.push(edge),
                Err(e @ (GraphError::Validation(_) | GraphError::Reference(_))) => {
                    tracing::warn!(source = %node.id, target = %peer.node.id, "Skipping semantic link: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        if !outcome.created.is_empty() {
            tracing::debug!(node = %node.id, created = outcome.created.len(), "Semantic edges created");
        }
        Ok(outcome)
    }

    // ========================================================================
    // SWEEP
    // ========================================================================

    /// Link and strengthen for nodes changed since the last completed sweep
    ///
    /// Gated like the decay sweep: skipped when already running, or when
    /// `force` is false and the interval has not elapsed. An unfinished
    /// previous sweep is always resumed.
    pub fn run_semantic_sweep(&self, force: bool) -> Result<SemanticSweepStats> {
        if !self.config.enabled && !force {
            return Ok(SemanticSweepStats::skipped());
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Semantic sweep already running, skipping");
            return Ok(SemanticSweepStats::skipped());
        }
        let _guard = RunningGuard(&self.running);
        self.cancel.store(false, Ordering::Release);

        let now = Utc::now();
        let last_run = self.storage.get_timestamp(LAST_RUN_KEY)?;
        let resume_from = self.storage.get_timestamp(RESUME_KEY)?;
        if !force && resume_from.is_none() {
            if let Some(last) = last_run {
                let interval = Duration::minutes(self.config.sweep_interval_minutes as i64);
                if now - last < interval {
                    tracing::debug!(last_run = %last, "Semantic interval not elapsed, skipping");
                    return Ok(SemanticSweepStats::skipped());
                }
            }
        }
        let since = resume_from.or(last_run);

        let start = Instant::now();
        let mut stats = SemanticSweepStats {
            forced: force,
            started_at: Some(now),
            ..Default::default()
        };

        let cap = self.config.max_nodes_per_sweep;
        let mut ids = self.storage.changed_node_ids(since, cap + 1)?;
        stats.truncated = ids.len() > cap;
        ids.truncate(cap);

        let mut resume_at: Option<DateTime<Utc>> = None;
        for id in &ids {
            if self.cancel.load(Ordering::Acquire) {
                stats.cancelled = true;
                break;
            }
            match self.sweep_node(id) {
                Ok(Some((updated_at, outcome))) => {
                    stats.edges_created += outcome.created.len();
                    stats.edges_strengthened += outcome.strengthened;
                    resume_at = Some(updated_at);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(node = %id, "Semantic sweep skipped node: {}", e);
                    stats.failed += 1;
                }
            }
            stats.nodes_scanned += 1;
        }

        if stats.truncated || stats.cancelled {
            if let Some(at) = resume_at {
                self.storage.set_timestamp(RESUME_KEY, at)?;
            }
        } else {
            self.storage.clear_state(RESUME_KEY)?;
            self.storage.set_timestamp(LAST_RUN_KEY, now)?;
        }

        stats.execution_time = start.elapsed().as_millis() as u64;
        stats.finished_at = Some(Utc::now());
        tracing::info!(
            nodes_scanned = stats.nodes_scanned,
            edges_created = stats.edges_created,
            edges_strengthened = stats.edges_strengthened,
            failed = stats.failed,
            truncated = stats.truncated,
            cancelled = stats.cancelled,
            duration_ms = stats.execution_time,
            "Semantic sweep finished"
        );
        Ok(stats)
    }

    fn sweep_node(&self, node_id: &str) -> Result<Option<(DateTime<Utc>, LinkOutcome)>> {
        let Some(mut node) = self.storage.get_node(node_id)? else {
            return Ok(None);
        };
        if node.is_pruned {
            return Ok(None);
        }
        if !node.has_embedding() {
            node = self.ingest(&node)?;
        }
        let outcome = self.link(&node, self.config.max_connections, true)?;
        Ok(Some((node.updated_at, outcome)))
    }
}
