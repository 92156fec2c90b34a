//! Spatial-Temporal Index
//!
//! Keeps the R-tree, the persisted `spatial_index` relation and the query
//! cache in step with the store.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::bbox::{BoundingBox, Point3};
use super::cache::{CacheStats, DEFAULT_CACHE_CAPACITY, QueryCache};
use super::projection::project;
use super::query::{ScoreWeights, ScoredNode, SpatialQuery, SpatialResult, score};
use super::rtree::{Entry, MAX_ENTRIES_PER_NODE, RTree};
use crate::error::{GraphError, Result, invalid};
use crate::graph::{GraphNode, MAX_QUERY_LIMIT, NodeFilter, NodeType};
use crate::storage::{SpatialRow, Storage};

/// Nodes fetched per page during a rebuild
const REBUILD_PAGE: usize = 500;

// ============================================================================
// CONFIG
// ============================================================================

/// Spatial index configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpatialConfig {
    pub max_entries_per_node: usize,
    /// Queries faster than this are cached
    pub fast_path_ms: u64,
    pub cache_capacity: usize,
    /// Ceiling on estimated index memory
    pub memory_ceiling_bytes: usize,
    pub weights: ScoreWeights,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            max_entries_per_node: MAX_ENTRIES_PER_NODE,
            fast_path_ms: 30,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            memory_ceiling_bytes: 512 * 1024 * 1024,
            weights: ScoreWeights::default(),
        }
    }
}

impl SpatialConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_entries_per_node < 4 {
            return invalid("maxEntriesPerNode must be at least 4");
        }
        if self.cache_capacity == 0 {
            return invalid("cacheCapacity must be positive");
        }
        if self.memory_ceiling_bytes == 0 {
            return invalid("memoryCeilingBytes must be positive");
        }
        let w = &self.weights;
        if [w.proximity, w.relevance, w.recency]
            .iter()
            .any(|x| !x.is_finite() || *x < 0.0)
        {
            return invalid("score weights must be non-negative");
        }
        Ok(())
    }
}

/// Size and cache counters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialStats {
    pub entries: usize,
    pub depth: usize,
    pub memory_bytes: usize,
    pub memory_ceiling_bytes: usize,
    pub cache: CacheStats,
}

// ============================================================================
// INDEX
// ============================================================================

#[derive(Default)]
struct IndexState {
    tree: RTree,
    boxes: HashMap<String, (NodeType, BoundingBox)>,
}

pub struct SpatialIndex {
    storage: Arc<Storage>,
    config: SpatialConfig,
    state: RwLock<IndexState>,
    cache: QueryCache,
}

impl SpatialIndex {
    /// Load the persisted projection, rebuilding it if it is missing
    pub fn new(storage: Arc<Storage>, config: SpatialConfig) -> Result<Self> {
        config.validate()?;
        let index = Self {
            cache: QueryCache::new(config.cache_capacity),
            state: RwLock::new(IndexState {
                tree: RTree::new(config.max_entries_per_node),
                boxes: HashMap::new(),
            }),
            storage,
            config,
        };

        let rows = index.storage.load_spatial()?;
        let active = index.storage.stats()?.active_nodes as usize;
        if rows.len() == active {
            index.load_rows(rows)?;
            tracing::info!(entries = active, "Spatial index loaded");
        } else {
            let count = index.rebuild()?;
            tracing::info!(entries = count, persisted = active, "Spatial index rebuilt on startup");
        }
        Ok(index)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, IndexState>> {
        self.state
            .read()
            .map_err(|_| GraphError::Init("Spatial index lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, IndexState>> {
        self.state
            .write()
            .map_err(|_| GraphError::Init("Spatial index lock poisoned".into()))
    }

    fn load_rows(&self, rows: Vec<SpatialRow>) -> Result<()> {
        let mut boxes = HashMap::with_capacity(rows.len());
        let entries: Vec<Entry> = rows
            .into_iter()
            .map(|r| {
                boxes.insert(r.node_id.clone(), (r.node_type, r.bbox));
                Entry { id: r.node_id, bbox: r.bbox }
            })
            .collect();
        let tree = RTree::from_entries(entries, self.config.max_entries_per_node);
        if !tree.is_empty() && tree.memory_bytes() > self.config.memory_ceiling_bytes {
            return Err(GraphError::ResourceExhausted(format!(
                "spatial index needs {} bytes, ceiling is {}",
                tree.memory_bytes(),
                self.config.memory_ceiling_bytes
            )));
        }
        *self.write()? = IndexState { tree, boxes };
        Ok(())
    }

    pub fn config(&self) -> &SpatialConfig {
        &self.config
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Project a node and (re)insert it; clears the query cache
    pub fn index_node(&self, node: &GraphNode) -> Result<()> {
        if node.is_pruned {
            return self.remove_node(&node.id);
        }
        let bbox = project(node);
        if !bbox.is_finite() {
            return invalid(format!("node {} projects to a non-finite box", node.id));
        }

        {
            let mut state = self.write()?;
            let projected = state.tree.memory_bytes() + RTree::entry_cost(&node.id);
            if !state.boxes.contains_key(&node.id) && projected > self.config.memory_ceiling_bytes {
                return Err(GraphError::ResourceExhausted(format!(
                    "spatial index memory ceiling of {} bytes reached",
                    self.config.memory_ceiling_bytes
                )));
            }

            self.storage.upsert_spatial(&SpatialRow {
                node_id: node.id.clone(),
                node_type: node.node_type,
                bbox,
            })?;
            if let Some((_, old)) = state.boxes.insert(node.id.clone(), (node.node_type, bbox)) {
                state.tree.remove(&node.id, &old);
            }
            state.tree.insert(Entry { id: node.id.clone(), bbox });
        }

        self.cache.invalidate()
    }

    /// Drop a node from the index; clears the query cache
    pub fn remove_node(&self, node_id: &str) -> Result<()> {
        self.remove_nodes(std::slice::from_ref(&node_id.to_string()))
    }

    pub fn remove_nodes(&self, node_ids: &[String]) -> Result<()> {
        if node_ids.is_empty() {
            return Ok(());
        }
        {
            let mut state = self.write()?;
            for id in node_ids {
                if let Some((_, bbox)) = state.boxes.remove(id) {
                    state.tree.remove(id, &bbox);
                }
                self.storage.remove_spatial(id)?;
            }
        }
        self.cache.invalidate()
    }

    /// Reproject every non-pruned node from the store
    pub fn rebuild(&self) -> Result<usize> {
        let mut rows = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let page = self.storage.node_page(after.as_deref(), REBUILD_PAGE)?;
            let done = page.len() < REBUILD_PAGE;
            after = page.last().map(|n| n.id.clone());
            for node in &page {
                let bbox = project(node);
                if bbox.is_finite() {
                    rows.push(SpatialRow {
                        node_id: node.id.clone(),
                        node_type: node.node_type,
                        bbox,
                    });
                } else {
                    tracing::warn!(node_id = %node.id, "Skipping node with non-finite projection");
                }
            }
            if done {
                break;
            }
        }

        let count = rows.len();
        self.storage.replace_spatial(&rows)?;
        self.load_rows(rows)?;
        self.cache.invalidate()?;
        Ok(count)
    }

    pub fn invalidate_cache(&self) -> Result<()> {
        self.cache.invalidate()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.tree.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn stats(&self) -> Result<SpatialStats> {
        let state = self.read()?;
        Ok(SpatialStats {
            entries: state.tree.len(),
            depth: state.tree.depth(),
            memory_bytes: state.tree.memory_bytes(),
            memory_ceiling_bytes: self.config.memory_ceiling_bytes,
            cache: self.cache.stats()?,
        })
    }

    // ========================================================================
    // QUERY
    // ========================================================================

    /// Ranked range query
    ///
    /// Malformed queries fail before the cache is consulted.
    pub fn query(&self, query: &SpatialQuery) -> Result<SpatialResult> {
        query.validate()?;

        let key = query.cache_key();
        if let Some(results) = self.cache.get(&key)? {
            tracing::debug!(hits = results.len(), "Spatial query served from cache");
            return Ok(SpatialResult {
                candidates: results.len(),
                results,
                from_cache: true,
                elapsed_ms: 0.0,
            });
        }

        let start = Instant::now();
        let now = Utc::now();

        let mut top = TopRanked::new(query.limit);
        let candidates = match (query.center, query.radius) {
            (Some(center), Some(radius)) => {
                let (nodes, distances) = self.centered_candidates(center, radius)?;
                let candidates = nodes.len();
                for node in nodes.into_iter().filter(|n| query.accepts(n)) {
                    let distance = distances.get(&node.id).copied();
                    top.push(score(&self.config.weights, node, distance, query.radius, now));
                }
                candidates
            }
            _ => self.scan_filtered(query, |node| {
                if query.accepts(&node) {
                    top.push(score(&self.config.weights, node, None, None, now));
                }
            })?,
        };
        let results = top.into_sorted();

        let elapsed = start.elapsed();
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        if elapsed.as_millis() < u128::from(self.config.fast_path_ms) {
            self.cache.put(key, results.clone())?;
        } else {
            tracing::debug!(elapsed_ms, "Spatial query too slow to cache");
        }

        Ok(SpatialResult {
            results,
            from_cache: false,
            candidates,
            elapsed_ms,
        })
    }

    /// Boxes hitting the cube around `center`, kept only within `radius`
    fn centered_candidates(
        &self,
        center: Point3,
        radius: f64,
    ) -> Result<(Vec<GraphNode>, HashMap<String, f64>)> {
        let cube = BoundingBox::around(center, radius);
        let distances: HashMap<String, f64> = {
            let state = self.read()?;
            state
                .tree
                .search(&cube)
                .into_iter()
                .filter_map(|e| {
                    let d = e.bbox.center().distance(&center);
                    (d <= radius).then(|| (e.id.clone(), d))
                })
                .collect()
        };
        let mut ids: Vec<String> = distances.keys().cloned().collect();
        ids.sort();
        Ok((self.storage.get_nodes(&ids)?, distances))
    }

    /// Walk every node matching the query's predicates; returns how many
    fn scan_filtered(&self, query: &SpatialQuery, mut visit: impl FnMut(GraphNode)) -> Result<usize> {
        let filter = NodeFilter {
            node_types: query.node_types.clone(),
            min_relevance: query.min_relevance,
            timestamp_from: query.time_from,
            timestamp_to: query.time_to,
            ..Default::default()
        };
        let mut seen = 0;
        let mut after: Option<String> = None;
        loop {
            let page = self.storage.query_node_page(&filter, after.as_deref(), MAX_QUERY_LIMIT)?;
            let done = page.len() < MAX_QUERY_LIMIT;
            after = page.last().map(|n| n.id.clone());
            seen += page.len();
            page.into_iter().for_each(&mut visit);
            if done {
                return Ok(seen);
            }
        }
    }
}

// ============================================================================
// TOP-K
// ============================================================================

/// Heap entry ordered so that the best hit is the greatest
struct Ranked(ScoredNode);

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .score
            .total_cmp(&other.0.score)
            .then_with(|| other.0.node.id.cmp(&self.0.node.id))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

/// Keeps the best `limit` hits seen so far
struct TopRanked {
    limit: usize,
    heap: BinaryHeap<Reverse<Ranked>>,
}

impl TopRanked {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            heap: BinaryHeap::with_capacity(limit.saturating_add(1)),
        }
    }

    fn push(&mut self, hit: ScoredNode) {
        if self.limit == 0 {
            return;
        }
        self.heap.push(Reverse(Ranked(hit)));
        if self.heap.len() > self.limit {
            self.heap.pop();
        }
    }

    /// Best first; ties broken by ascending id
    fn into_sorted(self) -> Vec<ScoredNode> {
        // Ascending order of Reverse is descending order of rank
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(Ranked(hit))| hit)
            .collect()
    }
}
