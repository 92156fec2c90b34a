//! Sweep results and bounded boost logs

use std::collections::VecDeque;
use std::num::NonZeroUsize;

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};

use super::functions::DecayFunction;

/// Runs kept in the rolling history
pub const MAX_RUN_HISTORY: usize = 100;

/// Boost records kept per entity
pub const MAX_BOOSTS_PER_ENTITY: usize = 50;

/// Entities tracked per boost log
pub const MAX_BOOSTED_ENTITIES: usize = 1000;

// ============================================================================
// RUN RESULT
// ============================================================================

/// Outcome of one decay sweep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecayRunStats {
    pub nodes_processed: usize,
    pub edges_processed: usize,
    pub nodes_pruned: usize,
    pub edges_pruned: usize,
    /// Outgoing edges deactivated because their source was pruned
    pub edges_cascaded: usize,
    /// Entities skipped after a per-entity write error
    pub failed: usize,
    /// Wall time in milliseconds
    pub execution_time: u64,
    /// Base rate the sweep ran with
    pub decay_rate: f64,
    pub decay_function: DecayFunction,
    /// Another sweep was running, or the interval has not elapsed
    pub skipped: bool,
    /// Hit the per-run cap; the next run resumes from the saved cursor
    pub truncated: bool,
    /// Stopped at a chunk boundary on request
    pub cancelled: bool,
    pub forced: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Nodes pruned by this run
    #[serde(skip)]
    pub pruned_node_ids: Vec<String>,
}

impl DecayRunStats {
    /// An all-zero result for a run that did not happen
    pub fn skipped(function: DecayFunction, decay_rate: f64) -> Self {
        Self {
            skipped: true,
            decay_function: function,
            decay_rate,
            ..Default::default()
        }
    }

    /// True when the run finished its whole scan
    pub fn is_complete(&self) -> bool {
        !self.skipped && !self.truncated && !self.cancelled
    }

    pub fn total_pruned(&self) -> usize {
        self.nodes_pruned + self.edges_pruned
    }
}

// ============================================================================
// RUN HISTORY
// ============================================================================

/// Cumulative counters since the engine started or was reset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTotals {
    pub runs: u64,
    pub nodes_processed: u64,
    pub edges_processed: u64,
    pub nodes_pruned: u64,
    pub edges_pruned: u64,
}

/// Fixed-capacity ring buffer of completed runs
#[derive(Debug)]
pub struct RunHistory {
    runs: VecDeque<DecayRunStats>,
    capacity: usize,
    totals: RunTotals,
}

impl Default for RunHistory {
    fn default() -> Self {
        Self::new(MAX_RUN_HISTORY)
    }
}

impl RunHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            runs: VecDeque::with_capacity(capacity),
            capacity,
            totals: RunTotals::default(),
        }
    }

    /// Record a run, evicting the oldest when full
    pub fn push(&mut self, run: DecayRunStats) {
        self.totals.runs += 1;
        self.totals.nodes_processed += run.nodes_processed as u64;
        self.totals.edges_processed += run.edges_processed as u64;
        self.totals.nodes_pruned += run.nodes_pruned as u64;
        self.totals.edges_pruned += run.edges_pruned as u64;

        if self.runs.len() == self.capacity {
            self.runs.pop_front();
        }
        self.runs.push_back(run);
    }

    /// Most recent runs, newest first
    pub fn recent(&self, limit: usize) -> Vec<DecayRunStats> {
        self.runs.iter().rev().take(limit).cloned().collect()
    }

    pub fn last(&self) -> Option<&DecayRunStats> {
        self.runs.back()
    }

    pub fn totals(&self) -> &RunTotals {
        &self.totals
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn clear(&mut self) {
        self.runs.clear();
        self.totals = RunTotals::default();
    }
}

// ============================================================================
// BOOST LOG
// ============================================================================

/// One access or interaction boost
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostRecord {
    pub at: DateTime<Utc>,
    pub before: f64,
    pub after: f64,
}

/// Per-entity boost history, bounded in entities (LRU) and entries per entity
pub struct BoostLog {
    entries: LruCache<String, VecDeque<BoostRecord>>,
    per_entity: usize,
}

impl Default for BoostLog {
    fn default() -> Self {
        Self::new(MAX_BOOSTED_ENTITIES, MAX_BOOSTS_PER_ENTITY)
    }
}

impl BoostLog {
    pub fn new(entities: usize, per_entity: usize) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(entities).unwrap_or(NonZeroUsize::MIN)),
            per_entity: per_entity.max(1),
        }
    }

    pub fn record(&mut self, id: &str, record: BoostRecord) {
        let per_entity = self.per_entity;
        let log = self
            .entries
            .get_or_insert_mut(id.to_string(), || VecDeque::with_capacity(per_entity));
        if log.len() == per_entity {
            log.pop_front();
        }
        log.push_back(record);
    }

    /// Boosts for one entity, oldest first
    pub fn history(&self, id: &str) -> Vec<BoostRecord> {
        self.entries
            .peek(id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of entities tracked
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
