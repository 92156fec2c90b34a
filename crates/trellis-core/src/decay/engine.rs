//! Decay Engine
//!
//! Ages relevance and strength over time, boosts on use and soft-prunes what
//! falls below the minimum. Sweeps are single-flight, gated by the persisted
//! time of the last completed run, chunked, capped and resumable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::functions::{
    DecayFunction, EDGE_BOOST_WINDOW_HOURS, NODE_BOOST_WINDOW_HOURS, TimeUnit,
    adaptive_multiplier, edge_factor, hours_between, recency_boost,
};
use super::history::{BoostLog, BoostRecord, DecayRunStats, RunHistory, RunTotals};
use crate::error::{GraphError, Result, check_unit, invalid};
use crate::storage::{BoostOutcome, DecayRow, DecayUpdate, Storage};

const LAST_RUN_KEY: &str = "decay.last_run";
const NODE_CURSOR_KEY: &str = "decay.cursor.nodes";
const EDGE_CURSOR_KEY: &str = "decay.cursor.edges";
/// Cursor value marking a finished phase of an unfinished run
const PHASE_DONE: &str = "complete";

/// Longest accepted sweep interval (one year)
pub const MAX_SWEEP_INTERVAL_MINUTES: u64 = 525_600;

// ============================================================================
// CONFIG
// ============================================================================

/// Decay configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecayConfig {
    pub enabled: bool,
    /// Rate per time unit
    pub base_rate: f64,
    pub decay_function: DecayFunction,
    pub time_unit: TimeUnit,
    /// Entities scoring below this are soft-pruned
    pub minimum_relevance: f64,
    /// Multiplier for recently used entities
    pub access_boost: f64,
    /// Minimum time between non-forced sweeps
    pub sweep_interval_minutes: u64,
    /// Entities written per transaction
    pub batch_size: usize,
    /// Cap per entity kind per run
    pub max_entities_per_run: usize,
    /// Weight of use frequency in the adaptive multiplier
    pub frequency_weight: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_rate: 0.1,
            decay_function: DecayFunction::Exponential,
            time_unit: TimeUnit::Day,
            minimum_relevance: 0.1,
            access_boost: 1.2,
            sweep_interval_minutes: 60,
            batch_size: 100,
            max_entities_per_run: 10_000,
            frequency_weight: 0.1,
        }
    }
}

impl DecayConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.base_rate.is_finite() || self.base_rate < 0.0 {
            return invalid(format!("baseRate must be non-negative, got {}", self.base_rate));
        }
        check_unit(self.minimum_relevance, "minimumRelevance")?;
        if !self.access_boost.is_finite() || self.access_boost < 1.0 {
            return invalid(format!("accessBoost must be at least 1.0, got {}", self.access_boost));
        }
        if self.sweep_interval_minutes > MAX_SWEEP_INTERVAL_MINUTES {
            return invalid(format!(
                "sweepIntervalMinutes must be at most {}, got {}",
                MAX_SWEEP_INTERVAL_MINUTES, self.sweep_interval_minutes
            ));
        }
        if self.batch_size == 0 {
            return invalid("batchSize must be positive");
        }
        if self.max_entities_per_run == 0 {
            return invalid("maxEntitiesPerRun must be positive");
        }
        if !self.frequency_weight.is_finite() || self.frequency_weight < 0.0 {
            return invalid(format!(
                "frequencyWeight must be non-negative, got {}",
                self.frequency_weight
            ));
        }
        Ok(())
    }
}

// ============================================================================
// STATS
// ============================================================================

/// Run totals plus live store aggregates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecayStats {
    pub totals: RunTotals,
    pub last_run: Option<DecayRunStats>,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub is_running: bool,
    pub active_nodes: i64,
    pub pruned_nodes: i64,
    pub active_edges: i64,
    pub inactive_edges: i64,
    pub average_relevance: f64,
    pub average_strength: f64,
    pub config: DecayConfig,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Clears the running flag when a sweep ends, however it ends
pub(crate) struct RunningGuard<'a>(pub(crate) &'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum PhaseEnd {
    Finished,
    Truncated,
    Cancelled,
}

/// Relevance aging over the shared store
pub struct DecayEngine {
    storage: Arc<Storage>,
    config: RwLock<DecayConfig>,
    running: AtomicBool,
    cancel: AtomicBool,
    history: Mutex<RunHistory>,
    node_boosts: Mutex<BoostLog>,
    edge_boosts: Mutex<BoostLog>,
}

impl DecayEngine {
    pub fn new(storage: Arc<Storage>, config: DecayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            storage,
            config: RwLock::new(config),
            running: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
            history: Mutex::new(RunHistory::default()),
            node_boosts: Mutex::new(BoostLog::default()),
            edge_boosts: Mutex::new(BoostLog::default()),
        })
    }

    pub fn config(&self) -> Result<DecayConfig> {
        self.config
            .read()
            .map(|c| c.clone())
            .map_err(|_| GraphError::Init("Decay config lock poisoned".into()))
    }

    /// Replace the configuration; takes effect on the next sweep
    pub fn set_config(&self, config: DecayConfig) -> Result<()> {
        config.validate()?;
        let mut current = self
            .config
            .write()
            .map_err(|_| GraphError::Init("Decay config lock poisoned".into()))?;
        *current = config;
        Ok(())
    }

    fn history(&self) -> Result<MutexGuard<'_, RunHistory>> {
        self.history
            .lock()
            .map_err(|_| GraphError::Init("Decay history lock poisoned".into()))
    }

    fn boosts<'a>(&self, log: &'a Mutex<BoostLog>) -> Result<MutexGuard<'a, BoostLog>> {
        log.lock()
            .map_err(|_| GraphError::Init("Boost log lock poisoned".into()))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask a running sweep to stop at the next chunk boundary
    pub fn cancel(&self) {
        if self.is_running() {
            self.cancel.store(true, Ordering::Release);
        }
    }

    // ========================================================================
    // SWEEP
    // ========================================================================

    /// Age every non-pruned node and active edge
    ///
    /// Returns an all-zero skipped result when another sweep is running, or
    /// when `force` is false and the interval since the last completed run
    /// has not elapsed. An unfinished previous run is always resumed.
    pub fn apply_decay(&self, force: bool) -> Result<DecayRunStats> {
        let config = self.config()?;

        if !config.enabled && !force {
            return Ok(DecayRunStats::skipped(config.decay_function, config.base_rate));
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Decay sweep already running, skipping");
            return Ok(DecayRunStats::skipped(config.decay_function, config.base_rate));
        }
        let _guard = RunningGuard(&self.running);
        self.cancel.store(false, Ordering::Release);

        let now = Utc::now();
        let resuming = self.storage.get_state(NODE_CURSOR_KEY)?.is_some()
            || self.storage.get_state(EDGE_CURSOR_KEY)?.is_some();

        if !force && !resuming {
            if let Some(last) = self.storage.get_timestamp(LAST_RUN_KEY)? {
                let interval = Duration::minutes(config.sweep_interval_minutes as i64);
                if now - last < interval {
                    tracing::debug!(last_run = %last, "Decay interval not elapsed, skipping");
                    return Ok(DecayRunStats::skipped(config.decay_function, config.base_rate));
                }
            }
        }

        let start = Instant::now();
        let mut stats = DecayRunStats {
            decay_rate: config.base_rate,
            decay_function: config.decay_function,
            forced: force,
            started_at: Some(now),
            ..Default::default()
        };

        let node_end = self.sweep_nodes(&config, now, &mut stats)?;
        let edge_end = match node_end {
            PhaseEnd::Cancelled => PhaseEnd::Cancelled,
            _ => self.sweep_edges(&config, now, &mut stats)?,
        };

        stats.truncated =
            matches!(node_end, PhaseEnd::Truncated) || matches!(edge_end, PhaseEnd::Truncated);
        stats.cancelled =
            matches!(node_end, PhaseEnd::Cancelled) || matches!(edge_end, PhaseEnd::Cancelled);

        if stats.is_complete() {
            self.storage.clear_state(NODE_CURSOR_KEY)?;
            self.storage.clear_state(EDGE_CURSOR_KEY)?;
            self.storage.set_timestamp(LAST_RUN_KEY, now)?;
        }

        stats.execution_time = start.elapsed().as_millis() as u64;
        stats.finished_at = Some(Utc::now());

        if stats.truncated {
            tracing::warn!(
                nodes = stats.nodes_processed,
                edges = stats.edges_processed,
                cap = config.max_entities_per_run,
                "Decay sweep hit the per-run cap; the next run resumes from the saved cursor"
            );
        }
        tracing::info!(
            nodes_processed = stats.nodes_processed,
            edges_processed = stats.edges_processed,
            nodes_pruned = stats.nodes_pruned,
            edges_pruned = stats.edges_pruned,
            edges_cascaded = stats.edges_cascaded,
            failed = stats.failed,
            cancelled = stats.cancelled,
            duration_ms = stats.execution_time,
            "Decay sweep finished"
        );

        self.history()?.push(stats.clone());
        Ok(stats)
    }

    /// Read the saved cursor for a phase; `None` in the outer option means done
    fn load_cursor(&self, key: &str) -> Result<Option<Option<String>>> {
        match self.storage.get_state(key)? {
            Some(value) if value == PHASE_DONE => Ok(None),
            Some(value) => Ok(Some(Some(value))),
            None => Ok(Some(None)),
        }
    }

    fn sweep_nodes(
        &self,
        config: &DecayConfig,
        now: DateTime<Utc>,
        stats: &mut DecayRunStats,
    ) -> Result<PhaseEnd> {
        let Some(mut cursor) = self.load_cursor(NODE_CURSOR_KEY)? else {
            return Ok(PhaseEnd::Finished);
        };
        let mut processed = 0usize;

        loop {
            let want = config.batch_size.min(config.max_entities_per_run - processed);
            let batch = self.storage.node_decay_batch(cursor.as_deref(), want)?;
            if batch.is_empty() {
                self.storage.set_state(NODE_CURSOR_KEY, PHASE_DONE)?;
                return Ok(PhaseEnd::Finished);
            }

            let updates: Vec<DecayUpdate> = batch
                .iter()
                .map(|row| self.node_update(config, row, now))
                .collect();
            let outcome = self.storage.apply_node_decay(&updates, now)?;

            stats.nodes_processed += outcome.updated;
            stats.nodes_pruned += outcome.pruned;
            stats.edges_cascaded += outcome.cascaded_edges;
            stats.failed += outcome.failed;
            stats.pruned_node_ids.extend(
                updates.iter().filter(|u| u.prune).map(|u| u.id.clone()),
            );

            processed += batch.len();
            let last = batch.last().map(|r| r.id.clone());
            if let Some(last) = &last {
                self.storage.set_state(NODE_CURSOR_KEY, last)?;
            }
            cursor = last;

            if batch.len() < want {
                self.storage.set_state(NODE_CURSOR_KEY, PHASE_DONE)?;
                return Ok(PhaseEnd::Finished);
            }
            if processed >= config.max_entities_per_run {
                return Ok(PhaseEnd::Truncated);
            }
            if self.cancel.load(Ordering::Acquire) {
                return Ok(PhaseEnd::Cancelled);
            }
        }
    }

    fn sweep_edges(
        &self,
        config: &DecayConfig,
        now: DateTime<Utc>,
        stats: &mut DecayRunStats,
    ) -> Result<PhaseEnd> {
        let Some(mut cursor) = self.load_cursor(EDGE_CURSOR_KEY)? else {
            return Ok(PhaseEnd::Finished);
        };
        let mut processed = 0usize;

        loop {
            let want = config.batch_size.min(config.max_entities_per_run - processed);
            let batch = self.storage.edge_decay_batch(cursor.as_deref(), want)?;
            if batch.is_empty() {
                self.storage.set_state(EDGE_CURSOR_KEY, PHASE_DONE)?;
                return Ok(PhaseEnd::Finished);
            }

            let updates: Vec<DecayUpdate> = batch
                .iter()
                .map(|row| self.edge_update(config, row, now))
                .collect();
            let outcome = self.storage.apply_edge_decay(&updates, now)?;

            stats.edges_processed += outcome.updated;
            stats.edges_pruned += outcome.pruned;
            stats.failed += outcome.failed;

            processed += batch.len();
            let last = batch.last().map(|r| r.id.clone());
            if let Some(last) = &last {
                self.storage.set_state(EDGE_CURSOR_KEY, last)?;
            }
            cursor = last;

            if batch.len() < want {
                self.storage.set_state(EDGE_CURSOR_KEY, PHASE_DONE)?;
                return Ok(PhaseEnd::Finished);
            }
            if processed >= config.max_entities_per_run {
                return Ok(PhaseEnd::Truncated);
            }
            if self.cancel.load(Ordering::Acquire) {
                return Ok(PhaseEnd::Cancelled);
            }
        }
    }

    /// Elapsed units since the entity was last used or last decayed
    fn elapsed_units(config: &DecayConfig, row: &DecayRow, now: DateTime<Utc>) -> f64 {
        let since = match (row.last_used, row.last_decayed) {
            (Some(a), Some(b)) => a.max(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => row.created_at,
        };
        hours_between(since, now) / config.time_unit.hours()
    }

    fn node_update(&self, config: &DecayConfig, row: &DecayRow, now: DateTime<Utc>) -> DecayUpdate {
        let elapsed = Self::elapsed_units(config, row, now);
        let factor = config
            .decay_function
            .factor(config.base_rate * row.rate, elapsed);
        let boost = recency_boost(row.last_used, now, NODE_BOOST_WINDOW_HOURS, config.access_boost);
        let score = (row.score * factor * boost).clamp(0.0, 1.0);

        let age_days = hours_between(row.created_at, now) / 24.0;
        let rate = adaptive_multiplier(row.usage_count, age_days, config.frequency_weight);

        DecayUpdate {
            id: row.id.clone(),
            score,
            rate,
            prune: score < config.minimum_relevance,
        }
    }

    fn edge_update(&self, config: &DecayConfig, row: &DecayRow, now: DateTime<Utc>) -> DecayUpdate {
        let elapsed = Self::elapsed_units(config, row, now);
        let factor = edge_factor(config.base_rate, row.rate, elapsed);
        let boost = recency_boost(row.last_used, now, EDGE_BOOST_WINDOW_HOURS, config.access_boost);
        let score = (row.score * factor * boost).clamp(0.0, 1.0);

        let age_days = hours_between(row.created_at, now) / 24.0;
        let base = row.edge_type.unwrap_or_default().default_decay_rate();
        let rate = base * adaptive_multiplier(row.usage_count, age_days, config.frequency_weight);

        DecayUpdate {
            id: row.id.clone(),
            score,
            rate,
            prune: score < config.minimum_relevance,
        }
    }

    // ========================================================================
    // BOOSTS
    // ========================================================================

    /// Boost a node on access; never lowers relevance
    pub fn boost_node_on_access(&self, node_id: &str) -> Result<Option<BoostOutcome>> {
        let boost = self.config()?.access_boost;
        let outcome = self
            .storage
            .boost_node(node_id, Utc::now(), |score| (score * boost).min(1.0))?;
        if let Some(o) = &outcome {
            self.boosts(&self.node_boosts)?.record(
                node_id,
                BoostRecord { at: o.at, before: o.before, after: o.after },
            );
        }
        Ok(outcome)
    }

    /// Boost an edge on interaction; never lowers strength
    pub fn boost_edge_on_interaction(&self, edge_id: &str) -> Result<Option<BoostOutcome>> {
        let boost = self.config()?.access_boost;
        let outcome = self
            .storage
            .boost_edge(edge_id, Utc::now(), |strength| (strength * boost).min(1.0))?;
        if let Some(o) = &outcome {
            self.boosts(&self.edge_boosts)?.record(
                edge_id,
                BoostRecord { at: o.at, before: o.before, after: o.after },
            );
        }
        Ok(outcome)
    }

    pub fn node_boost_history(&self, node_id: &str) -> Result<Vec<BoostRecord>> {
        Ok(self.boosts(&self.node_boosts)?.history(node_id))
    }

    pub fn edge_boost_history(&self, edge_id: &str) -> Result<Vec<BoostRecord>> {
        Ok(self.boosts(&self.edge_boosts)?.history(edge_id))
    }

    // ========================================================================
    // RESET & REPORTING
    // ========================================================================

    /// Restore full relevance and strength everywhere and forget run history
    ///
    /// Prune flags are kept. Returns (nodes, edges) reset.
    pub fn reset_decay(&self) -> Result<(usize, usize)> {
        let (nodes, edges) = self.storage.reset_decay(Utc::now())?;
        self.storage.clear_state(NODE_CURSOR_KEY)?;
        self.storage.clear_state(EDGE_CURSOR_KEY)?;
        self.storage.clear_state(LAST_RUN_KEY)?;
        self.history()?.clear();
        self.boosts(&self.node_boosts)?.clear();
        self.boosts(&self.edge_boosts)?.clear();
        tracing::info!(nodes, edges, "Decay state reset");
        Ok((nodes, edges))
    }

    pub fn get_decay_stats(&self) -> Result<DecayStats> {
        let store = self.storage.stats()?;
        let (totals, last_run) = {
            let history = self.history()?;
            (history.totals().clone(), history.last().cloned())
        };
        Ok(DecayStats {
            totals,
            last_run,
            last_completed_at: self.storage.get_timestamp(LAST_RUN_KEY)?,
            is_running: self.is_running(),
            active_nodes: store.active_nodes,
            pruned_nodes: store.pruned_nodes,
            active_edges: store.active_edges,
            inactive_edges: store.inactive_edges,
            average_relevance: store.average_relevance,
            average_strength: store.average_strength,
            config: self.config()?,
        })
    }

    /// Most recent runs, newest first
    pub fn get_decay_history(&self, limit: usize) -> Result<Vec<DecayRunStats>> {
        Ok(self.history()?.recent(limit))
    }
}
