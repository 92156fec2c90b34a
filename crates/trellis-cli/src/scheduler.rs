//! Maintenance scheduler
//!
//! Runs decay and semantic sweeps on independent intervals until Ctrl-C.
//! Sweeps are blocking work and run on the blocking pool; each engine keeps
//! its own single-flight guard, so overlapping ticks are skipped, not queued.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use trellis_core::{EngineConfig, MemoryGraph};

/// Minutes between sweeps of each kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    pub decay_minutes: u64,
    pub semantic_minutes: u64,
}

impl Intervals {
    /// Tick at the same intervals the sweeps gate on
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            decay_minutes: config.decay.sweep_interval_minutes.max(1),
            semantic_minutes: config.similarity.sweep_interval_minutes.max(1),
        }
    }
}

pub async fn run(graph: MemoryGraph, intervals: Intervals) -> anyhow::Result<()> {
    let graph = Arc::new(graph);
    info!(
        decay_minutes = intervals.decay_minutes,
        semantic_minutes = intervals.semantic_minutes,
        "Maintenance scheduler started"
    );

    let mut decay_tick = tokio::time::interval(Duration::from_secs(intervals.decay_minutes * 60));
    let mut semantic_tick =
        tokio::time::interval(Duration::from_secs(intervals.semantic_minutes * 60));
    decay_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    semantic_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = decay_tick.tick() => {
                let graph = Arc::clone(&graph);
                tokio::spawn(async move {
                    match tokio::task::spawn_blocking(move || graph.apply_decay(false)).await {
                        Ok(Ok(stats)) if !stats.skipped => info!(
                            nodes_processed = stats.nodes_processed,
                            edges_processed = stats.edges_processed,
                            nodes_pruned = stats.nodes_pruned,
                            edges_pruned = stats.edges_pruned,
                            duration_ms = stats.execution_time,
                            "Scheduled decay sweep complete"
                        ),
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => warn!("Scheduled decay sweep failed: {}", e),
                        Err(e) => warn!("Decay sweep task panicked: {}", e),
                    }
                });
            }
            _ = semantic_tick.tick() => {
                let graph = Arc::clone(&graph);
                tokio::spawn(async move {
                    match tokio::task::spawn_blocking(move || graph.run_semantic_sweep(false)).await {
                        Ok(Ok(stats)) if !stats.skipped => info!(
                            nodes_scanned = stats.nodes_scanned,
                            edges_created = stats.edges_created,
                            edges_strengthened = stats.edges_strengthened,
                            duration_ms = stats.execution_time,
                            "Scheduled semantic sweep complete"
                        ),
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => warn!("Scheduled semantic sweep failed: {}", e),
                        Err(e) => warn!("Semantic sweep task panicked: {}", e),
                    }
                });
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Shutting down; cancelling running sweeps");
                graph.cancel_sweeps();
                break;
            }
        }
    }

    // Let in-flight sweeps reach their next chunk boundary
    while graph.decay().is_running() || graph.similarity().is_running() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    info!("Maintenance scheduler stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intervals_follow_config() {
        let mut config = EngineConfig::default();
        config.decay.sweep_interval_minutes = 30;
        config.similarity.sweep_interval_minutes = 0;
        assert_eq!(
            Intervals::from_config(&config),
            Intervals {
                decay_minutes: 30,
                semantic_minutes: 1
            }
        );
    }
}
