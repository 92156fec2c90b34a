//! Decay Module
//!
//! Time-based relevance aging for nodes and edges:
//! - Exponential, linear and logarithmic curves
//! - Recency boosts with linear attenuation
//! - Adaptive per-entity rate multipliers
//! - Chunked, single-flight, resumable sweeps

mod engine;
mod functions;
mod history;

pub use engine::{DecayConfig, DecayEngine, DecayStats, MAX_SWEEP_INTERVAL_MINUTES};
pub(crate) use engine::RunningGuard;
pub use functions::{
    DecayFunction, EDGE_BOOST_WINDOW_HOURS, EDGE_RATE_MULTIPLIER, MIN_ADAPTIVE_MULTIPLIER,
    NODE_BOOST_WINDOW_HOURS, TimeUnit, adaptive_multiplier, edge_factor, recency_boost,
};
pub use history::{
    BoostLog, BoostRecord, DecayRunStats, MAX_BOOSTED_ENTITIES, MAX_BOOSTS_PER_ENTITY,
    MAX_RUN_HISTORY, RunHistory, RunTotals,
};
