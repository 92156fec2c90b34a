//! Storage Module
//!
//! SQLite-based graph store with:
//! - Trigger-maintained degree and updated-at columns
//! - Keyset-paginated decay batches with per-chunk transactions
//! - Persisted spatial projection and maintenance cursors
//! - Audit trail of structural changes

mod migrations;
mod sqlite;

pub use migrations::MIGRATIONS;
pub use sqlite::{
    BoostOutcome, ChunkOutcome, DecayRow, DecayUpdate, PruneOutcome, SpatialRow, Storage,
};

pub(crate) use sqlite::{format_ts, normalize_tags};
