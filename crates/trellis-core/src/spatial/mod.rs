//! Spatial-Temporal Module
//!
//! Nodes are projected into boxes over (time, relevance, semantic) axes and
//! held in an in-memory R-tree mirrored by the `spatial_index` relation.
//! Range queries are ranked by proximity, relevance and recency, and fast
//! results are cached until the next write.

mod bbox;
mod cache;
mod index;
mod projection;
mod query;
mod rtree;

pub use bbox::{BoundingBox, Point3};
pub use cache::{CacheStats, DEFAULT_CACHE_CAPACITY, QueryCache};
pub use index::{SpatialConfig, SpatialIndex, SpatialStats};
pub use projection::{epoch_hours, project};
pub use query::{ScoreWeights, ScoredNode, SpatialQuery, SpatialResult};
pub use rtree::{Entry, MAX_ENTRIES_PER_NODE, RTree};
