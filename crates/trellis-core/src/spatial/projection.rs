//! Projection of nodes into the (time, relevance, semantic) space
//!
//! The time axis is in hours since the Unix epoch. The mapping depends only on
//! the node record, so a rebuild reproduces the same boxes.

use chrono::{DateTime, Utc};

use super::bbox::BoundingBox;
use crate::graph::{GraphNode, NodeType};

const ACTIVITY_TIME_SPREAD_HOURS: f64 = 1.0;
const ACTIVITY_RELEVANCE_SPREAD: f64 = 0.1;
const PATTERN_FREQUENCY_SPREAD: f64 = 0.5;
const PATTERN_STRENGTH_SPREAD: f64 = 0.05;
const PATTERN_WINDOW_HOURS: f64 = 24.0;
const DEFAULT_WINDOW_HOURS: f64 = 1.0;
const DEFAULT_RELEVANCE_SPREAD: f64 = 0.05;

/// Hours since the Unix epoch
pub fn epoch_hours(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 3_600_000.0
}

/// Bounding box for a node
pub fn project(node: &GraphNode) -> BoundingBox {
    let t = epoch_hours(node.timestamp);
    match node.node_type {
        NodeType::Activity => BoundingBox::from_ranges(
            (t - ACTIVITY_TIME_SPREAD_HOURS, t + ACTIVITY_TIME_SPREAD_HOURS),
            (
                (node.relevance_score - ACTIVITY_RELEVANCE_SPREAD).max(0.0),
                (node.relevance_score + ACTIVITY_RELEVANCE_SPREAD).min(1.0),
            ),
            // Semantic axis not yet derived for activities
            (0.0, 1.0),
        ),
        NodeType::Pattern => {
            let frequency = node.metadata_f64("frequency").unwrap_or(0.0);
            let strength = node.metadata_f64("strength").unwrap_or(node.confidence);
            BoundingBox::from_ranges(
                (frequency - PATTERN_FREQUENCY_SPREAD, frequency + PATTERN_FREQUENCY_SPREAD),
                (strength - PATTERN_STRENGTH_SPREAD, strength + PATTERN_STRENGTH_SPREAD),
                (t, t + PATTERN_WINDOW_HOURS),
            )
        }
        _ => {
            let z = if node.has_embedding() { 1.0 } else { 0.0 };
            BoundingBox::from_ranges(
                (t, t + DEFAULT_WINDOW_HOURS),
                (
                    node.relevance_score - DEFAULT_RELEVANCE_SPREAD,
                    node.relevance_score + DEFAULT_RELEVANCE_SPREAD,
                ),
                (z, z),
            )
        }
    }
}
