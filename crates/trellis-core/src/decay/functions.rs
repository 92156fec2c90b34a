//! Decay Curves
//!
//! Pure functions over elapsed time. Every result is a multiplier in [0, 1]
//! except the access boost, which is in [1, accessBoost].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Edges decay this much faster than nodes at the same base rate
pub const EDGE_RATE_MULTIPLIER: f64 = 1.5;

/// Full boost window after a node access
pub const NODE_BOOST_WINDOW_HOURS: f64 = 24.0;

/// Full boost window after an edge interaction
pub const EDGE_BOOST_WINDOW_HOURS: f64 = 12.0;

/// Floor of the adaptive rate multiplier
pub const MIN_ADAPTIVE_MULTIPLIER: f64 = 0.5;

// ============================================================================
// ENUMS
// ============================================================================

/// Shape of the relevance curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecayFunction {
    #[default]
    Exponential,
    Linear,
    Logarithmic,
}

impl DecayFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecayFunction::Exponential => "exponential",
            DecayFunction::Linear => "linear",
            DecayFunction::Logarithmic => "logarithmic",
        }
    }

    /// Multiplier after `elapsed` units at `rate`
    pub fn factor(&self, rate: f64, elapsed: f64) -> f64 {
        let x = (rate * elapsed.max(0.0)).max(0.0);
        let factor = match self {
            DecayFunction::Exponential => (-x).exp(),
            DecayFunction::Linear => 1.0 - x,
            DecayFunction::Logarithmic => 1.0 - (1.0 + x).ln() / 10f64.ln(),
        };
        factor.clamp(0.0, 1.0)
    }
}

impl std::fmt::Display for DecayFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DecayFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exponential" | "exp" => Ok(DecayFunction::Exponential),
            "linear" => Ok(DecayFunction::Linear),
            "logarithmic" | "log" => Ok(DecayFunction::Logarithmic),
            other => Err(format!(
                "unknown decay function '{}' (expected exponential, linear or logarithmic)",
                other
            )),
        }
    }
}

/// Unit the base rate is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Hour,
    #[default]
    Day,
    Week,
    Month,
}

impl TimeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
            TimeUnit::Week => "week",
            TimeUnit::Month => "month",
        }
    }

    /// Length of one unit in hours; a month is 30 days
    pub fn hours(&self) -> f64 {
        match self {
            TimeUnit::Hour => 1.0,
            TimeUnit::Day => 24.0,
            TimeUnit::Week => 24.0 * 7.0,
            TimeUnit::Month => 24.0 * 30.0,
        }
    }
}

impl std::fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().trim_end_matches('s') {
            "hour" => Ok(TimeUnit::Hour),
            "day" => Ok(TimeUnit::Day),
            "week" => Ok(TimeUnit::Week),
            "month" => Ok(TimeUnit::Month),
            other => Err(format!(
                "unknown time unit '{}' (expected hour, day, week or month)",
                other
            )),
        }
    }
}

// ============================================================================
// FUNCTIONS
// ============================================================================

/// Hours between two instants, never negative
pub fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    ((to - from).num_milliseconds() as f64 / 3_600_000.0).max(0.0)
}

/// Edge multiplier: always exponential, 1.5x faster than nodes
pub fn edge_factor(base_rate: f64, edge_rate: f64, elapsed: f64) -> f64 {
    DecayFunction::Exponential.factor(base_rate * EDGE_RATE_MULTIPLIER * edge_rate, elapsed)
}

/// Recency boost for an entity last used at `last_used`
///
/// Within `window_hours` the full `boost` applies. Over the next window it
/// falls linearly to 1. Entities never used get 1.
pub fn recency_boost(
    last_used: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window_hours: f64,
    boost: f64,
) -> f64 {
    let Some(last_used) = last_used else {
        return 1.0;
    };
    let elapsed = hours_between(last_used, now);
    if elapsed <= window_hours {
        boost
    } else if elapsed < 2.0 * window_hours {
        let remaining = 1.0 - (elapsed - window_hours) / window_hours;
        1.0 + (boost - 1.0) * remaining
    } else {
        1.0
    }
}

/// Rate multiplier that slows decay for frequently used entities
///
/// Frequency is uses per day of age, with age floored at one day.
pub fn adaptive_multiplier(usage_count: i64, age_days: f64, frequency_weight: f64) -> f64 {
    let frequency = usage_count.max(0) as f64 / age_days.max(1.0);
    (1.0 - frequency * frequency_weight).max(MIN_ADAPTIVE_MULTIPLIER)
}
