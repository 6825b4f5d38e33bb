//! Core data models for tandem.
//!
//! These types are shared across all tandem crates and represent the rating
//! events, the derived item links, and the values returned by read queries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

// =============================================================================
// RATING TYPES
// =============================================================================

/// A member's interest signal for a product within a category.
///
/// At most one rating exists per `(member_id, product_id, category_id)`.
/// Negative values are the "not interested" sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub member_id: i64,
    pub product_id: i64,
    pub category_id: i64,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
}

impl Rating {
    pub fn new(member_id: i64, product_id: i64, category_id: i64, value: f64) -> Self {
        Self {
            member_id,
            product_id,
            category_id,
            value,
            observed_at: Utc::now(),
        }
    }

    /// Override the observation timestamp.
    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = at;
        self
    }

    /// Whether this rating is a genuine (non-sentinel) signal.
    pub fn is_signal(&self) -> bool {
        self.value >= 0.0
    }
}

/// A click applied to a stored rating.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClickUpdate {
    /// Value before the click, `None` when the rating was created.
    pub previous: Option<f64>,
    pub value: f64,
}

// =============================================================================
// LINK TYPES
// =============================================================================

/// Aggregation strategy used to derive links from ratings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// Co-occurrence counting over ratings at or above the threshold.
    #[default]
    Links,
    /// Slope-one differencing over all non-negative ratings.
    Slope,
}

impl FromStr for LinkMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "links" | "link" => Ok(Self::Links),
            "slope" | "slopes" => Ok(Self::Slope),
            _ => Err(Error::Config(format!("unknown link mode: {}", s))),
        }
    }
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Links => write!(f, "links"),
            Self::Slope => write!(f, "slope"),
        }
    }
}

/// A directed, weighted edge between two items of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub source_item: i64,
    pub target_item: i64,
    pub category_id: i64,
    /// Number of members contributing to this edge.
    pub weight: i64,
    /// Sum of `rating(target) - rating(source)`; always 0 in links mode.
    pub slope_sum: f64,
}

impl Link {
    /// Average rating difference from source to target, if the edge has weight.
    pub fn average_slope(&self) -> Option<f64> {
        (self.weight != 0).then(|| self.slope_sum / self.weight as f64)
    }
}

// =============================================================================
// QUERY RESULT TYPES
// =============================================================================

/// A linked item with its average rating difference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlopedItem {
    pub product_id: i64,
    pub diff: f64,
}

/// A product with the rating predicted for a member, clamped to `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedItem {
    pub product_id: i64,
    pub rating: f64,
}

/// One entry of a product or member leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    /// Product or member id, depending on the ranking.
    pub id: i64,
    /// Number of ratings at or above the threshold.
    pub count: i64,
    pub rank: usize,
}

/// Histogram bucket of a rating distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionBucket {
    /// `round(rating * granularity)`.
    pub value: i64,
    pub count: i64,
}
