//! Positive-membership filters and query options.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Set of product or member ids eligible for a query result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdFilter {
    ids: HashSet<i64>,
}

impl IdFilter {
    pub fn new(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<i64> for IdFilter {
    fn from_iter<T: IntoIterator<Item = i64>>(iter: T) -> Self {
        Self::new(iter)
    }
}

/// Options shared by list queries.
///
/// | Field | Default | Meaning |
/// |-------|---------|---------|
/// | `category_id` | `1` | Category partition to read |
/// | `filter` | `None` | Only ids in the filter are returned |
/// | `max` | `None` | Falls back to the engine's `items_max_return` |
/// | `min_weight` | `1` | Lightest link considered by sloped item lookups |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub category_id: i64,
    pub filter: Option<IdFilter>,
    pub max: Option<usize>,
    pub min_weight: i64,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            category_id: defaults::DEFAULT_CATEGORY,
            filter: None,
            max: None,
            min_weight: defaults::SLOPE_MIN_WEIGHT,
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category_id: i64) -> Self {
        self.category_id = category_id;
        self
    }

    pub fn filter(mut self, filter: IdFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }

    pub fn min_weight(mut self, min_weight: i64) -> Self {
        self.min_weight = min_weight;
        self
    }

    /// Whether an id passes the filter (always true without one).
    pub fn admits(&self, id: i64) -> bool {
        self.filter.as_ref().map_or(true, |f| f.contains(id))
    }

    /// Keep admitted items in order, stopping after `max` of them.
    pub fn select<T, I>(&self, items: I, id_of: impl Fn(&T) -> i64, default_max: usize) -> Vec<T>
    where
        I: IntoIterator<Item = T>,
    {
        let max = self.max.unwrap_or(default_max);
        items
            .into_iter()
            .filter(|item| self.admits(id_of(item)))
            .take(max)
            .collect()
    }
}

/// Options for leaderboard queries.
///
/// | Field | Default | Meaning |
/// |-------|---------|---------|
/// | `category_id` | `1` | Category partition to read |
/// | `filter` | `None` | Ranks are assigned over filtered ids only |
/// | `max` | `10` | Highest rank returned; ties at the boundary are kept |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankingOptions {
    pub category_id: i64,
    pub filter: Option<IdFilter>,
    pub max: usize,
}

impl Default for RankingOptions {
    fn default() -> Self {
        Self {
            category_id: defaults::DEFAULT_CATEGORY,
            filter: None,
            max: defaults::RANKING_MAX,
        }
    }
}

impl RankingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category_id: i64) -> Self {
        self.category_id = category_id;
        self
    }

    pub fn filter(mut self, filter: IdFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn max(mut self, max: usize) -> Self {
        self.max = max;
        self
    }

    pub fn admits(&self, id: i64) -> bool {
        self.filter.as_ref().map_or(true, |f| f.contains(id))
    }
}

/// Options for rating distributions.
///
/// | Field | Default | Meaning |
/// |-------|---------|---------|
/// | `category_id` | `1` | Category partition to read |
/// | `granularity` | `10` | Buckets per rating unit, must be positive |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributionOptions {
    pub category_id: i64,
    pub granularity: i64,
}

impl Default for DistributionOptions {
    fn default() -> Self {
        Self {
            category_id: defaults::DEFAULT_CATEGORY,
            granularity: defaults::DISTRIBUTION_GRANULARITY,
        }
    }
}

impl DistributionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category_id: i64) -> Self {
        self.category_id = category_id;
        self
    }

    pub fn granularity(mut self, granularity: i64) -> Self {
        self.granularity = granularity;
        self
    }
}
