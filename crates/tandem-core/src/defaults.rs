//! Centralized default constants for tandem.
//!
//! **This module is the single source of truth** for shared default values.
//! [`crate::config::EngineConfig::default`] and the option structs read from
//! here; nothing else should hard-code these numbers.

// =============================================================================
// RATINGS
// =============================================================================

/// Minimum rating treated as genuine interest.
pub const RATING_THRESHOLD: f64 = 0.66;

/// Rating recorded for a purchase; also the ceiling for click increments.
pub const RATING_PURCHASED: f64 = 1.0;

/// Rating recorded on the first click on a product.
pub const RATING_CLICK_INITIAL: f64 = 0.7;

/// Amount added on each repeated click.
pub const RATING_CLICK_INCREASE: f64 = 0.01;

/// Sentinel rating meaning "explicitly not interested".
pub const RATING_NOT_INTERESTED: f64 = -1.0;

/// Value passed as the previous rating when a rating is created.
pub const RATING_ABSENT: f64 = -1.0;

/// Ratings older than this offset are pruned before aggregation.
pub const RATING_RETENTION_PERIOD: &str = "-6 months";

// =============================================================================
// LINKS
// =============================================================================

/// Maximum outgoing links kept per source item (<= 0 disables the cap).
pub const LINKS_MAX_NUMBER: i64 = 30;

/// Default minimum link weight for sloped item lookups.
pub const SLOPE_MIN_WEIGHT: i64 = 1;

// =============================================================================
// QUERIES
// =============================================================================

/// Default maximum number of items returned by list queries.
pub const ITEMS_MAX_RETURN: usize = 1_000_000;

/// Default number of ranks returned by ranking queries.
pub const RANKING_MAX: usize = 10;

/// Default bucket count for rating distributions.
pub const DISTRIBUTION_GRANULARITY: i64 = 10;

/// Default category used when callers do not partition their ratings.
pub const DEFAULT_CATEGORY: i64 = 1;

// =============================================================================
// STORAGE
// =============================================================================

/// Rows per statement when bulk inserting links.
pub const LINK_INSERT_BATCH: usize = 500;
