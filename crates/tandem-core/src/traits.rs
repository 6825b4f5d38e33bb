//! Core traits for tandem storage abstractions.
//!
//! These traits define the interfaces that concrete stores must satisfy,
//! enabling the PostgreSQL backend and the in-memory store to be swapped
//! under the same engines. Every method that performs more than one
//! statement must be atomic: implementations run it inside a single
//! transaction and roll back on error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::RatingValues;
use crate::error::Result;
use crate::models::*;

// =============================================================================
// RATING REPOSITORY
// =============================================================================

/// Repository for rating events.
#[async_trait]
pub trait RatingRepository: Send + Sync {
    /// Fetch the rating of a member for a product, including the sentinel.
    async fn get(&self, member_id: i64, product_id: i64, category_id: i64)
        -> Result<Option<Rating>>;

    /// Insert or update a rating, stamping it with the current time.
    ///
    /// Returns the previous value when a rating already existed. Duplicate
    /// rows for the same key are collapsed into one.
    async fn upsert(
        &self,
        member_id: i64,
        product_id: i64,
        category_id: i64,
        value: f64,
    ) -> Result<Option<f64>>;

    /// Apply one click to a rating in a single atomic step, following
    /// [`RatingValues::next_click`].
    ///
    /// Returns `None` when the rating is already at the purchased ceiling
    /// and was left untouched.
    async fn apply_click(
        &self,
        member_id: i64,
        product_id: i64,
        category_id: i64,
        values: &RatingValues,
    ) -> Result<Option<ClickUpdate>>;

    /// Delete one rating. Returns the value of the removed rating.
    async fn delete(&self, member_id: i64, product_id: i64, category_id: i64)
        -> Result<Option<f64>>;

    /// Delete every rating of a member in a category.
    async fn delete_member(&self, member_id: i64, category_id: i64) -> Result<u64>;

    /// Delete every rating of a product in a category.
    async fn delete_product(&self, product_id: i64, category_id: i64) -> Result<u64>;

    /// Copy the ratings of `from` onto `to`, replacing `to`'s ratings for
    /// the same products, and optionally clear `from`.
    async fn convert_member(
        &self,
        from_member_id: i64,
        to_member_id: i64,
        clear: bool,
        category_id: i64,
    ) -> Result<()>;

    /// Delete every rating observed before `cutoff`, across all categories.
    async fn delete_observed_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Distinct categories that hold at least one rating.
    async fn list_categories(&self) -> Result<Vec<i64>>;

    /// Ratings of a category with `value >= min_value`.
    async fn list_for_category(&self, category_id: i64, min_value: f64) -> Result<Vec<Rating>>;

    /// Every rating of a member in a category, sentinels included.
    async fn list_for_member(&self, member_id: i64, category_id: i64) -> Result<Vec<Rating>>;

    /// Ratings with `value >= min_value` given by members who rated
    /// `product_id` with `value >= min_value`.
    async fn list_co_rated(
        &self,
        product_id: i64,
        category_id: i64,
        min_value: f64,
    ) -> Result<Vec<Rating>>;
}

// =============================================================================
// LINK REPOSITORY
// =============================================================================

/// Repository for derived item links.
#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// Atomically replace every link of a category.
    async fn replace_category(&self, category_id: i64, links: Vec<Link>) -> Result<()>;

    /// Atomically replace the outgoing links of one source item.
    async fn replace_source(
        &self,
        category_id: i64,
        source_item: i64,
        links: Vec<Link>,
    ) -> Result<()>;

    /// Links leaving `source_item`.
    async fn outgoing(&self, source_item: i64, category_id: i64) -> Result<Vec<Link>>;

    /// Links entering `target_item`.
    async fn incoming(&self, target_item: i64, category_id: i64) -> Result<Vec<Link>>;

    /// Links leaving any of `source_items`.
    async fn outgoing_from(&self, source_items: &[i64], category_id: i64) -> Result<Vec<Link>>;

    /// Every link of a category.
    async fn list_category(&self, category_id: i64) -> Result<Vec<Link>>;
}

// =============================================================================
// STATISTICS REPOSITORY
// =============================================================================

/// Which side of a rating a leaderboard counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankSubject {
    Product,
    Member,
}

/// Which ratings a distribution covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionScope {
    All,
    Member(i64),
    Product(i64),
}

/// Read-only aggregate counts over ratings.
#[async_trait]
pub trait StatisticsRepository: Send + Sync {
    /// Number of distinct members with a rating in the category.
    async fn count_members(&self, category_id: i64) -> Result<i64>;

    /// Number of distinct products with a rating in the category.
    async fn count_products(&self, category_id: i64) -> Result<i64>;

    /// Histogram of non-negative ratings bucketed by
    /// `round(value * granularity)`, bucket descending.
    async fn distribution(
        &self,
        category_id: i64,
        granularity: i64,
        scope: DistributionScope,
    ) -> Result<Vec<DistributionBucket>>;

    /// `(id, count)` of ratings with `value >= threshold` grouped by subject.
    async fn rating_counts(
        &self,
        category_id: i64,
        threshold: f64,
        subject: RankSubject,
    ) -> Result<Vec<(i64, i64)>>;
}
