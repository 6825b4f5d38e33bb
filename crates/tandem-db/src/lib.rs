//! # tandem-db
//!
//! PostgreSQL storage layer for tandem.
//!
//! This crate provides:
//! - Connection pool management
//! - Rating, link and statistics repositories over sqlx
//! - Transactional link replacement with batched `UNNEST` inserts
//! - Schema-isolated fixtures for integration tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tandem_db::Database;
//! use tandem_engine::{Engine, EngineConfig, LinkMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Arc::new(Database::connect("postgres://localhost/tandem").await?);
//!     let engine = Engine::new(db, EngineConfig::from_env()?)?;
//!
//!     let report = engine.aggregator.rebuild_all(LinkMode::Links).await?;
//!     println!("Rebuilt {} categories", report.rebuilt.len());
//!     Ok(())
//! }
//! ```

pub mod links;
pub mod pool;
pub mod ratings;
pub mod statistics;

// Note: Always compiled so integration tests (in tests/) can use the fixtures
pub mod test_fixtures;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

// Re-export core types
pub use tandem_core::*;

pub use links::PgLinkRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use ratings::PgRatingRepository;
pub use statistics::PgStatisticsRepository;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub ratings: PgRatingRepository,
    pub links: PgLinkRepository,
    pub statistics: PgStatisticsRepository,
}

impl Database {
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            ratings: PgRatingRepository::new(pool.clone()),
            links: PgLinkRepository::new(pool.clone()),
            statistics: PgStatisticsRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect with the default pool configuration.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

// The combined context is itself a store, so engines can share one handle.

#[async_trait]
impl RatingRepository for Database {
    async fn get(&self, member_id: i64, product_id: i64, category_id: i64) -> Result<Option<Rating>> {
        self.ratings.get(member_id, product_id, category_id).await
    }

    async fn upsert(
        &self,
        member_id: i64,
        product_id: i64,
        category_id: i64,
        value: f64,
    ) -> Result<Option<f64>> {
        self.ratings
            .upsert(member_id, product_id, category_id, value)
            .await
    }

    async fn apply_click(
        &self,
        member_id: i64,
        product_id: i64,
        category_id: i64,
        values: &RatingValues,
    ) -> Result<Option<ClickUpdate>> {
        self.ratings
            .apply_click(member_id, product_id, category_id, values)
            .await
    }

    async fn delete(
        &self,
        member_id: i64,
        product_id: i64,
        category_id: i64,
    ) -> Result<Option<f64>> {
        self.ratings.delete(member_id, product_id, category_id).await
    }

    async fn delete_member(&self, member_id: i64, category_id: i64) -> Result<u64> {
        self.ratings.delete_member(member_id, category_id).await
    }

    async fn delete_product(&self, product_id: i64, category_id: i64) -> Result<u64> {
        self.ratings.delete_product(product_id, category_id).await
    }

    async fn convert_member(
        &self,
        from_member_id: i64,
        to_member_id: i64,
        clear: bool,
        category_id: i64,
    ) -> Result<()> {
        self.ratings
            .convert_member(from_member_id, to_member_id, clear, category_id)
            .await
    }

    async fn delete_observed_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.ratings.delete_observed_before(cutoff).await
    }

    async fn list_categories(&self) -> Result<Vec<i64>> {
        self.ratings.list_categories().await
    }

    async fn list_for_category(&self, category_id: i64, min_value: f64) -> Result<Vec<Rating>> {
        self.ratings.list_for_category(category_id, min_value).await
    }

    async fn list_for_member(&self, member_id: i64, category_id: i64) -> Result<Vec<Rating>> {
        self.ratings.list_for_member(member_id, category_id).await
    }

    async fn list_co_rated(
        &self,
        product_id: i64,
        category_id: i64,
        min_value: f64,
    ) -> Result<Vec<Rating>> {
        self.ratings
            .list_co_rated(product_id, category_id, min_value)
            .await
    }
}

#[async_trait]
impl LinkRepository for Database {
    async fn replace_category(&self, category_id: i64, links: Vec<Link>) -> Result<()> {
        self.links.replace_category(category_id, links).await
    }

    async fn replace_source(
        &self,
        category_id: i64,
        source_item: i64,
        links: Vec<Link>,
    ) -> Result<()> {
        self.links
            .replace_source(category_id, source_item, links)
            .await
    }

    async fn outgoing(&self, source_item: i64, category_id: i64) -> Result<Vec<Link>> {
        self.links.outgoing(source_item, category_id).await
    }

    async fn incoming(&self, target_item: i64, category_id: i64) -> Result<Vec<Link>> {
        self.links.incoming(target_item, category_id).await
    }

    async fn outgoing_from(&self, source_items: &[i64], category_id: i64) -> Result<Vec<Link>> {
        self.links.outgoing_from(source_items, category_id).await
    }

    async fn list_category(&self, category_id: i64) -> Result<Vec<Link>> {
        self.links.list_category(category_id).await
    }
}

#[async_trait]
impl StatisticsRepository for Database {
    async fn count_members(&self, category_id: i64) -> Result<i64> {
        self.statistics.count_members(category_id).await
    }

    async fn count_products(&self, category_id: i64) -> Result<i64> {
        self.statistics.count_products(category_id).await
    }

    async fn distribution(
        &self,
        category_id: i64,
        granularity: i64,
        scope: DistributionScope,
    ) -> Result<Vec<DistributionBucket>> {
        self.statistics
            .distribution(category_id, granularity, scope)
            .await
    }

    async fn rating_counts(
        &self,
        category_id: i64,
        threshold: f64,
        subject: RankSubject,
    ) -> Result<Vec<(i64, i64)>> {
        self.statistics
            .rating_counts(category_id, threshold, subject)
            .await
    }
}
