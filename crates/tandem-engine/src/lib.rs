//! # tandem-engine
//!
//! Link aggregation and recommendation engines for tandem.
//!
//! This crate provides:
//! - Co-occurrence and slope-one link aggregation, batch and incremental
//! - Retention pruning of expired ratings
//! - Recommendation, trigger and prediction queries
//! - Dense-ranked product and member leaderboards
//! - The rating mutation API with real-time link updates
//! - An in-memory store implementing every storage trait
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tandem_core::{EngineConfig, LinkMode, QueryOptions};
//! use tandem_db::Database;
//! use tandem_engine::Engine;
//!
//! let db = Arc::new(Database::connect("postgres://...").await?);
//! let engine = Engine::new(db, EngineConfig::from_env()?)?;
//!
//! engine.ratings.automatic_rating(7, 1001, false, 1).await?;
//! let report = engine.aggregator.rebuild_all(LinkMode::Links).await?;
//! let items = engine.recommender.recommended_items(7, &QueryOptions::new()).await?;
//! ```

pub mod aggregator;
pub mod memory;
pub mod ranking;
pub mod ratings;
pub mod recommender;
pub mod retention;
pub mod statistics;

use std::sync::Arc;

// Re-export core types
pub use tandem_core::*;

pub use aggregator::{
    compute_links, compute_source_links, is_material_change, Aggregator, CategoryFailure,
    CategoryRebuild, LinkParams, RebuildReport,
};
pub use ranking::{assign_ranks, RankingEngine};
pub use ratings::RatingService;
pub use recommender::{clamp_rating, Recommender};
pub use retention::RetentionPruner;
pub use statistics::Statistics;

/// Every engine wired to one store and one configuration.
#[derive(Clone)]
pub struct Engine {
    config: Arc<EngineConfig>,
    /// Batch and incremental link aggregation.
    pub aggregator: Aggregator,
    /// Recommendation and prediction queries.
    pub recommender: Recommender,
    /// Product and member leaderboards.
    pub ranking: RankingEngine,
    /// Rating mutations.
    pub ratings: RatingService,
    /// Counts and distributions.
    pub statistics: Statistics,
}

impl Engine {
    /// Build all engines over a store implementing every storage trait.
    ///
    /// Fails when the configuration is invalid.
    pub fn new<S>(store: Arc<S>, config: EngineConfig) -> Result<Self>
    where
        S: RatingRepository + LinkRepository + StatisticsRepository + 'static,
    {
        config.validate()?;
        let config = Arc::new(config);
        let ratings: Arc<dyn RatingRepository> = store.clone();
        let links: Arc<dyn LinkRepository> = store.clone();
        let statistics: Arc<dyn StatisticsRepository> = store;

        let aggregator = Aggregator::new(ratings.clone(), links.clone(), config.clone())?;
        Ok(Self {
            recommender: Recommender::new(ratings.clone(), links, config.clone()),
            ranking: RankingEngine::new(statistics.clone(), config.clone()),
            ratings: RatingService::new(ratings, aggregator.clone(), config.clone())?,
            statistics: Statistics::new(statistics),
            aggregator,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Scheduled batch entry point: prune, then rebuild every category in
    /// the configured mode.
    pub async fn run_batch(&self) -> Result<RebuildReport> {
        self.aggregator.rebuild_all(self.config.mode).await
    }
}
