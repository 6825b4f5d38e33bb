//! Retention pruning of expired ratings.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use tandem_core::{EngineConfig, RatingRepository, Result, RetentionHorizon};

/// Deletes ratings older than the configured retention horizon.
#[derive(Clone)]
pub struct RetentionPruner {
    ratings: Arc<dyn RatingRepository>,
    horizon: Option<RetentionHorizon>,
}

impl RetentionPruner {
    pub fn new(ratings: Arc<dyn RatingRepository>, horizon: Option<RetentionHorizon>) -> Self {
        Self { ratings, horizon }
    }

    /// Build a pruner from the config's retention period.
    pub fn from_config(ratings: Arc<dyn RatingRepository>, config: &EngineConfig) -> Result<Self> {
        Ok(Self::new(ratings, config.retention_horizon()?))
    }

    pub fn horizon(&self) -> Option<RetentionHorizon> {
        self.horizon
    }

    /// Delete ratings expired as of now. Returns the number deleted.
    pub async fn prune_expired(&self) -> Result<u64> {
        self.prune_as_of(Utc::now()).await
    }

    /// Delete ratings expired as of `now`. No-op without a horizon.
    pub async fn prune_as_of(&self, now: DateTime<Utc>) -> Result<u64> {
        let Some(horizon) = self.horizon else {
            debug!(
                subsystem = "ratings",
                component = "retention",
                "Retention disabled; nothing pruned"
            );
            return Ok(0);
        };

        let cutoff = horizon.cutoff(now);
        let deleted = self.ratings.delete_observed_before(cutoff).await?;
        info!(
            subsystem = "ratings",
            component = "retention",
            op = "prune",
            horizon = %horizon,
            cutoff = %cutoff,
            rating_count = deleted,
            "Expired ratings pruned"
        );
        Ok(deleted)
    }
}
