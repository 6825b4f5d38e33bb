//! Rating mutations and the real-time link trigger.

use std::sync::Arc;

use tracing::debug;

use tandem_core::defaults::RATING_ABSENT;
use tandem_core::{EngineConfig, Error, LinkMode, Rating, RatingRepository, Result};

use crate::aggregator::Aggregator;
use crate::retention::RetentionPruner;

/// Records member ratings and keeps links current when real-time updates
/// are enabled.
#[derive(Clone)]
pub struct RatingService {
    ratings: Arc<dyn RatingRepository>,
    aggregator: Aggregator,
    pruner: RetentionPruner,
    config: Arc<EngineConfig>,
}

impl RatingService {
    pub fn new(
        ratings: Arc<dyn RatingRepository>,
        aggregator: Aggregator,
        config: Arc<EngineConfig>,
    ) -> Result<Self> {
        let pruner = RetentionPruner::from_config(ratings.clone(), &config)?;
        Ok(Self {
            ratings,
            aggregator,
            pruner,
            config,
        })
    }

    /// Mode of incremental updates, `None` when both are disabled.
    /// Co-occurrence takes precedence when both flags are set.
    fn realtime_mode(&self) -> Option<LinkMode> {
        if self.config.realtime_link {
            Some(LinkMode::Links)
        } else if self.config.realtime_slope {
            Some(LinkMode::Slope)
        } else {
            None
        }
    }

    async fn after_change(
        &self,
        member_id: i64,
        product_id: i64,
        category_id: i64,
        new_value: f64,
        previous: f64,
    ) -> Result<()> {
        if let Some(mode) = self.realtime_mode() {
            self.aggregator
                .adjust_incremental(member_id, product_id, category_id, mode, new_value, previous)
                .await?;
        }
        Ok(())
    }

    /// Fetch a rating. The not-interested sentinel is only returned when
    /// `include_not_interested` is set.
    pub async fn get_rating(
        &self,
        member_id: i64,
        product_id: i64,
        category_id: i64,
        include_not_interested: bool,
    ) -> Result<Option<Rating>> {
        let rating = self.ratings.get(member_id, product_id, category_id).await?;
        Ok(rating.filter(|r| include_not_interested || r.is_signal()))
    }

    /// Insert or replace a rating.
    pub async fn set_rating(
        &self,
        member_id: i64,
        product_id: i64,
        value: f64,
        category_id: i64,
    ) -> Result<()> {
        if !value.is_finite() {
            return Err(Error::InvalidInput(format!(
                "rating value must be finite, got {}",
                value
            )));
        }

        let previous = self
            .ratings
            .upsert(member_id, product_id, category_id, value)
            .await?;
        debug!(
            subsystem = "ratings",
            op = "set_rating",
            member_id,
            product_id,
            category_id,
            value,
            previous = ?previous,
            "Rating recorded"
        );

        self.after_change(
            member_id,
            product_id,
            category_id,
            value,
            previous.unwrap_or(RATING_ABSENT),
        )
        .await
    }

    /// Record a click or purchase.
    ///
    /// A purchase sets the purchased rating. A first click sets the initial
    /// click rating; later clicks raise it by the click increment up to the
    /// purchased rating. A not-interested marker is replaced by the initial
    /// click rating.
    pub async fn automatic_rating(
        &self,
        member_id: i64,
        product_id: i64,
        purchase: bool,
        category_id: i64,
    ) -> Result<()> {
        let values = &self.config.ratings;
        if purchase {
            return self
                .set_rating(member_id, product_id, values.purchased, category_id)
                .await;
        }

        let Some(update) = self
            .ratings
            .apply_click(member_id, product_id, category_id, values)
            .await?
        else {
            return Ok(());
        };
        debug!(
            subsystem = "ratings",
            op = "automatic_rating",
            member_id,
            product_id,
            category_id,
            value = update.value,
            previous = ?update.previous,
            "Click recorded"
        );

        self.after_change(
            member_id,
            product_id,
            category_id,
            update.value,
            update.previous.unwrap_or(RATING_ABSENT),
        )
        .await
    }

    /// Mark a product as explicitly not interesting to the member.
    pub async fn set_not_interested(
        &self,
        member_id: i64,
        product_id: i64,
        category_id: i64,
    ) -> Result<()> {
        self.set_rating(
            member_id,
            product_id,
            self.config.ratings.not_interested,
            category_id,
        )
        .await
    }

    /// Delete one rating. Returns the number of ratings removed.
    pub async fn delete_rating(&self, member_id: i64, product_id: i64, category_id: i64) -> Result<u64> {
        let Some(previous) = self
            .ratings
            .delete(member_id, product_id, category_id)
            .await?
        else {
            return Ok(0);
        };
        self.after_change(member_id, product_id, category_id, RATING_ABSENT, previous)
            .await?;
        Ok(1)
    }

    /// Delete every rating of a member in a category.
    pub async fn delete_member_ratings(&self, member_id: i64, category_id: i64) -> Result<u64> {
        self.ratings.delete_member(member_id, category_id).await
    }

    /// Delete every rating of a product in a category.
    pub async fn delete_product_ratings(&self, product_id: i64, category_id: i64) -> Result<u64> {
        self.ratings.delete_product(product_id, category_id).await
    }

    /// Move a member's ratings onto another member, e.g. when an anonymous
    /// visitor signs in. The target's ratings of the same products are
    /// replaced; `clear` removes the source member's ratings.
    pub async fn convert_member(
        &self,
        from_member_id: i64,
        to_member_id: i64,
        clear: bool,
        category_id: i64,
    ) -> Result<()> {
        if from_member_id == to_member_id {
            return Err(Error::InvalidInput(format!(
                "cannot convert member {} onto itself",
                from_member_id
            )));
        }
        self.ratings
            .convert_member(from_member_id, to_member_id, clear, category_id)
            .await
    }

    /// Delete ratings older than the retention horizon.
    pub async fn delete_outdated_ratings(&self) -> Result<u64> {
        self.pruner.prune_expired().await
    }
}
