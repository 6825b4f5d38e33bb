//! Rating statistics.

use std::sync::Arc;

use tandem_core::{
    DistributionBucket, DistributionOptions, DistributionScope, Error, Result, StatisticsRepository,
};

/// Counts and rating distributions of a category.
#[derive(Clone)]
pub struct Statistics {
    statistics: Arc<dyn StatisticsRepository>,
}

impl Statistics {
    pub fn new(statistics: Arc<dyn StatisticsRepository>) -> Self {
        Self { statistics }
    }

    /// Members that rated at least one product.
    pub async fn count_members(&self, category_id: i64) -> Result<i64> {
        self.statistics.count_members(category_id).await
    }

    /// Products that were rated at least once.
    pub async fn count_products(&self, category_id: i64) -> Result<i64> {
        self.statistics.count_products(category_id).await
    }

    /// Distribution of every non-negative rating in the category.
    pub async fn distribution(&self, opts: &DistributionOptions) -> Result<Vec<DistributionBucket>> {
        self.scoped(opts, DistributionScope::All).await
    }

    pub async fn distribution_member(
        &self,
        member_id: i64,
        opts: &DistributionOptions,
    ) -> Result<Vec<DistributionBucket>> {
        self.scoped(opts, DistributionScope::Member(member_id))
            .await
    }

    pub async fn distribution_product(
        &self,
        product_id: i64,
        opts: &DistributionOptions,
    ) -> Result<Vec<DistributionBucket>> {
        self.scoped(opts, DistributionScope::Product(product_id))
            .await
    }

    async fn scoped(
        &self,
        opts: &DistributionOptions,
        scope: DistributionScope,
    ) -> Result<Vec<DistributionBucket>> {
        if opts.granularity <= 0 {
            return Err(Error::InvalidInput(format!(
                "granularity must be positive, got {}",
                opts.granularity
            )));
        }
        let mut buckets = self
            .statistics
            .distribution(opts.category_id, opts.granularity, scope)
            .await?;
        buckets.sort_by(|a, b| b.value.cmp(&a.value));
        Ok(buckets)
    }
}
