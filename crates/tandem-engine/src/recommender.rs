//! Read-side recommendation queries over links and ratings.
//!
//! Every list query sorts deterministically (ties broken by id descending),
//! then applies the optional id filter, then truncates to the maximum count.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::trace;

use tandem_core::{
    EngineConfig, Link, LinkRepository, PredictedItem, QueryOptions, RatingRepository, Result,
    SlopedItem,
};

use crate::aggregator::sort_by_weight;

/// Clamp a predicted rating into `[0, 1]`.
pub fn clamp_rating(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Descending by score, then by id descending.
fn by_score_desc(a: (i64, f64), b: (i64, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| b.0.cmp(&a.0))
}

/// Running weighted sum for one predicted item.
#[derive(Debug, Default, Clone, Copy)]
struct Weighted {
    numerator: f64,
    weight: i64,
}

impl Weighted {
    fn add(&mut self, value: f64, weight: i64) {
        self.numerator += value;
        self.weight += weight;
    }

    fn ratio(&self) -> Option<f64> {
        (self.weight != 0).then(|| self.numerator / self.weight as f64)
    }
}

/// Recommendation query engine.
#[derive(Clone)]
pub struct Recommender {
    ratings: Arc<dyn RatingRepository>,
    links: Arc<dyn LinkRepository>,
    config: Arc<EngineConfig>,
}

impl Recommender {
    pub fn new(
        ratings: Arc<dyn RatingRepository>,
        links: Arc<dyn LinkRepository>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            ratings,
            links,
            config,
        }
    }

    fn default_max(&self) -> usize {
        self.config.items_max_return
    }

    /// Member's non-sentinel ratings keyed by product, plus every product
    /// the member rated at all.
    async fn member_profile(
        &self,
        member_id: i64,
        category_id: i64,
    ) -> Result<(HashMap<i64, f64>, HashSet<i64>)> {
        let ratings = self.ratings.list_for_member(member_id, category_id).await?;
        let rated = ratings.iter().map(|r| r.product_id).collect();
        let signals = ratings
            .into_iter()
            .filter(|r| r.is_signal())
            .map(|r| (r.product_id, r.value))
            .collect();
        Ok((signals, rated))
    }

    /// Items linked from `product_id`, heaviest first.
    pub async fn linked_items(&self, product_id: i64, opts: &QueryOptions) -> Result<Vec<i64>> {
        let mut links = self.links.outgoing(product_id, opts.category_id).await?;
        sort_by_weight(&mut links);
        let items = opts.select(
            links.into_iter().map(|l| l.target_item),
            |id: &i64| *id,
            self.default_max(),
        );
        trace!(product_id, result_count = items.len(), "linked items");
        Ok(items)
    }

    /// Items linked from `product_id` with their average rating difference,
    /// highest difference first. Links lighter than `opts.min_weight` are
    /// skipped.
    pub async fn sloped_items(&self, product_id: i64, opts: &QueryOptions) -> Result<Vec<SlopedItem>> {
        let links = self.links.outgoing(product_id, opts.category_id).await?;
        let mut scored: Vec<(i64, f64)> = links
            .iter()
            .filter(|l| l.weight >= opts.min_weight)
            .filter_map(|l| l.average_slope().map(|diff| (l.target_item, diff)))
            .collect();
        scored.sort_by(|a, b| by_score_desc(*a, *b));

        Ok(opts.select(
            scored
                .into_iter()
                .map(|(product_id, diff)| SlopedItem { product_id, diff }),
            |item: &SlopedItem| item.product_id,
            self.default_max(),
        ))
    }

    /// Items recommended to a member, best first.
    ///
    /// Each link from a rated item adds `weight * (rating - threshold)` to
    /// its target. Items the member already rated are excluded, as are
    /// targets whose score is not positive.
    pub async fn recommended_items(&self, member_id: i64, opts: &QueryOptions) -> Result<Vec<i64>> {
        let (signals, rated) = self.member_profile(member_id, opts.category_id).await?;
        if signals.is_empty() {
            return Ok(Vec::new());
        }

        let sources: Vec<i64> = signals.keys().copied().collect();
        let links = self.links.outgoing_from(&sources, opts.category_id).await?;
        let threshold = self.config.ratings.threshold;

        let mut scores: HashMap<i64, f64> = HashMap::new();
        for link in links.iter().filter(|l| !rated.contains(&l.target_item)) {
            let Some(rating) = signals.get(&link.source_item) else {
                continue;
            };
            *scores.entry(link.target_item).or_default() +=
                link.weight as f64 * (rating - threshold);
        }

        let mut ranked: Vec<(i64, f64)> = scores.into_iter().filter(|(_, s)| *s > 0.0).collect();
        ranked.sort_by(|a, b| by_score_desc(*a, *b));

        let items = opts.select(
            ranked.into_iter().map(|(id, _)| id),
            |id: &i64| *id,
            self.default_max(),
        );
        trace!(member_id, result_count = items.len(), "recommended items");
        Ok(items)
    }

    /// Items the member liked that link into `product_id`: why it was
    /// recommended. Heaviest link first.
    pub async fn trigger_items(
        &self,
        member_id: i64,
        product_id: i64,
        opts: &QueryOptions,
    ) -> Result<Vec<i64>> {
        let (signals, _) = self.member_profile(member_id, opts.category_id).await?;
        let threshold = self.config.ratings.threshold;

        let mut links: Vec<Link> = self
            .links
            .incoming(product_id, opts.category_id)
            .await?
            .into_iter()
            .filter(|l| l.weight > 0)
            .filter(|l| signals.get(&l.source_item).is_some_and(|v| *v >= threshold))
            .collect();
        links.sort_by(|a, b| {
            b.weight
                .cmp(&a.weight)
                .then_with(|| b.source_item.cmp(&a.source_item))
        });

        Ok(opts.select(
            links.into_iter().map(|l| l.source_item),
            |id: &i64| *id,
            self.default_max(),
        ))
    }

    /// Predicted rating of `product_id` for a member, clamped to `[0, 1]`.
    ///
    /// Uses the links leaving `product_id` towards items the member rated:
    /// `sum(rating(target) * weight - slope_sum) / sum(weight)`. Every
    /// rating counts here, not-interested markers included. Returns `None`
    /// when no such link carries weight.
    pub async fn predicted_rate(
        &self,
        member_id: i64,
        product_id: i64,
        category_id: i64,
    ) -> Result<Option<f64>> {
        let rated: HashMap<i64, f64> = self
            .ratings
            .list_for_member(member_id, category_id)
            .await?
            .into_iter()
            .map(|r| (r.product_id, r.value))
            .collect();
        if rated.is_empty() {
            return Ok(None);
        }

        let links = self.links.outgoing(product_id, category_id).await?;
        let mut acc = Weighted::default();
        for link in &links {
            if let Some(rating) = rated.get(&link.target_item) {
                acc.add(rating * link.weight as f64 - link.slope_sum, link.weight);
            }
        }
        Ok(acc.ratio().map(clamp_rating))
    }

    /// Predicted ratings for every item reachable from the member's ratings
    /// that the member has not rated yet, highest first.
    ///
    /// Per target: `sum(rating(source) * weight + slope_sum) / sum(weight)`
    /// over links from rated sources, each value clamped to `[0, 1]`.
    pub async fn predicted_all(
        &self,
        member_id: i64,
        opts: &QueryOptions,
    ) -> Result<Vec<PredictedItem>> {
        let (signals, rated) = self.member_profile(member_id, opts.category_id).await?;
        if signals.is_empty() {
            return Ok(Vec::new());
        }

        let sources: Vec<i64> = signals.keys().copied().collect();
        let links = self.links.outgoing_from(&sources, opts.category_id).await?;

        let mut sums: HashMap<i64, Weighted> = HashMap::new();
        for link in links
            .iter()
            .filter(|l| l.weight != 0 && !rated.contains(&l.target_item))
        {
            let Some(rating) = signals.get(&link.source_item) else {
                continue;
            };
            sums.entry(link.target_item)
                .or_default()
                .add(rating * link.weight as f64 + link.slope_sum, link.weight);
        }

        let mut predicted: Vec<(i64, f64)> = sums
            .into_iter()
            .filter_map(|(id, acc)| acc.ratio().map(|v| (id, clamp_rating(v))))
            .collect();
        predicted.sort_by(|a, b| by_score_desc(*a, *b));

        Ok(opts.select(
            predicted
                .into_iter()
                .map(|(product_id, rating)| PredictedItem { product_id, rating }),
            |item: &PredictedItem| item.product_id,
            self.default_max(),
        ))
    }
}
