//! Link aggregation.
//!
//! Links are computed in Rust from the ratings of one category and written
//! back through [`LinkRepository`], which replaces them atomically. Two
//! strategies exist:
//!
//! - [`LinkMode::Links`]: co-occurrence counts over ratings `>= threshold`.
//! - [`LinkMode::Slope`]: co-rating counts and summed rating differences over
//!   all non-negative ratings (slope-one).
//!
//! Writers are serialized per category so a batch rebuild never interleaves
//! with an incremental adjustment of the same category.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use tandem_core::{EngineConfig, Link, LinkMode, LinkRepository, Rating, RatingRepository, Result};

use crate::retention::RetentionPruner;

// =============================================================================
// ALGORITHM
// =============================================================================

/// Parameters of one aggregation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkParams {
    pub mode: LinkMode,
    pub threshold: f64,
    /// Maximum links per source item; `<= 0` keeps all of them.
    pub top_k: i64,
}

impl LinkParams {
    pub fn new(mode: LinkMode, threshold: f64, top_k: i64) -> Self {
        Self {
            mode,
            threshold,
            top_k,
        }
    }

    pub fn from_config(config: &EngineConfig, mode: LinkMode) -> Self {
        Self::new(mode, config.ratings.threshold, config.top_k)
    }

    /// Lowest rating value that contributes to a link in this mode.
    pub fn min_value(&self) -> f64 {
        match self.mode {
            LinkMode::Links => self.threshold,
            LinkMode::Slope => 0.0,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct PairStats {
    weight: i64,
    slope_sum: f64,
}

/// Accumulate pair statistics for every ordered pair of distinct products
/// sharing a member, optionally restricted to pairs leaving `only_source`.
fn accumulate(
    ratings: &[Rating],
    params: &LinkParams,
    only_source: Option<i64>,
) -> HashMap<(i64, i64), PairStats> {
    let min_value = params.min_value();

    // member -> product -> value; one value per key, the last one wins
    let mut by_member: HashMap<i64, BTreeMap<i64, f64>> = HashMap::new();
    for rating in ratings.iter().filter(|r| r.value >= min_value) {
        by_member
            .entry(rating.member_id)
            .or_default()
            .insert(rating.product_id, rating.value);
    }

    let mut pairs: HashMap<(i64, i64), PairStats> = HashMap::new();
    for products in by_member.values() {
        for (&source, &source_value) in products {
            if only_source.is_some_and(|only| only != source) {
                continue;
            }
            for (&target, &target_value) in products {
                if source == target {
                    continue;
                }
                let stats = pairs.entry((source, target)).or_default();
                stats.weight += 1;
                if params.mode == LinkMode::Slope {
                    stats.slope_sum += target_value - source_value;
                }
            }
        }
    }
    pairs
}

/// Order links by weight descending, target descending.
pub fn sort_by_weight(links: &mut [Link]) {
    links.sort_by(|a, b| {
        b.weight
            .cmp(&a.weight)
            .then_with(|| b.target_item.cmp(&a.target_item))
    });
}

fn trim(pairs: HashMap<(i64, i64), PairStats>, category_id: i64, top_k: i64) -> Vec<Link> {
    let mut by_source: BTreeMap<i64, Vec<Link>> = BTreeMap::new();
    for ((source, target), stats) in pairs {
        by_source.entry(source).or_default().push(Link {
            source_item: source,
            target_item: target,
            category_id,
            weight: stats.weight,
            slope_sum: stats.slope_sum,
        });
    }

    let mut links = Vec::new();
    for (_, mut outgoing) in by_source {
        sort_by_weight(&mut outgoing);
        if top_k > 0 {
            outgoing.truncate(top_k as usize);
        }
        links.extend(outgoing);
    }
    links
}

/// Compute the full link set of a category from its ratings.
///
/// The output is ordered by source ascending, then by weight descending and
/// target descending within each source.
pub fn compute_links(ratings: &[Rating], category_id: i64, params: &LinkParams) -> Vec<Link> {
    trim(accumulate(ratings, params, None), category_id, params.top_k)
}

/// Compute only the links leaving `source_item`.
///
/// `ratings` must contain every contributing rating of the members who
/// rated `source_item`; other ratings are ignored.
pub fn compute_source_links(
    ratings: &[Rating],
    source_item: i64,
    category_id: i64,
    params: &LinkParams,
) -> Vec<Link> {
    trim(
        accumulate(ratings, params, Some(source_item)),
        category_id,
        params.top_k,
    )
}

/// Whether a rating change warrants recomputing the product's links.
///
/// Co-occurrence links only change when the rating crosses the threshold.
/// Slope links change whenever either value is a positive rating.
pub fn is_material_change(mode: LinkMode, threshold: f64, new_value: f64, previous: f64) -> bool {
    match mode {
        LinkMode::Links => (new_value >= threshold) != (previous >= threshold),
        LinkMode::Slope => new_value > 0.0 || previous > 0.0,
    }
}

// =============================================================================
// AGGREGATOR
// =============================================================================

/// Outcome of rebuilding one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryRebuild {
    pub category_id: i64,
    pub rating_count: usize,
    pub link_count: usize,
}

/// A category whose rebuild failed and was rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryFailure {
    pub category_id: i64,
    pub error: String,
}

/// Result of a batch run over every category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub pruned: u64,
    pub rebuilt: Vec<CategoryRebuild>,
    pub failed: Vec<CategoryFailure>,
}

impl RebuildReport {
    /// Whether every category was rebuilt.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Per-category writer locks.
#[derive(Clone, Default)]
struct CategoryLocks {
    inner: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl CategoryLocks {
    async fn get(&self, category_id: i64) -> Arc<Mutex<()>> {
        self.inner
            .lock()
            .await
            .entry(category_id)
            .or_default()
            .clone()
    }
}

/// Computes and stores item links for categories.
#[derive(Clone)]
pub struct Aggregator {
    ratings: Arc<dyn RatingRepository>,
    links: Arc<dyn LinkRepository>,
    pruner: RetentionPruner,
    config: Arc<EngineConfig>,
    locks: CategoryLocks,
}

impl Aggregator {
    pub fn new(
        ratings: Arc<dyn RatingRepository>,
        links: Arc<dyn LinkRepository>,
        config: Arc<EngineConfig>,
    ) -> Result<Self> {
        let pruner = RetentionPruner::from_config(ratings.clone(), &config)?;
        Ok(Self {
            ratings,
            links,
            pruner,
            config,
            locks: CategoryLocks::default(),
        })
    }

    /// Recompute every link of a category and replace them atomically.
    ///
    /// On failure the store keeps the category's previous links and the
    /// error is returned unchanged.
    pub async fn rebuild_category(&self, category_id: i64, mode: LinkMode) -> Result<CategoryRebuild> {
        let start = Instant::now();
        let lock = self.locks.get(category_id).await;
        let _guard = lock.lock().await;

        let params = LinkParams::from_config(&self.config, mode);
        let ratings = self
            .ratings
            .list_for_category(category_id, params.min_value())
            .await?;
        let links = compute_links(&ratings, category_id, &params);
        let summary = CategoryRebuild {
            category_id,
            rating_count: ratings.len(),
            link_count: links.len(),
        };

        self.links.replace_category(category_id, links).await?;

        debug!(
            subsystem = "aggregator",
            op = "rebuild_category",
            category_id,
            mode = %mode,
            rating_count = summary.rating_count,
            link_count = summary.link_count,
            duration_ms = start.elapsed().as_millis() as u64,
            "Category links rebuilt"
        );
        Ok(summary)
    }

    /// Prune expired ratings, then rebuild every category concurrently.
    ///
    /// A category that fails is recorded in the report and does not stop the
    /// others. Pruning and category discovery failures are returned as errors.
    pub async fn rebuild_all(&self, mode: LinkMode) -> Result<RebuildReport> {
        let start = Instant::now();
        let pruned = self.pruner.prune_expired().await?;
        let categories = self.ratings.list_categories().await?;

        let outcomes = join_all(
            categories
                .iter()
                .map(|&category_id| async move {
                    (category_id, self.rebuild_category(category_id, mode).await)
                }),
        )
        .await;

        let mut report = RebuildReport {
            pruned,
            ..Default::default()
        };
        for (category_id, outcome) in outcomes {
            match outcome {
                Ok(summary) => report.rebuilt.push(summary),
                Err(e) => {
                    warn!(
                        subsystem = "aggregator",
                        op = "rebuild_all",
                        category_id,
                        error = %e,
                        "Category rebuild failed; previous links kept"
                    );
                    report.failed.push(CategoryFailure {
                        category_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            subsystem = "aggregator",
            op = "rebuild_all",
            mode = %mode,
            pruned,
            rebuilt = report.rebuilt.len(),
            failed = report.failed.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Link aggregation finished"
        );
        Ok(report)
    }

    /// Recompute the links leaving `product_id` after a rating change.
    ///
    /// Does nothing unless the change is material for `mode` (see
    /// [`is_material_change`]). Links of other items pointing at
    /// `product_id` are left as they are until the next batch rebuild.
    /// Returns whether links were recomputed.
    pub async fn adjust_incremental(
        &self,
        member_id: i64,
        product_id: i64,
        category_id: i64,
        mode: LinkMode,
        new_value: f64,
        previous: f64,
    ) -> Result<bool> {
        let params = LinkParams::from_config(&self.config, mode);
        if !is_material_change(mode, params.threshold, new_value, previous) {
            debug!(
                subsystem = "aggregator",
                op = "adjust_incremental",
                member_id,
                product_id,
                category_id,
                new_value,
                previous,
                "Rating change not material; links untouched"
            );
            return Ok(false);
        }

        let lock = self.locks.get(category_id).await;
        let _guard = lock.lock().await;

        let ratings = self
            .ratings
            .list_co_rated(product_id, category_id, params.min_value())
            .await?;
        let links = compute_source_links(&ratings, product_id, category_id, &params);
        let link_count = links.len();
        self.links
            .replace_source(category_id, product_id, links)
            .await?;

        debug!(
            subsystem = "aggregator",
            op = "adjust_incremental",
            member_id,
            product_id,
            category_id,
            mode = %mode,
            link_count,
            "Source links recomputed"
        );
        Ok(true)
    }
}
