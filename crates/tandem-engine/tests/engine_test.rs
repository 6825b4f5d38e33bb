//! Integration tests for the engine façade over the in-memory store.
//!
//! This test suite validates:
//! - Batch aggregation in both modes, idempotence and top-K selection
//! - Recommendation, trigger and prediction queries
//! - Retention pruning
//! - Real-time link updates on threshold crossings
//! - Rollback of a failed category during a batch run
//! - Per-category serialization of link writers
//! - Rating mutations, statistics and rankings

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Months, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tandem_engine::aggregator::sort_by_weight;
use tandem_engine::memory::InMemoryStore;
use tandem_engine::{
    Aggregator, DistributionOptions, Engine, EngineConfig, Error, IdFilter, Link, LinkMode,
    LinkRepository, QueryOptions, RankingOptions, Rating, Result, RetentionHorizon,
    RetentionPruner,
};

// ============================================================================
// HELPERS
// ============================================================================

fn setup(config: EngineConfig) -> (Arc<InMemoryStore>, Engine) {
    let store = Arc::new(InMemoryStore::new());
    let engine = Engine::new(store.clone(), config).expect("valid config");
    (store, engine)
}

fn link(source: i64, target: i64, weight: i64, slope_sum: f64) -> Link {
    Link {
        source_item: source,
        target_item: target,
        category_id: 1,
        weight,
        slope_sum,
    }
}

async fn targets(store: &InMemoryStore, source: i64) -> Vec<i64> {
    let mut links = store.outgoing(source, 1).await.expect("outgoing");
    links.sort_by_key(|l| l.target_item);
    links.into_iter().map(|l| l.target_item).collect()
}

/// Link store over an [`InMemoryStore`] that holds every write open for
/// `write_delay`, counts overlapping writes and rejects writes on request.
struct TrackedLinks {
    inner: Arc<InMemoryStore>,
    write_delay: Duration,
    rejections: AtomicUsize,
    active: Mutex<HashMap<i64, usize>>,
    peak_per_category: AtomicUsize,
    peak_total: AtomicUsize,
}

impl TrackedLinks {
    fn new(inner: Arc<InMemoryStore>, write_delay: Duration) -> Self {
        Self {
            inner,
            write_delay,
            rejections: AtomicUsize::new(0),
            active: Mutex::new(HashMap::new()),
            peak_per_category: AtomicUsize::new(0),
            peak_total: AtomicUsize::new(0),
        }
    }

    fn reject_next(&self, n: usize) {
        self.rejections.store(n, Ordering::SeqCst);
    }

    fn peak_per_category(&self) -> usize {
        self.peak_per_category.load(Ordering::SeqCst)
    }

    fn peak_total(&self) -> usize {
        self.peak_total.load(Ordering::SeqCst)
    }

    async fn tracked(
        &self,
        category_id: i64,
        write: impl Future<Output = Result<()>>,
    ) -> Result<()> {
        let rejected = self
            .rejections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(Error::Internal("link write rejected".to_string()));
        }

        {
            let mut active = self.active.lock().unwrap();
            let count = active.entry(category_id).or_default();
            *count += 1;
            self.peak_per_category.fetch_max(*count, Ordering::SeqCst);
            let total: usize = active.values().sum();
            self.peak_total.fetch_max(total, Ordering::SeqCst);
        }

        tokio::time::sleep(self.write_delay).await;
        let result = write.await;

        *self.active.lock().unwrap().entry(category_id).or_default() -= 1;
        result
    }
}

#[async_trait]
impl LinkRepository for TrackedLinks {
    async fn replace_category(&self, category_id: i64, links: Vec<Link>) -> Result<()> {
        self.tracked(category_id, self.inner.replace_category(category_id, links))
            .await
    }

    async fn replace_source(
        &self,
        category_id: i64,
        source_item: i64,
        links: Vec<Link>,
    ) -> Result<()> {
        self.tracked(
            category_id,
            self.inner.replace_source(category_id, source_item, links),
        )
        .await
    }

    async fn outgoing(&self, source_item: i64, category_id: i64) -> Result<Vec<Link>> {
        self.inner.outgoing(source_item, category_id).await
    }

    async fn incoming(&self, target_item: i64, category_id: i64) -> Result<Vec<Link>> {
        self.inner.incoming(target_item, category_id).await
    }

    async fn outgoing_from(&self, source_items: &[i64], category_id: i64) -> Result<Vec<Link>> {
        self.inner.outgoing_from(source_items, category_id).await
    }

    async fn list_category(&self, category_id: i64) -> Result<Vec<Link>> {
        self.inner.list_category(category_id).await
    }
}

fn tracked_aggregator(
    store: &Arc<InMemoryStore>,
    write_delay: Duration,
) -> (Arc<TrackedLinks>, Aggregator) {
    let links = Arc::new(TrackedLinks::new(store.clone(), write_delay));
    let aggregator = Aggregator::new(
        store.clone(),
        links.clone(),
        Arc::new(EngineConfig::default()),
    )
    .expect("valid config");
    (links, aggregator)
}

// ============================================================================
// AGGREGATION
// ============================================================================

#[tokio::test]
async fn test_rebuild_links_two_products() {
    let (_store, engine) = setup(EngineConfig::default());
    engine.ratings.set_rating(1, 10, 0.8, 1).await.unwrap();
    engine.ratings.set_rating(1, 20, 0.9, 1).await.unwrap();

    let report = engine.aggregator.rebuild_all(LinkMode::Links).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.pruned, 0);
    assert_eq!(report.rebuilt.len(), 1);
    assert_eq!(report.rebuilt[0].link_count, 2);

    let opts = QueryOptions::new();
    assert_eq!(engine.recommender.linked_items(10, &opts).await.unwrap(), vec![20]);
    assert_eq!(engine.recommender.linked_items(20, &opts).await.unwrap(), vec![10]);
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let (store, engine) = setup(EngineConfig::default());
    store
        .seed_ratings([
            Rating::new(1, 10, 1, 0.9),
            Rating::new(1, 20, 1, 0.8),
            Rating::new(2, 10, 1, 0.7),
            Rating::new(2, 30, 1, 1.0),
            Rating::new(3, 20, 1, 0.9),
            Rating::new(3, 30, 1, 0.9),
        ])
        .await;

    engine.aggregator.rebuild_category(1, LinkMode::Links).await.unwrap();
    let first = store.list_category(1).await.unwrap();
    engine.aggregator.rebuild_category(1, LinkMode::Links).await.unwrap();
    let second = store.list_category(1).await.unwrap();

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_top_k_matches_brute_force() {
    let top_k = 4;
    let (store, engine) = setup(EngineConfig::default().with_top_k(top_k));
    let mut rng = StdRng::seed_from_u64(7);

    let mut ratings = Vec::new();
    for member in 0..40 {
        for product in 0..15 {
            if rng.gen_bool(0.3) {
                ratings.push(Rating::new(member, product, 1, rng.gen_range(0.0..1.0)));
            }
        }
    }
    store.seed_ratings(ratings.clone()).await;
    engine.aggregator.rebuild_category(1, LinkMode::Links).await.unwrap();

    // member -> liked products
    let mut liked: HashMap<i64, Vec<i64>> = HashMap::new();
    for r in ratings.iter().filter(|r| r.value >= 0.66) {
        liked.entry(r.member_id).or_default().push(r.product_id);
    }

    for source in 0..15 {
        let mut weights: HashMap<i64, i64> = HashMap::new();
        for products in liked.values().filter(|p| p.contains(&source)) {
            for &target in products.iter().filter(|&&t| t != source) {
                *weights.entry(target).or_default() += 1;
            }
        }
        let mut expected: Vec<(i64, i64)> = weights.into_iter().collect();
        expected.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        expected.truncate(top_k as usize);

        let mut stored = store.outgoing(source, 1).await.unwrap();
        sort_by_weight(&mut stored);
        let actual: Vec<(i64, i64)> = stored.iter().map(|l| (l.target_item, l.weight)).collect();
        assert_eq!(actual, expected, "source {}", source);
    }
}

#[tokio::test]
async fn test_slope_rebuild_and_sloped_items() {
    let (store, engine) = setup(EngineConfig::default());
    store
        .seed_ratings([Rating::new(1, 1, 1, 0.6), Rating::new(1, 2, 1, 0.9)])
        .await;

    engine.aggregator.rebuild_all(LinkMode::Slope).await.unwrap();

    let items = engine
        .recommender
        .sloped_items(1, &QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product_id, 2);
    assert!((items[0].diff - 0.3).abs() < 1e-9);

    // Links lighter than the minimum weight are skipped.
    let none = engine
        .recommender
        .sloped_items(1, &QueryOptions::new().min_weight(2))
        .await
        .unwrap();
    assert!(none.is_empty());
}

// ============================================================================
// QUERIES
// ============================================================================

async fn seed_recommendation_graph(store: &InMemoryStore) {
    store
        .seed_ratings([Rating::new(100, 1, 1, 1.0), Rating::new(100, 2, 1, 0.8)])
        .await;
    store
        .replace_category(
            1,
            vec![
                link(1, 2, 5, 0.0),
                link(1, 3, 3, 0.0),
                link(1, 4, 1, 0.0),
                link(2, 3, 1, 0.0),
                link(2, 5, 2, 0.0),
            ],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_recommended_items_order_filter_and_max() {
    let (store, engine) = setup(EngineConfig::default());
    seed_recommendation_graph(&store).await;

    let all = engine
        .recommender
        .recommended_items(100, &QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(all, vec![3, 4, 5]);

    let filtered = engine
        .recommender
        .recommended_items(100, &QueryOptions::new().filter(IdFilter::new([4, 5])))
        .await
        .unwrap();
    assert_eq!(filtered, vec![4, 5]);

    let capped = engine
        .recommender
        .recommended_items(100, &QueryOptions::new().max(1))
        .await
        .unwrap();
    assert_eq!(capped, vec![3]);

    let unknown = engine
        .recommender
        .recommended_items(999, &QueryOptions::new())
        .await
        .unwrap();
    assert!(unknown.is_empty());
}

#[tokio::test]
async fn test_trigger_items() {
    let (store, engine) = setup(EngineConfig::default());
    seed_recommendation_graph(&store).await;
    store.seed_rating(Rating::new(101, 1, 1, 0.5)).await;

    let triggers = engine
        .recommender
        .trigger_items(100, 3, &QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(triggers, vec![1, 2]);

    // Ratings below the threshold never trigger.
    let weak = engine
        .recommender
        .trigger_items(101, 3, &QueryOptions::new())
        .await
        .unwrap();
    assert!(weak.is_empty());
}

#[tokio::test]
async fn test_predicted_rate_is_clamped() {
    let (store, engine) = setup(EngineConfig::default());
    store.seed_rating(Rating::new(1, 7, 1, 1.0)).await;
    store
        .replace_category(1, vec![link(5, 7, 1, -0.5), link(6, 7, 1, 2.0)])
        .await
        .unwrap();

    let high = engine.recommender.predicted_rate(1, 5, 1).await.unwrap();
    assert_eq!(high, Some(1.0));

    let low = engine.recommender.predicted_rate(1, 6, 1).await.unwrap();
    assert_eq!(low, Some(0.0));

    // No link from item 8 towards a rated item.
    let none = engine.recommender.predicted_rate(1, 8, 1).await.unwrap();
    assert_eq!(none, None);
}

#[tokio::test]
async fn test_predicted_rate_counts_not_interested_ratings() {
    let (store, engine) = setup(EngineConfig::default());
    store.seed_rating(Rating::new(1, 7, 1, -1.0)).await;
    store
        .replace_category(1, vec![link(5, 7, 1, -1.5)])
        .await
        .unwrap();

    // (-1.0 * 1 - (-1.5)) / 1
    let predicted = engine.recommender.predicted_rate(1, 5, 1).await.unwrap();
    assert_eq!(predicted, Some(0.5));
}

#[tokio::test]
async fn test_predicted_all() {
    let (store, engine) = setup(EngineConfig::default());
    store.seed_rating(Rating::new(1, 1, 1, 0.8)).await;
    store
        .replace_category(
            1,
            vec![link(1, 2, 2, 0.2), link(1, 3, 1, -0.5), link(1, 4, 0, 0.0)],
        )
        .await
        .unwrap();

    let predicted = engine
        .recommender
        .predicted_all(1, &QueryOptions::new())
        .await
        .unwrap();
    let ids: Vec<i64> = predicted.iter().map(|p| p.product_id).collect();
    assert_eq!(ids, vec![2, 3]);
    assert!((predicted[0].rating - 0.9).abs() < 1e-9);
    assert!((predicted[1].rating - 0.3).abs() < 1e-9);
}

// ============================================================================
// RETENTION
// ============================================================================

#[tokio::test]
async fn test_retention_prunes_only_expired() {
    let (store, engine) = setup(EngineConfig::default());
    let now = Utc::now();
    store
        .seed_ratings([
            Rating::new(1, 1, 1, 0.9).observed_at(now - Months::new(7)),
            Rating::new(1, 2, 1, 0.9).observed_at(now - Months::new(5)),
        ])
        .await;

    let report = engine.aggregator.rebuild_all(LinkMode::Links).await.unwrap();
    assert_eq!(report.pruned, 1);

    let remaining = store.all_ratings().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].product_id, 2);
}

#[tokio::test]
async fn test_pruner_as_of_fixed_instant() {
    let store = Arc::new(InMemoryStore::new());
    let now = Utc::now();
    store
        .seed_ratings([
            Rating::new(1, 1, 1, 0.9).observed_at(now - Months::new(7)),
            Rating::new(1, 2, 1, 0.9).observed_at(now - Months::new(5)),
            Rating::new(1, 3, 1, 0.9).observed_at(now - Months::new(2)),
        ])
        .await;

    let horizon: RetentionHorizon = "-3 months".parse().unwrap();
    let pruner = RetentionPruner::new(store.clone(), Some(horizon));
    assert_eq!(pruner.prune_as_of(now).await.unwrap(), 2);

    let disabled = RetentionPruner::new(store.clone(), None);
    assert_eq!(disabled.prune_as_of(now).await.unwrap(), 0);
    assert_eq!(store.all_ratings().await.len(), 1);
}

// ============================================================================
// REAL-TIME UPDATES
// ============================================================================

#[tokio::test]
async fn test_realtime_links_follow_threshold_crossings() {
    let (store, engine) = setup(EngineConfig::default().with_realtime_link(true));

    engine.ratings.set_rating(1, 10, 0.8, 1).await.unwrap();
    engine.ratings.set_rating(1, 20, 0.9, 1).await.unwrap();
    engine.ratings.set_rating(1, 30, 0.7, 1).await.unwrap();
    assert_eq!(targets(&store, 30).await, vec![10, 20]);

    store.replace_category(1, Vec::new()).await.unwrap();

    // Above threshold before and after: links untouched.
    engine.ratings.set_rating(1, 10, 0.9, 1).await.unwrap();
    assert!(targets(&store, 10).await.is_empty());

    // Drop below, then rise above again.
    engine.ratings.set_rating(1, 10, 0.2, 1).await.unwrap();
    assert!(targets(&store, 10).await.is_empty());
    engine.ratings.set_rating(1, 10, 0.9, 1).await.unwrap();
    assert_eq!(targets(&store, 10).await, vec![20, 30]);
}

#[tokio::test]
async fn test_adjust_incremental_reports_material_changes() {
    let (store, engine) = setup(EngineConfig::default());
    store
        .seed_ratings([Rating::new(1, 1, 1, 0.9), Rating::new(1, 2, 1, 0.9)])
        .await;

    let skipped = engine
        .aggregator
        .adjust_incremental(1, 2, 1, LinkMode::Links, 0.9, 0.8)
        .await
        .unwrap();
    assert!(!skipped);
    assert!(targets(&store, 2).await.is_empty());

    let applied = engine
        .aggregator
        .adjust_incremental(1, 2, 1, LinkMode::Links, 0.9, -1.0)
        .await
        .unwrap();
    assert!(applied);
    assert_eq!(targets(&store, 2).await, vec![1]);
}

#[tokio::test]
async fn test_realtime_disabled_leaves_links() {
    let (store, engine) = setup(EngineConfig::default());
    engine.ratings.set_rating(1, 10, 0.8, 1).await.unwrap();
    engine.ratings.set_rating(1, 20, 0.9, 1).await.unwrap();
    assert!(store.list_category(1).await.unwrap().is_empty());
}

// ============================================================================
// ROLLBACK
// ============================================================================

#[tokio::test]
async fn test_failed_category_keeps_previous_links() {
    let store = Arc::new(InMemoryStore::new());
    let (links, aggregator) = tracked_aggregator(&store, Duration::ZERO);
    for category in [1, 2] {
        store
            .seed_ratings([
                Rating::new(1, 10, category, 0.9),
                Rating::new(1, 20, category, 0.9),
            ])
            .await;
    }
    aggregator.rebuild_all(LinkMode::Links).await.unwrap();
    let before: HashMap<i64, Vec<Link>> = HashMap::from([
        (1, store.list_category(1).await.unwrap()),
        (2, store.list_category(2).await.unwrap()),
    ]);

    for category in [1, 2] {
        store.seed_rating(Rating::new(1, 30, category, 0.9)).await;
    }
    links.reject_next(1);
    let report = aggregator.rebuild_all(LinkMode::Links).await.unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.rebuilt.len(), 1);

    let failed = report.failed[0].category_id;
    let rebuilt = report.rebuilt[0].category_id;
    assert_ne!(failed, rebuilt);
    assert_eq!(store.list_category(failed).await.unwrap(), before[&failed]);
    assert_eq!(store.list_category(rebuilt).await.unwrap().len(), 6);
}

// ============================================================================
// WRITER SERIALIZATION
// ============================================================================

#[tokio::test]
async fn test_link_writers_serialize_per_category() {
    let store = Arc::new(InMemoryStore::new());
    for category in [1, 2] {
        store
            .seed_ratings([
                Rating::new(1, 10, category, 0.9),
                Rating::new(1, 20, category, 0.9),
            ])
            .await;
    }
    let (links, aggregator) = tracked_aggregator(&store, Duration::from_millis(20));

    let (rebuilt, adjusted, other) = tokio::join!(
        aggregator.rebuild_category(1, LinkMode::Links),
        aggregator.adjust_incremental(1, 10, 1, LinkMode::Links, 0.9, -1.0),
        aggregator.rebuild_category(2, LinkMode::Links),
    );
    rebuilt.unwrap();
    assert!(adjusted.unwrap());
    other.unwrap();

    // Same category never overlaps; the other category ran alongside.
    assert_eq!(links.peak_per_category(), 1);
    assert_eq!(links.peak_total(), 2);
    assert_eq!(store.list_category(1).await.unwrap().len(), 2);
    assert_eq!(store.list_category(2).await.unwrap().len(), 2);
}

// ============================================================================
// RATINGS
// ============================================================================

#[tokio::test]
async fn test_automatic_rating_progression() {
    let (_store, engine) = setup(EngineConfig::default());
    let value = |r: Option<Rating>| r.map(|r| r.value);

    engine.ratings.automatic_rating(1, 5, false, 1).await.unwrap();
    let first = engine.ratings.get_rating(1, 5, 1, false).await.unwrap();
    assert_eq!(value(first), Some(0.7));

    engine.ratings.automatic_rating(1, 5, false, 1).await.unwrap();
    let second = value(engine.ratings.get_rating(1, 5, 1, false).await.unwrap()).unwrap();
    assert!((second - 0.71).abs() < 1e-9);

    engine.ratings.automatic_rating(1, 5, true, 1).await.unwrap();
    engine.ratings.automatic_rating(1, 5, false, 1).await.unwrap();
    let capped = engine.ratings.get_rating(1, 5, 1, false).await.unwrap();
    assert_eq!(value(capped), Some(1.0));

    engine.ratings.set_not_interested(1, 5, 1).await.unwrap();
    assert!(engine.ratings.get_rating(1, 5, 1, false).await.unwrap().is_none());
    let marker = engine.ratings.get_rating(1, 5, 1, true).await.unwrap();
    assert_eq!(value(marker), Some(-1.0));

    engine.ratings.automatic_rating(1, 5, false, 1).await.unwrap();
    let reset = engine.ratings.get_rating(1, 5, 1, false).await.unwrap();
    assert_eq!(value(reset), Some(0.7));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clicks_are_not_lost() {
    let (_store, engine) = setup(EngineConfig::default());
    engine.ratings.automatic_rating(1, 5, false, 1).await.unwrap();

    let clicks: Vec<_> = (0..20)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.ratings.automatic_rating(1, 5, false, 1).await })
        })
        .collect();
    for click in clicks {
        click.await.unwrap().unwrap();
    }

    let value = engine
        .ratings
        .get_rating(1, 5, 1, false)
        .await
        .unwrap()
        .unwrap()
        .value;
    assert!((value - 0.9).abs() < 1e-9, "got {}", value);
}

#[tokio::test]
async fn test_set_rating_rejects_non_finite() {
    let (_store, engine) = setup(EngineConfig::default());
    assert!(engine.ratings.set_rating(1, 1, f64::NAN, 1).await.is_err());
    assert!(engine.ratings.set_rating(1, 1, f64::INFINITY, 1).await.is_err());
}

#[tokio::test]
async fn test_convert_member() -> anyhow::Result<()> {
    let (store, engine) = setup(EngineConfig::default());
    store
        .seed_ratings([
            Rating::new(1, 1, 1, 0.9),
            Rating::new(1, 2, 1, 0.8),
            Rating::new(2, 1, 1, 0.1),
            Rating::new(2, 3, 1, 0.5),
        ])
        .await;

    engine.ratings.convert_member(1, 2, true, 1).await?;

    let mut converted: Vec<(i64, i64, f64)> = store
        .all_ratings()
        .await
        .into_iter()
        .map(|r| (r.member_id, r.product_id, r.value))
        .collect();
    converted.sort_by_key(|(m, p, _)| (*m, *p));
    assert_eq!(converted, vec![(2, 1, 0.9), (2, 2, 0.8), (2, 3, 0.5)]);

    assert!(engine.ratings.convert_member(2, 2, false, 1).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_delete_operations() {
    let (store, engine) = setup(EngineConfig::default());
    store
        .seed_ratings([
            Rating::new(1, 1, 1, 0.9),
            Rating::new(1, 2, 1, 0.8),
            Rating::new(2, 1, 1, 0.7),
            Rating::new(3, 3, 1, 0.7),
        ])
        .await;

    assert_eq!(engine.ratings.delete_rating(3, 3, 1).await.unwrap(), 1);
    assert_eq!(engine.ratings.delete_rating(3, 3, 1).await.unwrap(), 0);
    assert_eq!(engine.ratings.delete_product_ratings(1, 1).await.unwrap(), 2);
    assert_eq!(engine.ratings.delete_member_ratings(1, 1).await.unwrap(), 1);
    assert!(store.all_ratings().await.is_empty());
}

#[tokio::test]
async fn test_delete_rating_recomputes_links_from_removed_value() {
    let (store, engine) = setup(EngineConfig::default().with_realtime_link(true));
    engine.ratings.set_rating(1, 10, 0.8, 1).await.unwrap();
    engine.ratings.set_rating(1, 20, 0.9, 1).await.unwrap();
    assert_eq!(targets(&store, 20).await, vec![10]);

    assert_eq!(engine.ratings.delete_rating(1, 20, 1).await.unwrap(), 1);
    assert!(targets(&store, 20).await.is_empty());

    assert_eq!(engine.ratings.delete_rating(1, 20, 1).await.unwrap(), 0);
}

// ============================================================================
// STATISTICS AND RANKINGS
// ============================================================================

async fn seed_statistics(store: &InMemoryStore) {
    store
        .seed_ratings([
            Rating::new(1, 1, 1, 0.9),
            Rating::new(2, 1, 1, 0.8),
            Rating::new(3, 1, 1, 0.7),
            Rating::new(1, 2, 1, 0.9),
            Rating::new(2, 2, 1, 0.7),
            Rating::new(3, 3, 1, 1.0),
            Rating::new(4, 4, 1, 0.2),
            Rating::new(4, 5, 1, -1.0),
        ])
        .await;
}

#[tokio::test]
async fn test_counts_and_distributions() {
    let (store, engine) = setup(EngineConfig::default());
    seed_statistics(&store).await;

    assert_eq!(engine.statistics.count_members(1).await.unwrap(), 4);
    assert_eq!(engine.statistics.count_products(1).await.unwrap(), 5);

    let buckets: Vec<(i64, i64)> = engine
        .statistics
        .distribution(&DistributionOptions::new())
        .await
        .unwrap()
        .into_iter()
        .map(|b| (b.value, b.count))
        .collect();
    assert_eq!(buckets, vec![(10, 1), (9, 2), (8, 1), (7, 2), (2, 1)]);

    let member: Vec<(i64, i64)> = engine
        .statistics
        .distribution_member(1, &DistributionOptions::new())
        .await
        .unwrap()
        .into_iter()
        .map(|b| (b.value, b.count))
        .collect();
    assert_eq!(member, vec![(9, 2)]);

    let coarse: Vec<(i64, i64)> = engine
        .statistics
        .distribution_product(1, &DistributionOptions::new().granularity(2))
        .await
        .unwrap()
        .into_iter()
        .map(|b| (b.value, b.count))
        .collect();
    assert_eq!(coarse, vec![(2, 2), (1, 1)]);

    let invalid = DistributionOptions::new().granularity(0);
    assert!(engine.statistics.distribution(&invalid).await.is_err());
}

#[tokio::test]
async fn test_rankings() {
    let (store, engine) = setup(EngineConfig::default());
    seed_statistics(&store).await;

    let products = engine
        .ranking
        .product_ranking(&RankingOptions::new())
        .await
        .unwrap();
    let ranked: Vec<(i64, i64, usize)> = products.iter().map(|e| (e.id, e.count, e.rank)).collect();
    assert_eq!(ranked, vec![(1, 3, 1), (2, 2, 2), (3, 1, 3)]);

    let members = engine
        .ranking
        .member_ranking(&RankingOptions::new().max(1))
        .await
        .unwrap();
    let ranked: Vec<(i64, usize)> = members.iter().map(|e| (e.id, e.rank)).collect();
    assert_eq!(ranked, vec![(1, 1), (2, 1), (3, 1)]);

    let filtered = engine
        .ranking
        .product_ranking(&RankingOptions::new().filter(IdFilter::new([2, 3])))
        .await
        .unwrap();
    let ranked: Vec<(i64, usize)> = filtered.iter().map(|e| (e.id, e.rank)).collect();
    assert_eq!(ranked, vec![(2, 1), (3, 2)]);
}

#[tokio::test]
async fn test_run_batch_uses_configured_mode() {
    let (store, engine) = setup(EngineConfig::default().with_mode(LinkMode::Slope));
    store
        .seed_ratings([Rating::new(1, 1, 1, 0.2), Rating::new(1, 2, 1, 0.5)])
        .await;

    let report = engine.run_batch().await.unwrap();
    assert!(report.is_complete());

    // Below-threshold ratings only link in slope mode.
    let links = store.list_category(1).await.unwrap();
    assert_eq!(links.len(), 2);
}

#[test]
fn test_invalid_config_is_rejected() {
    let store = Arc::new(InMemoryStore::new());
    let config = EngineConfig::default().with_threshold(f64::NAN);
    assert!(Engine::new(store, config).is_err());
}
