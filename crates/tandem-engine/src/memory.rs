//! In-memory store for tests and embedded use.
//!
//! Implements every storage trait over plain vectors behind a single
//! `RwLock`, so each trait method is atomic.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use tandem_core::EngineConfig;
//! use tandem_engine::{memory::InMemoryStore, Engine};
//!
//! let store = Arc::new(InMemoryStore::new());
//! let engine = Engine::new(store, EngineConfig::default()).unwrap();
//! assert_eq!(engine.config().top_k, 30);
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use tandem_core::{
    ClickUpdate, DistributionBucket, DistributionScope, Link, LinkRepository, RankSubject, Rating,
    RatingRepository, RatingValues, Result, StatisticsRepository,
};

#[derive(Debug, Default)]
struct State {
    ratings: Vec<Rating>,
    links: Vec<Link>,
}

/// Store keeping ratings and links in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a rating as-is, keeping its timestamp. Replaces an existing
    /// rating with the same key.
    pub async fn seed_rating(&self, rating: Rating) {
        let mut state = self.state.write().await;
        state.ratings.retain(|r| {
            !(r.member_id == rating.member_id
                && r.product_id == rating.product_id
                && r.category_id == rating.category_id)
        });
        state.ratings.push(rating);
    }

    /// Insert many ratings, see [`InMemoryStore::seed_rating`].
    pub async fn seed_ratings(&self, ratings: impl IntoIterator<Item = Rating>) {
        for rating in ratings {
            self.seed_rating(rating).await;
        }
    }

    /// Every rating currently stored.
    pub async fn all_ratings(&self) -> Vec<Rating> {
        self.state.read().await.ratings.clone()
    }
}

fn same_key(r: &Rating, member_id: i64, product_id: i64, category_id: i64) -> bool {
    r.member_id == member_id && r.product_id == product_id && r.category_id == category_id
}

fn remove_where(ratings: &mut Vec<Rating>, pred: impl Fn(&Rating) -> bool) -> u64 {
    let before = ratings.len();
    ratings.retain(|r| !pred(r));
    (before - ratings.len()) as u64
}

#[async_trait]
impl RatingRepository for InMemoryStore {
    async fn get(&self, member_id: i64, product_id: i64, category_id: i64) -> Result<Option<Rating>> {
        let state = self.state.read().await;
        Ok(state
            .ratings
            .iter()
            .find(|r| same_key(r, member_id, product_id, category_id))
            .cloned())
    }

    async fn upsert(
        &self,
        member_id: i64,
        product_id: i64,
        category_id: i64,
        value: f64,
    ) -> Result<Option<f64>> {
        let mut state = self.state.write().await;
        let previous = state
            .ratings
            .iter()
            .find(|r| same_key(r, member_id, product_id, category_id))
            .map(|r| r.value);
        state
            .ratings
            .retain(|r| !same_key(r, member_id, product_id, category_id));
        state
            .ratings
            .push(Rating::new(member_id, product_id, category_id, value));
        Ok(previous)
    }

    async fn apply_click(
        &self,
        member_id: i64,
        product_id: i64,
        category_id: i64,
        values: &RatingValues,
    ) -> Result<Option<ClickUpdate>> {
        let mut state = self.state.write().await;
        let previous = state
            .ratings
            .iter()
            .find(|r| same_key(r, member_id, product_id, category_id))
            .map(|r| r.value);
        let Some(value) = values.next_click(previous) else {
            return Ok(None);
        };
        state
            .ratings
            .retain(|r| !same_key(r, member_id, product_id, category_id));
        state
            .ratings
            .push(Rating::new(member_id, product_id, category_id, value));
        Ok(Some(ClickUpdate { previous, value }))
    }

    async fn delete(
        &self,
        member_id: i64,
        product_id: i64,
        category_id: i64,
    ) -> Result<Option<f64>> {
        let mut state = self.state.write().await;
        let previous = state
            .ratings
            .iter()
            .find(|r| same_key(r, member_id, product_id, category_id))
            .map(|r| r.value);
        remove_where(&mut state.ratings, |r| {
            same_key(r, member_id, product_id, category_id)
        });
        Ok(previous)
    }

    async fn delete_member(&self, member_id: i64, category_id: i64) -> Result<u64> {
        let mut state = self.state.write().await;
        Ok(remove_where(&mut state.ratings, |r| {
            r.member_id == member_id && r.category_id == category_id
        }))
    }

    async fn delete_product(&self, product_id: i64, category_id: i64) -> Result<u64> {
        let mut state = self.state.write().await;
        Ok(remove_where(&mut state.ratings, |r| {
            r.product_id == product_id && r.category_id == category_id
        }))
    }

    async fn convert_member(
        &self,
        from_member_id: i64,
        to_member_id: i64,
        clear: bool,
        category_id: i64,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let copied: Vec<Rating> = state
            .ratings
            .iter()
            .filter(|r| r.member_id == from_member_id && r.category_id == category_id)
            .cloned()
            .collect();
        let products: HashSet<i64> = copied.iter().map(|r| r.product_id).collect();

        remove_where(&mut state.ratings, |r| {
            r.member_id == to_member_id
                && r.category_id == category_id
                && products.contains(&r.product_id)
        });
        if clear {
            remove_where(&mut state.ratings, |r| {
                r.member_id == from_member_id && r.category_id == category_id
            });
        }
        state.ratings.extend(copied.into_iter().map(|mut r| {
            r.member_id = to_member_id;
            r
        }));
        Ok(())
    }

    async fn delete_observed_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write().await;
        Ok(remove_where(&mut state.ratings, |r| r.observed_at < cutoff))
    }

    async fn list_categories(&self) -> Result<Vec<i64>> {
        let state = self.state.read().await;
        let categories: BTreeSet<i64> = state.ratings.iter().map(|r| r.category_id).collect();
        Ok(categories.into_iter().collect())
    }

    async fn list_for_category(&self, category_id: i64, min_value: f64) -> Result<Vec<Rating>> {
        let state = self.state.read().await;
        Ok(state
            .ratings
            .iter()
            .filter(|r| r.category_id == category_id && r.value >= min_value)
            .cloned()
            .collect())
    }

    async fn list_for_member(&self, member_id: i64, category_id: i64) -> Result<Vec<Rating>> {
        let state = self.state.read().await;
        Ok(state
            .ratings
            .iter()
            .filter(|r| r.member_id == member_id && r.category_id == category_id)
            .cloned()
            .collect())
    }

    async fn list_co_rated(
        &self,
        product_id: i64,
        category_id: i64,
        min_value: f64,
    ) -> Result<Vec<Rating>> {
        let state = self.state.read().await;
        let in_scope = |r: &&Rating| r.category_id == category_id && r.value >= min_value;
        let members: HashSet<i64> = state
            .ratings
            .iter()
            .filter(in_scope)
            .filter(|r| r.product_id == product_id)
            .map(|r| r.member_id)
            .collect();
        Ok(state
            .ratings
            .iter()
            .filter(in_scope)
            .filter(|r| members.contains(&r.member_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LinkRepository for InMemoryStore {
    async fn replace_category(&self, category_id: i64, links: Vec<Link>) -> Result<()> {
        let mut state = self.state.write().await;
        state.links.retain(|l| l.category_id != category_id);
        state.links.extend(links);
        Ok(())
    }

    async fn replace_source(
        &self,
        category_id: i64,
        source_item: i64,
        links: Vec<Link>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .links
            .retain(|l| !(l.category_id == category_id && l.source_item == source_item));
        state.links.extend(links);
        Ok(())
    }

    async fn outgoing(&self, source_item: i64, category_id: i64) -> Result<Vec<Link>> {
        let state = self.state.read().await;
        Ok(state
            .links
            .iter()
            .filter(|l| l.category_id == category_id && l.source_item == source_item)
            .cloned()
            .collect())
    }

    async fn incoming(&self, target_item: i64, category_id: i64) -> Result<Vec<Link>> {
        let state = self.state.read().await;
        Ok(state
            .links
            .iter()
            .filter(|l| l.category_id == category_id && l.target_item == target_item)
            .cloned()
            .collect())
    }

    async fn outgoing_from(&self, source_items: &[i64], category_id: i64) -> Result<Vec<Link>> {
        let sources: HashSet<i64> = source_items.iter().copied().collect();
        let state = self.state.read().await;
        Ok(state
            .links
            .iter()
            .filter(|l| l.category_id == category_id && sources.contains(&l.source_item))
            .cloned()
            .collect())
    }

    async fn list_category(&self, category_id: i64) -> Result<Vec<Link>> {
        let state = self.state.read().await;
        Ok(state
            .links
            .iter()
            .filter(|l| l.category_id == category_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl StatisticsRepository for InMemoryStore {
    async fn count_members(&self, category_id: i64) -> Result<i64> {
        let state = self.state.read().await;
        let members: HashSet<i64> = state
            .ratings
            .iter()
            .filter(|r| r.category_id == category_id)
            .map(|r| r.member_id)
            .collect();
        Ok(members.len() as i64)
    }

    async fn count_products(&self, category_id: i64) -> Result<i64> {
        let state = self.state.read().await;
        let products: HashSet<i64> = state
            .ratings
            .iter()
            .filter(|r| r.category_id == category_id)
            .map(|r| r.product_id)
            .collect();
        Ok(products.len() as i64)
    }

    async fn distribution(
        &self,
        category_id: i64,
        granularity: i64,
        scope: DistributionScope,
    ) -> Result<Vec<DistributionBucket>> {
        let state = self.state.read().await;
        let mut buckets: HashMap<i64, i64> = HashMap::new();
        for rating in state.ratings.iter().filter(|r| {
            r.category_id == category_id
                && r.is_signal()
                && match scope {
                    DistributionScope::All => true,
                    DistributionScope::Member(id) => r.member_id == id,
                    DistributionScope::Product(id) => r.product_id == id,
                }
        }) {
            let value = (rating.value * granularity as f64).round() as i64;
            *buckets.entry(value).or_default() += 1;
        }

        let mut out: Vec<DistributionBucket> = buckets
            .into_iter()
            .map(|(value, count)| DistributionBucket { value, count })
            .collect();
        out.sort_by(|a, b| b.value.cmp(&a.value));
        Ok(out)
    }

    async fn rating_counts(
        &self,
        category_id: i64,
        threshold: f64,
        subject: RankSubject,
    ) -> Result<Vec<(i64, i64)>> {
        let state = self.state.read().await;
        let mut counts: HashMap<i64, i64> = HashMap::new();
        for rating in state
            .ratings
            .iter()
            .filter(|r| r.category_id == category_id && r.value >= threshold)
        {
            let id = match subject {
                RankSubject::Product => rating.product_id,
                RankSubject::Member => rating.member_id,
            };
            *counts.entry(id).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }
}
