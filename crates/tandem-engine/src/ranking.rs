//! Product and member leaderboards.

use std::sync::Arc;

use tandem_core::{
    EngineConfig, RankSubject, RankedEntry, RankingOptions, Result, StatisticsRepository,
};

/// Assign ranks to `(id, count)` pairs over the admitted ids only.
///
/// Counts are ordered descending (ties by id ascending). Equal counts share a
/// rank; a new count is ranked one past the number of entries already
/// accepted, so `[5, 5, 3, 3, 1]` ranks as `[1, 1, 3, 3, 5]`. Entries stop once
/// the rank would exceed `max`; every entry tied at rank `max` is kept.
pub fn assign_ranks(
    mut counts: Vec<(i64, i64)>,
    admits: impl Fn(i64) -> bool,
    max: usize,
) -> Vec<RankedEntry> {
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut entries: Vec<RankedEntry> = Vec::new();
    let mut rank = 0;
    let mut previous: Option<i64> = None;

    for (id, count) in counts.into_iter().filter(|(id, _)| admits(*id)) {
        if previous != Some(count) {
            rank = entries.len() + 1;
            previous = Some(count);
        }
        if rank > max {
            break;
        }
        entries.push(RankedEntry { id, count, rank });
    }
    entries
}

/// Leaderboards of products and members by above-threshold rating volume.
#[derive(Clone)]
pub struct RankingEngine {
    statistics: Arc<dyn StatisticsRepository>,
    config: Arc<EngineConfig>,
}

impl RankingEngine {
    pub fn new(statistics: Arc<dyn StatisticsRepository>, config: Arc<EngineConfig>) -> Self {
        Self { statistics, config }
    }

    async fn ranking(&self, subject: RankSubject, opts: &RankingOptions) -> Result<Vec<RankedEntry>> {
        let counts = self
            .statistics
            .rating_counts(opts.category_id, self.config.ratings.threshold, subject)
            .await?;
        Ok(assign_ranks(counts, |id| opts.admits(id), opts.max))
    }

    /// Most rated products.
    pub async fn product_ranking(&self, opts: &RankingOptions) -> Result<Vec<RankedEntry>> {
        self.ranking(RankSubject::Product, opts).await
    }

    /// Members with the most ratings.
    pub async fn member_ranking(&self, opts: &RankingOptions) -> Result<Vec<RankedEntry>> {
        self.ranking(RankSubject::Member, opts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranks(entries: &[RankedEntry]) -> Vec<usize> {
        entries.iter().map(|e| e.rank).collect()
    }

    #[test]
    fn ties_share_rank_and_next_rank_skips() {
        let counts = vec![(1, 5), (2, 5), (3, 3), (4, 3), (5, 1)];
        let entries = assign_ranks(counts, |_| true, 10);
        assert_eq!(ranks(&entries), vec![1, 1, 3, 3, 5]);
    }

    #[test]
    fn boundary_ties_are_kept() {
        let counts = vec![(1, 5), (2, 5), (3, 3), (4, 3), (5, 1)];
        let entries = assign_ranks(counts, |_| true, 3);
        assert_eq!(entries.len(), 4);
        assert!(entries.iter().all(|e| e.rank <= 3));
        assert!(entries.iter().all(|e| e.id != 5));
    }

    #[test]
    fn ranks_follow_filtered_subset() {
        let counts = vec![(1, 9), (2, 7), (3, 7), (4, 2)];
        let entries = assign_ranks(counts, |id| id != 1, 10);
        assert_eq!(
            entries,
            vec![
                RankedEntry { id: 2, count: 7, rank: 1 },
                RankedEntry { id: 3, count: 7, rank: 1 },
                RankedEntry { id: 4, count: 2, rank: 3 },
            ]
        );
    }

    #[test]
    fn unsorted_input_is_ordered() {
        let counts = vec![(7, 1), (3, 4), (5, 4)];
        let entries = assign_ranks(counts, |_| true, 10);
        let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 5, 7]);
    }

    #[test]
    fn zero_max_is_empty() {
        assert!(assign_ranks(vec![(1, 3)], |_| true, 0).is_empty());
    }

    #[test]
    fn max_one_keeps_all_leaders() {
        let counts = vec![(1, 2), (2, 2), (3, 1)];
        let entries = assign_ranks(counts, |_| true, 1);
        assert_eq!(ranks(&entries), vec![1, 1]);
    }
}
