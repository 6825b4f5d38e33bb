//! Rating statistics queries.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use tandem_core::{
    DistributionBucket, DistributionScope, RankSubject, Result, StatisticsRepository,
};

/// PostgreSQL implementation of StatisticsRepository.
#[derive(Clone)]
pub struct PgStatisticsRepository {
    pool: Pool<Postgres>,
}

impl PgStatisticsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn count_distinct(&self, column: &str, category_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(DISTINCT {column}) FROM rating WHERE category_id = $1"
        ))
        .bind(category_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[async_trait]
impl StatisticsRepository for PgStatisticsRepository {
    async fn count_members(&self, category_id: i64) -> Result<i64> {
        self.count_distinct("member_id", category_id).await
    }

    async fn count_products(&self, category_id: i64) -> Result<i64> {
        self.count_distinct("product_id", category_id).await
    }

    async fn distribution(
        &self,
        category_id: i64,
        granularity: i64,
        scope: DistributionScope,
    ) -> Result<Vec<DistributionBucket>> {
        let (scope_clause, scope_id) = match scope {
            DistributionScope::All => ("", None),
            DistributionScope::Member(id) => ("AND member_id = $3", Some(id)),
            DistributionScope::Product(id) => ("AND product_id = $3", Some(id)),
        };
        let sql = format!(
            "SELECT FLOOR(value * $2 + 0.5)::bigint AS bucket, COUNT(*) AS total
             FROM rating
             WHERE category_id = $1 AND value >= 0 {scope_clause}
             GROUP BY bucket
             ORDER BY bucket DESC"
        );

        let mut query = sqlx::query(&sql).bind(category_id).bind(granularity as f64);
        if let Some(id) = scope_id {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .map(|row| DistributionBucket {
                value: row.get("bucket"),
                count: row.get("total"),
            })
            .collect())
    }

    async fn rating_counts(
        &self,
        category_id: i64,
        threshold: f64,
        subject: RankSubject,
    ) -> Result<Vec<(i64, i64)>> {
        let column = match subject {
            RankSubject::Product => "product_id",
            RankSubject::Member => "member_id",
        };
        let rows = sqlx::query(&format!(
            "SELECT {column} AS id, COUNT(*) AS total
             FROM rating
             WHERE category_id = $1 AND value >= $2
             GROUP BY {column}
             ORDER BY total DESC, id ASC"
        ))
        .bind(category_id)
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get("id"), row.get("total")))
            .collect())
    }
}
