//! Rating repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info};

use tandem_core::{ClickUpdate, Rating, RatingRepository, RatingValues, Result};

const RATING_COLUMNS: &str = "member_id, product_id, category_id, value, observed_at";

fn rating_from_row(row: &PgRow) -> Rating {
    Rating {
        member_id: row.get("member_id"),
        product_id: row.get("product_id"),
        category_id: row.get("category_id"),
        value: row.get("value"),
        observed_at: row.get("observed_at"),
    }
}

/// PostgreSQL implementation of RatingRepository.
#[derive(Clone)]
pub struct PgRatingRepository {
    pool: Pool<Postgres>,
}

impl PgRatingRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Insert a rating with its own timestamp, replacing any existing one.
    pub async fn insert_observed(&self, rating: &Rating) -> Result<()> {
        sqlx::query(
            "INSERT INTO rating (member_id, product_id, category_id, value, observed_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (member_id, product_id, category_id)
             DO UPDATE SET value = EXCLUDED.value, observed_at = EXCLUDED.observed_at",
        )
        .bind(rating.member_id)
        .bind(rating.product_id)
        .bind(rating.category_id)
        .bind(rating.value)
        .bind(rating.observed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RatingRepository for PgRatingRepository {
    async fn get(
        &self,
        member_id: i64,
        product_id: i64,
        category_id: i64,
    ) -> Result<Option<Rating>> {
        let row = sqlx::query(&format!(
            "SELECT {RATING_COLUMNS} FROM rating
             WHERE member_id = $1 AND product_id = $2 AND category_id = $3"
        ))
        .bind(member_id)
        .bind(product_id)
        .bind(category_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(rating_from_row))
    }

    async fn upsert(
        &self,
        member_id: i64,
        product_id: i64,
        category_id: i64,
        value: f64,
    ) -> Result<Option<f64>> {
        let mut tx = self.pool.begin().await?;

        let previous: Option<f64> = sqlx::query_scalar(
            "SELECT value FROM rating
             WHERE member_id = $1 AND product_id = $2 AND category_id = $3
             FOR UPDATE",
        )
        .bind(member_id)
        .bind(product_id)
        .bind(category_id)
        .fetch_optional(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO rating (member_id, product_id, category_id, value, observed_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (member_id, product_id, category_id)
             DO UPDATE SET value = EXCLUDED.value, observed_at = EXCLUDED.observed_at",
        )
        .bind(member_id)
        .bind(product_id)
        .bind(category_id)
        .bind(value)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(previous)
    }

    async fn apply_click(
        &self,
        member_id: i64,
        product_id: i64,
        category_id: i64,
        values: &RatingValues,
    ) -> Result<Option<ClickUpdate>> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        // A first click inserts; concurrent first clicks fall through to the
        // locked update path below.
        let inserted: Option<f64> = sqlx::query_scalar(
            "INSERT INTO rating (member_id, product_id, category_id, value, observed_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (member_id, product_id, category_id) DO NOTHING
             RETURNING value",
        )
        .bind(member_id)
        .bind(product_id)
        .bind(category_id)
        .bind(values.click_initial)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(value) = inserted {
            tx.commit().await?;
            return Ok(Some(ClickUpdate {
                previous: None,
                value,
            }));
        }

        let previous: Option<f64> = sqlx::query_scalar(
            "SELECT value FROM rating
             WHERE member_id = $1 AND product_id = $2 AND category_id = $3
             FOR UPDATE",
        )
        .bind(member_id)
        .bind(product_id)
        .bind(category_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(value) = values.next_click(previous) else {
            tx.commit().await?;
            return Ok(None);
        };

        sqlx::query(
            "INSERT INTO rating (member_id, product_id, category_id, value, observed_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (member_id, product_id, category_id)
             DO UPDATE SET value = EXCLUDED.value, observed_at = EXCLUDED.observed_at",
        )
        .bind(member_id)
        .bind(product_id)
        .bind(category_id)
        .bind(value)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(ClickUpdate { previous, value }))
    }

    async fn delete(
        &self,
        member_id: i64,
        product_id: i64,
        category_id: i64,
    ) -> Result<Option<f64>> {
        let previous = sqlx::query_scalar(
            "DELETE FROM rating
             WHERE member_id = $1 AND product_id = $2 AND category_id = $3
             RETURNING value",
        )
        .bind(member_id)
        .bind(product_id)
        .bind(category_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(previous)
    }

    async fn delete_member(&self, member_id: i64, category_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM rating WHERE member_id = $1 AND category_id = $2")
            .bind(member_id)
            .bind(category_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_product(&self, product_id: i64, category_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM rating WHERE product_id = $1 AND category_id = $2")
            .bind(product_id)
            .bind(category_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn convert_member(
        &self,
        from_member_id: i64,
        to_member_id: i64,
        clear: bool,
        category_id: i64,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let replaced = sqlx::query(
            "DELETE FROM rating AS t
             USING rating AS s
             WHERE t.member_id = $2 AND t.category_id = $3
               AND s.member_id = $1 AND s.category_id = $3
               AND s.product_id = t.product_id",
        )
        .bind(from_member_id)
        .bind(to_member_id)
        .bind(category_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let copied = sqlx::query(
            "INSERT INTO rating (member_id, product_id, category_id, value, observed_at)
             SELECT $2, product_id, category_id, value, observed_at
             FROM rating
             WHERE member_id = $1 AND category_id = $3",
        )
        .bind(from_member_id)
        .bind(to_member_id)
        .bind(category_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if clear {
            sqlx::query("DELETE FROM rating WHERE member_id = $1 AND category_id = $2")
                .bind(from_member_id)
                .bind(category_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        debug!(
            subsystem = "database",
            component = "ratings",
            op = "convert_member",
            from_member_id,
            to_member_id,
            category_id,
            replaced,
            copied,
            clear,
            "Member ratings converted"
        );
        Ok(())
    }

    async fn delete_observed_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM rating WHERE observed_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        info!(
            subsystem = "database",
            component = "ratings",
            op = "delete_observed_before",
            cutoff = %cutoff,
            rating_count = deleted,
            "Expired ratings deleted"
        );
        Ok(deleted)
    }

    async fn list_categories(&self) -> Result<Vec<i64>> {
        let categories =
            sqlx::query_scalar("SELECT DISTINCT category_id FROM rating ORDER BY category_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(categories)
    }

    async fn list_for_category(&self, category_id: i64, min_value: f64) -> Result<Vec<Rating>> {
        let rows = sqlx::query(&format!(
            "SELECT {RATING_COLUMNS} FROM rating
             WHERE category_id = $1 AND value >= $2"
        ))
        .bind(category_id)
        .bind(min_value)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(rating_from_row).collect())
    }

    async fn list_for_member(&self, member_id: i64, category_id: i64) -> Result<Vec<Rating>> {
        let rows = sqlx::query(&format!(
            "SELECT {RATING_COLUMNS} FROM rating
             WHERE member_id = $1 AND category_id = $2"
        ))
        .bind(member_id)
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(rating_from_row).collect())
    }

    async fn list_co_rated(
        &self,
        product_id: i64,
        category_id: i64,
        min_value: f64,
    ) -> Result<Vec<Rating>> {
        let rows = sqlx::query(
            "SELECT r.member_id, r.product_id, r.category_id, r.value, r.observed_at
             FROM rating r
             WHERE r.category_id = $2 AND r.value >= $3
               AND r.member_id IN (
                   SELECT member_id FROM rating
                   WHERE product_id = $1 AND category_id = $2 AND value >= $3
               )",
        )
        .bind(product_id)
        .bind(category_id)
        .bind(min_value)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(rating_from_row).collect())
    }
}
