//! Item link repository implementation.
//!
//! Replacements run delete-then-insert inside one transaction. Inserts are
//! batched through `UNNEST` in chunks of [`LINK_INSERT_BATCH`] rows. Any
//! failure drops the transaction, which rolls it back and leaves the
//! previous links in place.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};
use std::time::Instant;
use tracing::{debug, error};

use tandem_core::defaults::LINK_INSERT_BATCH;
use tandem_core::{Error, Link, LinkRepository, Result};

const LINK_COLUMNS: &str = "source_item, target_item, category_id, weight, slope_sum";

fn link_from_row(row: &PgRow) -> Link {
    Link {
        source_item: row.get("source_item"),
        target_item: row.get("target_item"),
        category_id: row.get("category_id"),
        weight: row.get("weight"),
        slope_sum: row.get("slope_sum"),
    }
}

/// PostgreSQL implementation of LinkRepository.
#[derive(Clone)]
pub struct PgLinkRepository {
    pool: Pool<Postgres>,
}

impl PgLinkRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Bulk insert inside an open transaction.
    async fn insert_links(tx: &mut Transaction<'_, Postgres>, links: &[Link]) -> Result<()> {
        for chunk in links.chunks(LINK_INSERT_BATCH) {
            let sources: Vec<i64> = chunk.iter().map(|l| l.source_item).collect();
            let targets: Vec<i64> = chunk.iter().map(|l| l.target_item).collect();
            let categories: Vec<i64> = chunk.iter().map(|l| l.category_id).collect();
            let weights: Vec<i64> = chunk.iter().map(|l| l.weight).collect();
            let slopes: Vec<f64> = chunk.iter().map(|l| l.slope_sum).collect();

            sqlx::query(
                "INSERT INTO item_link (source_item, target_item, category_id, weight, slope_sum)
                 SELECT * FROM UNNEST($1::bigint[], $2::bigint[], $3::bigint[], $4::bigint[], $5::float8[])",
            )
            .bind(&sources)
            .bind(&targets)
            .bind(&categories)
            .bind(&weights)
            .bind(&slopes)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    /// Commit, or roll back and log when the replacement failed.
    async fn finish(
        tx: Transaction<'_, Postgres>,
        outcome: Result<()>,
        category_id: i64,
        op: &'static str,
    ) -> Result<()> {
        match outcome {
            Ok(()) => Ok(tx.commit().await?),
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    error!(
                        subsystem = "database",
                        component = "links",
                        op,
                        category_id,
                        error = %rollback,
                        "Link replacement rollback failed"
                    );
                }
                Err(Error::aggregation(category_id, e))
            }
        }
    }

    async fn fetch(&self, sql: &str, a: i64, category_id: i64) -> Result<Vec<Link>> {
        let rows = sqlx::query(sql)
            .bind(a)
            .bind(category_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(link_from_row).collect())
    }
}

#[async_trait]
impl LinkRepository for PgLinkRepository {
    async fn replace_category(&self, category_id: i64, links: Vec<Link>) -> Result<()> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await?;

        let outcome = async {
            sqlx::query("DELETE FROM item_link WHERE category_id = $1")
                .bind(category_id)
                .execute(&mut *tx)
                .await?;
            Self::insert_links(&mut tx, &links).await
        }
        .await;
        Self::finish(tx, outcome, category_id, "replace_category").await?;

        debug!(
            subsystem = "database",
            component = "links",
            op = "replace_category",
            category_id,
            link_count = links.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Category links replaced"
        );
        Ok(())
    }

    async fn replace_source(
        &self,
        category_id: i64,
        source_item: i64,
        links: Vec<Link>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let outcome = async {
            sqlx::query("DELETE FROM item_link WHERE category_id = $1 AND source_item = $2")
                .bind(category_id)
                .bind(source_item)
                .execute(&mut *tx)
                .await?;
            Self::insert_links(&mut tx, &links).await
        }
        .await;
        Self::finish(tx, outcome, category_id, "replace_source").await
    }

    async fn outgoing(&self, source_item: i64, category_id: i64) -> Result<Vec<Link>> {
        self.fetch(
            &format!(
                "SELECT {LINK_COLUMNS} FROM item_link
                 WHERE source_item = $1 AND category_id = $2"
            ),
            source_item,
            category_id,
        )
        .await
    }

    async fn incoming(&self, target_item: i64, category_id: i64) -> Result<Vec<Link>> {
        self.fetch(
            &format!(
                "SELECT {LINK_COLUMNS} FROM item_link
                 WHERE target_item = $1 AND category_id = $2"
            ),
            target_item,
            category_id,
        )
        .await
    }

    async fn outgoing_from(&self, source_items: &[i64], category_id: i64) -> Result<Vec<Link>> {
        if source_items.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {LINK_COLUMNS} FROM item_link
             WHERE source_item = ANY($1) AND category_id = $2"
        ))
        .bind(source_items)
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(link_from_row).collect())
    }

    async fn list_category(&self, category_id: i64) -> Result<Vec<Link>> {
        let rows = sqlx::query(&format!(
            "SELECT {LINK_COLUMNS} FROM item_link
             WHERE category_id = $1
             ORDER BY source_item, weight DESC, target_item DESC"
        ))
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(link_from_row).collect())
    }
}
