//! Durable store of resolved search queries.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use atelier_core::{Error, QueryStore, ResolvedQuery, Result, StoredSearchQuery};

const COLUMNS: &str =
    "id, query_text, category_name, result_data, hit_count, created_at_utc, updated_at_utc";

/// PostgreSQL implementation of QueryStore.
pub struct PgSearchQueryRepository {
    pool: Pool<Postgres>,
}

impl PgSearchQueryRepository {
    /// Create a new PgSearchQueryRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Most frequently reused queries, highest hit count first.
    pub async fn most_popular(&self, limit: i64) -> Result<Vec<StoredSearchQuery>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM search_query ORDER BY hit_count DESC, query_text LIMIT $1",
            COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(row_to_stored).collect()
    }

    /// Remove a stored resolution so the next lookup regenerates it.
    pub async fn delete(&self, query_text: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM search_query WHERE query_text = $1")
            .bind(query_text)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_stored(row: PgRow) -> Result<StoredSearchQuery> {
    let data: serde_json::Value = row.get("result_data");
    let result_data: ResolvedQuery = serde_json::from_value(data)?;
    Ok(StoredSearchQuery {
        id: row.get("id"),
        query_text: row.get("query_text"),
        category_name: row.get("category_name"),
        result_data,
        hit_count: row.get("hit_count"),
        created_at_utc: row.get("created_at_utc"),
        updated_at_utc: row.get("updated_at_utc"),
    })
}

#[async_trait]
impl QueryStore for PgSearchQueryRepository {
    async fn find(&self, query_text: &str) -> Result<Option<StoredSearchQuery>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM search_query WHERE query_text = $1",
            COLUMNS
        ))
        .bind(query_text)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(row_to_stored).transpose()
    }

    async fn record_hit(&self, query_text: &str) -> Result<Option<i64>> {
        let hit_count: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE search_query
            SET hit_count = hit_count + 1, updated_at_utc = $2
            WHERE query_text = $1
            RETURNING hit_count
            "#,
        )
        .bind(query_text)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(query = %query_text, hit_count = ?hit_count, "Recorded durable hit");
        Ok(hit_count)
    }

    async fn upsert(&self, query_text: &str, result: &ResolvedQuery) -> Result<StoredSearchQuery> {
        let now = Utc::now();
        let data = serde_json::to_value(result)?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO search_query
                (id, query_text, category_name, result_data, hit_count, created_at_utc, updated_at_utc)
            VALUES ($1, $2, $3, $4, 1, $5, $5)
            ON CONFLICT (query_text) DO UPDATE SET
                category_name = EXCLUDED.category_name,
                result_data = EXCLUDED.result_data,
                updated_at_utc = EXCLUDED.updated_at_utc
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(Uuid::now_v7())
        .bind(query_text)
        .bind(result.category.as_deref())
        .bind(data)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        row_to_stored(row)
    }
}
