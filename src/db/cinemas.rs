use sqlx::{PgPool, Row};

use crate::error::AppResult;
use crate::models::Cinema;

/// Read-only access to the cinema reference list
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CinemaStore: Send + Sync {
    async fn find_all(&self) -> AppResult<Vec<Cinema>>;

    async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<Cinema>>;

    /// Department-prefix match: a 2-digit department or a 5-digit postal code
    /// both resolve to every cinema whose postal code starts with the same
    /// two digits.
    async fn find_by_postal_code(&self, postal_code: &str) -> AppResult<Vec<Cinema>>;

    async fn count(&self) -> AppResult<u64>;
}

/// PostgreSQL-backed cinema reference store
pub struct PgCinemaStore {
    pool: PgPool,
}

impl PgCinemaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn cinema_from_row(row: &sqlx::postgres::PgRow) -> Result<Cinema, sqlx::Error> {
        Ok(Cinema {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            address: row.try_get("address")?,
            postal_code: row.try_get("postal_code")?,
            city: row.try_get("city")?,
        })
    }
}

#[async_trait::async_trait]
impl CinemaStore for PgCinemaStore {
    async fn find_all(&self) -> AppResult<Vec<Cinema>> {
        let rows = sqlx::query("SELECT * FROM cinemas ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| Self::cinema_from_row(r).map_err(Into::into))
            .collect()
    }

    async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<Cinema>> {
        let rows = sqlx::query("SELECT * FROM cinemas WHERE id = ANY($1) ORDER BY id")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| Self::cinema_from_row(r).map_err(Into::into))
            .collect()
    }

    async fn find_by_postal_code(&self, postal_code: &str) -> AppResult<Vec<Cinema>> {
        let department: String = postal_code.chars().take(2).collect();

        let rows = sqlx::query("SELECT * FROM cinemas WHERE postal_code LIKE $1 || '%' ORDER BY id")
            .bind(&department)
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(
            department = %department,
            matches = rows.len(),
            "Cinema lookup by postal code"
        );

        rows.iter()
            .map(|r| Self::cinema_from_row(r).map_err(Into::into))
            .collect()
    }

    async fn count(&self) -> AppResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM cinemas")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count as u64)
    }
}
