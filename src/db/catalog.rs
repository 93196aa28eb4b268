use serde::Serialize;
use sqlx::{types::Json, PgPool, Row};

use crate::error::AppResult;
use crate::models::{FilmRecord, Showtime};

/// Outcome of a batched upsert. `failed` counts records that were rejected
/// (bad embedding) or whose individual write errored; a failure never blocks
/// the other records in the batch.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub created: u64,
    pub updated: u64,
    pub failed: u64,
}

/// Per-cinema film count for catalog statistics
#[derive(Debug, Clone, Serialize)]
pub struct CinemaFilmCount {
    pub cinema_id: String,
    pub cinema_name: Option<String>,
    pub count: i64,
}

/// Per-week film count for catalog statistics
#[derive(Debug, Clone, Serialize)]
pub struct WeekFilmCount {
    pub week_number: i32,
    pub count: i64,
}

/// Aggregated catalog statistics for the admin surface
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub total_films: u64,
    pub by_cinema: Vec<CinemaFilmCount>,
    pub by_week: Vec<WeekFilmCount>,
}

/// Durable film catalog keyed by composite id
///
/// Writers (the ingestion pipeline) and readers (the retrieval engine) share
/// this seam; retrieval must only ever see fully-formed, embedded records,
/// which `bulk_upsert` guarantees by validating embeddings before any write.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    /// All records whose `cinema_id` is in the given set
    async fn find_by_cinemas(&self, cinema_ids: &[String]) -> AppResult<Vec<FilmRecord>>;

    /// Unordered upsert keyed on `composite_id`. Records with an invalid
    /// embedding are rejected before persistence and counted as failed.
    async fn bulk_upsert(&self, records: &[FilmRecord]) -> AppResult<UpsertOutcome>;

    /// Deletes every record with `week_number` strictly below the cutoff;
    /// records exactly at the cutoff are retained. Returns the deleted count.
    async fn delete_older_than(&self, week_cutoff: i32) -> AppResult<u64>;

    async fn count(&self) -> AppResult<u64>;

    async fn stats(&self) -> AppResult<CatalogStats>;
}

/// PostgreSQL-backed catalog store
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<FilmRecord, sqlx::Error> {
        let showtimes: Json<Vec<Showtime>> = row.try_get("showtimes")?;
        Ok(FilmRecord {
            composite_id: row.try_get("composite_id")?,
            cinema_id: row.try_get("cinema_id")?,
            cinema_name: row.try_get("cinema_name")?,
            film_id: row.try_get("film_id")?,
            title: row.try_get("title")?,
            genre: row.try_get("genre")?,
            genres_array: row.try_get("genres_array")?,
            duration_minutes: row.try_get("duration_minutes")?,
            duration_display: row.try_get("duration_display")?,
            director: row.try_get("director")?,
            actors: row.try_get("actors")?,
            rating: row.try_get("rating")?,
            release_date: row.try_get("release_date")?,
            showtimes: showtimes.0,
            embedding: row.try_get("embedding")?,
            week_number: row.try_get("week_number")?,
            scraped_at: row.try_get("scraped_at")?,
        })
    }

    /// Upserts one record; returns true when the row was newly created.
    async fn upsert_one(&self, record: &FilmRecord) -> AppResult<bool> {
        let row = sqlx::query(
            r#"
            INSERT INTO films (
                composite_id, cinema_id, cinema_name, film_id, title, genre,
                genres_array, duration_minutes, duration_display, director,
                actors, rating, release_date, showtimes, embedding,
                week_number, scraped_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (composite_id) DO UPDATE SET
                cinema_id = EXCLUDED.cinema_id,
                cinema_name = EXCLUDED.cinema_name,
                film_id = EXCLUDED.film_id,
                title = EXCLUDED.title,
                genre = EXCLUDED.genre,
                genres_array = EXCLUDED.genres_array,
                duration_minutes = EXCLUDED.duration_minutes,
                duration_display = EXCLUDED.duration_display,
                director = EXCLUDED.director,
                actors = EXCLUDED.actors,
                rating = EXCLUDED.rating,
                release_date = EXCLUDED.release_date,
                showtimes = EXCLUDED.showtimes,
                embedding = EXCLUDED.embedding,
                week_number = EXCLUDED.week_number,
                scraped_at = EXCLUDED.scraped_at
            RETURNING (xmax = 0) AS created
            "#,
        )
        .bind(&record.composite_id)
        .bind(&record.cinema_id)
        .bind(&record.cinema_name)
        .bind(&record.film_id)
        .bind(&record.title)
        .bind(&record.genre)
        .bind(&record.genres_array)
        .bind(record.duration_minutes)
        .bind(&record.duration_display)
        .bind(&record.director)
        .bind(&record.actors)
        .bind(record.rating)
        .bind(&record.release_date)
        .bind(Json(&record.showtimes))
        .bind(&record.embedding)
        .bind(record.week_number)
        .bind(record.scraped_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("created")?)
    }
}

#[async_trait::async_trait]
impl CatalogStore for PgCatalogStore {
    async fn find_by_cinemas(&self, cinema_ids: &[String]) -> AppResult<Vec<FilmRecord>> {
        let rows = sqlx::query("SELECT * FROM films WHERE cinema_id = ANY($1)")
            .bind(cinema_ids)
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(Self::record_from_row(row)?);
        }
        Ok(records)
    }

    async fn bulk_upsert(&self, records: &[FilmRecord]) -> AppResult<UpsertOutcome> {
        let mut outcome = UpsertOutcome::default();

        for record in records {
            if let Err(e) = record.validate_embedding() {
                tracing::warn!(
                    composite_id = %record.composite_id,
                    error = %e,
                    "Rejected record before persistence"
                );
                outcome.failed += 1;
                continue;
            }

            // Unordered semantics: one record's write failure must not block
            // the rest of the batch.
            match self.upsert_one(record).await {
                Ok(true) => outcome.created += 1,
                Ok(false) => outcome.updated += 1,
                Err(e) => {
                    tracing::warn!(
                        composite_id = %record.composite_id,
                        error = %e,
                        "Upsert failed for record"
                    );
                    outcome.failed += 1;
                }
            }
        }

        tracing::info!(
            created = outcome.created,
            updated = outcome.updated,
            failed = outcome.failed,
            "Catalog upsert finished"
        );

        Ok(outcome)
    }

    async fn delete_older_than(&self, week_cutoff: i32) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM films WHERE week_number < $1")
            .bind(week_cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> AppResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM films")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count as u64)
    }

    async fn stats(&self) -> AppResult<CatalogStats> {
        let total_films = self.count().await?;

        let cinema_rows = sqlx::query(
            r#"
            SELECT cinema_id, MAX(cinema_name) AS cinema_name, COUNT(*) AS count
            FROM films
            GROUP BY cinema_id
            ORDER BY count DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_cinema = Vec::with_capacity(cinema_rows.len());
        for row in &cinema_rows {
            by_cinema.push(CinemaFilmCount {
                cinema_id: row.try_get("cinema_id")?,
                cinema_name: row.try_get("cinema_name")?,
                count: row.try_get("count")?,
            });
        }

        let week_rows = sqlx::query(
            r#"
            SELECT week_number, COUNT(*) AS count
            FROM films
            GROUP BY week_number
            ORDER BY week_number DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_week = Vec::with_capacity(week_rows.len());
        for row in &week_rows {
            by_week.push(WeekFilmCount {
                week_number: row.try_get("week_number")?,
                count: row.try_get("count")?,
            });
        }

        Ok(CatalogStats {
            total_films,
            by_cinema,
            by_week,
        })
    }
}
