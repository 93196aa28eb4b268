use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Dimension every persisted film embedding must have. Vectors of any other
/// length are rejected before they reach the catalog.
pub const EMBEDDING_DIM: usize = 1024;

/// One screening slot within a day's programme
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShowtimeSlot {
    pub start: String,
    pub end: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// All screening slots for one date
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Showtime {
    pub date: String,
    #[serde(default)]
    pub slots: Vec<ShowtimeSlot>,
}

/// One film showing at one cinema, keyed by `{film_id}_{cinema_id}`.
///
/// Created and overwritten only by the ingestion pipeline; read-only to the
/// retrieval engine. Deleted when its `week_number` falls more than 2 weeks
/// behind the current run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilmRecord {
    pub composite_id: String,
    pub cinema_id: String,
    pub cinema_name: Option<String>,
    pub film_id: String,
    pub title: String,
    /// Raw genre string as scraped, e.g. "Action, Drama"
    pub genre: Option<String>,
    /// Normalized genre tokens parsed from `genre`
    pub genres_array: Vec<String>,
    pub duration_minutes: Option<i32>,
    pub duration_display: Option<String>,
    pub director: Option<String>,
    pub actors: Vec<String>,
    /// 0-5 scale
    pub rating: Option<f32>,
    pub release_date: Option<String>,
    pub showtimes: Vec<Showtime>,
    /// Semantic vector for the film, exactly `EMBEDDING_DIM` components
    pub embedding: Vec<f32>,
    /// `YYYYWW` tag of the ingestion run that produced this record
    pub week_number: i32,
    pub scraped_at: DateTime<Utc>,
}

impl FilmRecord {
    /// Rejects any embedding that is not exactly `EMBEDDING_DIM` long.
    /// Called by every store implementation before persisting.
    pub fn validate_embedding(&self) -> AppResult<()> {
        if self.embedding.len() != EMBEDDING_DIM {
            return Err(AppError::EmbeddingDimensionMismatch {
                expected: EMBEDDING_DIM,
                got: self.embedding.len(),
            });
        }
        Ok(())
    }
}

/// Deterministic record key. Always recomputed from its parts, never edited.
pub fn composite_id(film_id: &str, cinema_id: &str) -> String {
    format!("{}_{}", film_id, cinema_id)
}

/// `YYYYWW` week tag for a date, using the ISO-8601 week and week-based year
/// (so the days around New Year carry the week's year, not the calendar's).
pub fn week_number(date: NaiveDate) -> i32 {
    let iso = date.iso_week();
    iso.year() * 100 + iso.week() as i32
}

/// Week tag for the current ingestion run
pub fn current_week_number() -> i32 {
    week_number(Utc::now().date_naive())
}

/// A film returned to retrieval callers: the full record minus its embedding,
/// plus the similarity score when ranking succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct RankedFilm {
    pub composite_id: String,
    pub cinema_id: String,
    pub cinema_name: Option<String>,
    pub film_id: String,
    pub title: String,
    pub genre: Option<String>,
    pub genres_array: Vec<String>,
    pub duration_minutes: Option<i32>,
    pub duration_display: Option<String>,
    pub director: Option<String>,
    pub actors: Vec<String>,
    pub rating: Option<f32>,
    pub release_date: Option<String>,
    pub showtimes: Vec<Showtime>,
    /// Cosine similarity against the query; absent when retrieval degraded
    /// to the unranked fallback
    pub similarity: Option<f32>,
}

impl RankedFilm {
    pub fn from_record(record: FilmRecord, similarity: Option<f32>) -> Self {
        Self {
            composite_id: record.composite_id,
            cinema_id: record.cinema_id,
            cinema_name: record.cinema_name,
            film_id: record.film_id,
            title: record.title,
            genre: record.genre,
            genres_array: record.genres_array,
            duration_minutes: record.duration_minutes,
            duration_display: record.duration_display,
            director: record.director,
            actors: record.actors,
            rating: record.rating,
            release_date: record.release_date,
            showtimes: record.showtimes,
            similarity,
        }
    }
}

// ============================================================================
// Raw scrape payload
// ============================================================================

/// Top-level payload returned by the showtime source
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScrapePayload {
    #[serde(default)]
    pub cinemas: Vec<ScrapedCinema>,
}

/// One cinema's scraped programme
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapedCinema {
    pub cinema_id: String,
    #[serde(default)]
    pub cinema_name: Option<String>,
    #[serde(default)]
    pub films: Vec<ScrapedFilm>,
}

/// One scraped film, before normalization. Everything beyond the id and the
/// title is best-effort.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScrapedFilm {
    #[serde(default)]
    pub film_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<i32>,
    #[serde(default)]
    pub duration_display: Option<String>,
    #[serde(default)]
    pub director: Option<String>,
    #[serde(default)]
    pub actors: Vec<String>,
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub showtimes: Vec<Showtime>,
}
