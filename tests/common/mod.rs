#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::Utc;

use cinerec_api::db::catalog::{CatalogStats, CinemaFilmCount, WeekFilmCount};
use cinerec_api::db::{CatalogStore, CinemaStore, UpsertOutcome};
use cinerec_api::error::{AppError, AppResult};
use cinerec_api::models::{
    Cinema, FilmRecord, ScrapePayload, ScrapedCinema, ScrapedFilm, EMBEDDING_DIM,
};
use cinerec_api::services::{EmbeddingProvider, ShowtimeSource};

// ============================================================================
// Catalog double
// ============================================================================

/// In-memory catalog with the same upsert/prune semantics as the real store.
#[derive(Default)]
pub struct MemoryCatalog {
    pub records: Mutex<HashMap<String, FilmRecord>>,
}

#[async_trait::async_trait]
impl CatalogStore for MemoryCatalog {
    async fn find_by_cinemas(&self, cinema_ids: &[String]) -> AppResult<Vec<FilmRecord>> {
        let records = self.records.lock().unwrap();
        let mut matches: Vec<FilmRecord> = records
            .values()
            .filter(|r| cinema_ids.contains(&r.cinema_id))
            .cloned()
            .collect();
        // Stable catalog order for the tests
        matches.sort_by(|a, b| a.composite_id.cmp(&b.composite_id));
        Ok(matches)
    }

    async fn bulk_upsert(&self, records: &[FilmRecord]) -> AppResult<UpsertOutcome> {
        let mut outcome = UpsertOutcome::default();
        let mut stored = self.records.lock().unwrap();

        for record in records {
            if record.validate_embedding().is_err() {
                outcome.failed += 1;
                continue;
            }
            if stored
                .insert(record.composite_id.clone(), record.clone())
                .is_some()
            {
                outcome.updated += 1;
            } else {
                outcome.created += 1;
            }
        }

        Ok(outcome)
    }

    async fn delete_older_than(&self, week_cutoff: i32) -> AppResult<u64> {
        let mut stored = self.records.lock().unwrap();
        let before = stored.len();
        stored.retain(|_, r| r.week_number >= week_cutoff);
        Ok((before - stored.len()) as u64)
    }

    async fn count(&self) -> AppResult<u64> {
        Ok(self.records.lock().unwrap().len() as u64)
    }

    async fn stats(&self) -> AppResult<CatalogStats> {
        let stored = self.records.lock().unwrap();

        let mut by_cinema: HashMap<String, i64> = HashMap::new();
        let mut by_week: HashMap<i32, i64> = HashMap::new();
        for record in stored.values() {
            *by_cinema.entry(record.cinema_id.clone()).or_default() += 1;
            *by_week.entry(record.week_number).or_default() += 1;
        }

        Ok(CatalogStats {
            total_films: stored.len() as u64,
            by_cinema: by_cinema
                .into_iter()
                .map(|(cinema_id, count)| CinemaFilmCount {
                    cinema_id,
                    cinema_name: None,
                    count,
                })
                .collect(),
            by_week: by_week
                .into_iter()
                .map(|(week_number, count)| WeekFilmCount { week_number, count })
                .collect(),
        })
    }
}

// ============================================================================
// Cinema reference double
// ============================================================================

pub struct MemoryCinemas {
    pub cinemas: Vec<Cinema>,
}

impl MemoryCinemas {
    pub fn with_ids(ids: &[&str]) -> Self {
        Self {
            cinemas: ids.iter().map(|id| cinema(id, "75001")).collect(),
        }
    }
}

#[async_trait::async_trait]
impl CinemaStore for MemoryCinemas {
    async fn find_all(&self) -> AppResult<Vec<Cinema>> {
        Ok(self.cinemas.clone())
    }

    async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<Cinema>> {
        Ok(self
            .cinemas
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn find_by_postal_code(&self, postal_code: &str) -> AppResult<Vec<Cinema>> {
        let department: String = postal_code.chars().take(2).collect();
        Ok(self
            .cinemas
            .iter()
            .filter(|c| {
                c.postal_code
                    .as_deref()
                    .is_some_and(|p| p.starts_with(&department))
            })
            .cloned()
            .collect())
    }

    async fn count(&self) -> AppResult<u64> {
        Ok(self.cinemas.len() as u64)
    }
}

// ============================================================================
// Embedding provider double
// ============================================================================

/// Deterministic embedder: same text, same unit vector. Failure modes are
/// switchable per test.
#[derive(Default)]
pub struct StubEmbeddings {
    pub unavailable: bool,
    pub fail_all: bool,
    /// Fail any text containing this fragment
    pub fail_on: Option<String>,
    /// Exact-text overrides for tests that need controlled similarities
    pub overrides: Mutex<HashMap<String, Vec<f32>>>,
}

impl StubEmbeddings {
    pub fn available() -> Self {
        Self::default()
    }

    pub fn with_override(self, text: &str, vector: Vec<f32>) -> Self {
        self.overrides
            .lock()
            .unwrap()
            .insert(text.to_string(), vector);
        self
    }
}

/// Unit vector along one axis, full embedding width.
pub fn basis(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; EMBEDDING_DIM];
    v[axis] = 1.0;
    v
}

fn vector_for(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; EMBEDDING_DIM];
    let mut hash: usize = 7;
    for byte in text.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(byte as usize);
    }
    v[hash % EMBEDDING_DIM] = 1.0;
    v
}

#[async_trait::async_trait]
impl EmbeddingProvider for StubEmbeddings {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let should_fail = self.fail_all
            || self
                .fail_on
                .as_deref()
                .is_some_and(|fragment| text.contains(fragment));
        if should_fail {
            return Err(AppError::EmbeddingUnavailable("stubbed failure".to_string()));
        }

        if let Some(vector) = self.overrides.lock().unwrap().get(text) {
            return Ok(vector.clone());
        }
        Ok(vector_for(text))
    }

    async fn embed_all(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await.ok());
        }
        embeddings
    }

    async fn is_model_available(&self) -> AppResult<bool> {
        Ok(!self.unavailable)
    }

    fn model_name(&self) -> &str {
        "stub-embed"
    }
}

// ============================================================================
// Showtime source double
// ============================================================================

/// Pops one scripted response per call; `None` entries simulate a failed
/// batch.
pub struct ScriptedSource {
    responses: Mutex<VecDeque<Option<ScrapePayload>>>,
    pub calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(responses: Vec<Option<ScrapePayload>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ShowtimeSource for ScriptedSource {
    async fn fetch_showtimes(&self, _cinema_ids: &[String]) -> AppResult<ScrapePayload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.responses.lock().unwrap().pop_front() {
            Some(Some(payload)) => Ok(payload),
            Some(None) => Err(AppError::ScrapeFailed("scripted batch failure".to_string())),
            None => Err(AppError::ScrapeFailed("no scripted response".to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "scripted-source"
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn cinema(id: &str, postal_code: &str) -> Cinema {
    Cinema {
        id: id.to_string(),
        name: format!("Cinema {}", id),
        address: None,
        postal_code: Some(postal_code.to_string()),
        city: Some("Paris".to_string()),
    }
}

pub fn scraped_film(film_id: &str, title: &str) -> ScrapedFilm {
    ScrapedFilm {
        film_id: Some(film_id.to_string()),
        title: Some(title.to_string()),
        genre: Some("Action, Drama".to_string()),
        rating: Some(4.0),
        ..Default::default()
    }
}

pub fn payload_for(cinema_id: &str, films: Vec<ScrapedFilm>) -> ScrapePayload {
    ScrapePayload {
        cinemas: vec![ScrapedCinema {
            cinema_id: cinema_id.to_string(),
            cinema_name: Some(format!("Cinema {}", cinema_id)),
            films,
        }],
    }
}

pub fn embedded_record(
    film_id: &str,
    cinema_id: &str,
    week_number: i32,
    rating: f32,
    embedding: Vec<f32>,
) -> FilmRecord {
    FilmRecord {
        composite_id: cinerec_api::models::composite_id(film_id, cinema_id),
        cinema_id: cinema_id.to_string(),
        cinema_name: None,
        film_id: film_id.to_string(),
        title: format!("Film {}", film_id),
        genre: None,
        genres_array: vec![],
        duration_minutes: None,
        duration_display: None,
        director: None,
        actors: vec![],
        rating: Some(rating),
        release_date: None,
        showtimes: vec![],
        embedding,
        week_number,
        scraped_at: Utc::now(),
    }
}
