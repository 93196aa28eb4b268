use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::db::CatalogStore;
use crate::db::CinemaStore;
use crate::error::{AppError, AppResult};
use crate::models::{current_week_number, FilmRecord, ScrapePayload};
use crate::services::embeddings::EmbeddingProvider;
use crate::services::scraper::ShowtimeSource;
use crate::services::transform::transform_payload;

/// Records older than this many weeks behind the current run are pruned.
const STALE_WEEKS: i32 = 2;

/// Stages of a catalog refresh run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Idle,
    Verifying,
    Fetching,
    Transforming,
    Upserting,
    Pruning,
    Done,
    Failed,
}

/// Options for a refresh run. `cinema_ids` narrows the run to a subset of
/// the reference list (targeted refresh); unknown ids are ignored.
#[derive(Debug, Clone, Default)]
pub struct RefreshOptions {
    pub cinema_ids: Option<Vec<String>>,
}

/// Per-stage counters reported by a successful run. Individual skipped items
/// and batches show up here instead of failing the run.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshSummary {
    pub week_number: i32,
    pub cinemas_targeted: usize,
    pub cinemas_scraped: usize,
    pub batches_failed: usize,
    pub films_processed: usize,
    pub films_skipped: usize,
    pub films_created: u64,
    pub films_updated: u64,
    pub films_failed: u64,
    pub stale_deleted: u64,
    pub duration_seconds: f64,
}

/// Orchestrates the weekly catalog refresh: verify the embedding model,
/// scrape in bounded batches, transform, embed, upsert, prune.
///
/// At most one run may be active at a time; a concurrent trigger is
/// rejected with `RefreshInProgress`. Per-film and per-batch errors are
/// absorbed into the summary; model unavailability, a fully-failed fetch or
/// an empty transform abort the run before any write.
pub struct RefreshService {
    catalog: Arc<dyn CatalogStore>,
    cinemas: Arc<dyn CinemaStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    source: Arc<dyn ShowtimeSource>,
    batch_size: usize,
    running: tokio::sync::Mutex<()>,
    stage: std::sync::Mutex<RunStage>,
}

impl RefreshService {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        cinemas: Arc<dyn CinemaStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
        source: Arc<dyn ShowtimeSource>,
        batch_size: usize,
    ) -> Self {
        Self {
            catalog,
            cinemas,
            embeddings,
            source,
            batch_size: batch_size.max(1),
            running: tokio::sync::Mutex::new(()),
            stage: std::sync::Mutex::new(RunStage::Idle),
        }
    }

    /// Current stage of the active (or last) run
    pub fn stage(&self) -> RunStage {
        *self
            .stage
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn set_stage(&self, stage: RunStage) {
        tracing::info!(stage = ?stage, "Refresh stage");
        *self
            .stage
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = stage;
    }

    /// Runs one full refresh. Rejects a trigger while another run is active.
    pub async fn run(&self, options: RefreshOptions) -> AppResult<RefreshSummary> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| AppError::RefreshInProgress)?;

        let started = Instant::now();
        let result = self.execute(options, started).await;

        match &result {
            Ok(summary) => {
                self.set_stage(RunStage::Done);
                tracing::info!(
                    week_number = summary.week_number,
                    films_processed = summary.films_processed,
                    films_created = summary.films_created,
                    films_updated = summary.films_updated,
                    stale_deleted = summary.stale_deleted,
                    duration_seconds = summary.duration_seconds,
                    "Catalog refresh finished"
                );
            }
            Err(e) => {
                self.set_stage(RunStage::Failed);
                tracing::error!(error = %e, "Catalog refresh aborted");
            }
        }

        result
    }

    async fn execute(
        &self,
        options: RefreshOptions,
        started: Instant,
    ) -> AppResult<RefreshSummary> {
        // Verifying: nothing is written unless the model answers
        self.set_stage(RunStage::Verifying);
        if !self.embeddings.is_model_available().await? {
            return Err(AppError::ModelUnavailable(
                self.embeddings.model_name().to_string(),
            ));
        }

        // Fetching
        self.set_stage(RunStage::Fetching);
        let targets = self.resolve_targets(&options).await?;
        let total_batches = targets.len().div_ceil(self.batch_size);
        tracing::info!(
            cinemas = targets.len(),
            batches = total_batches,
            batch_size = self.batch_size,
            "Scraping cinema programmes"
        );

        let mut scraped = Vec::new();
        let mut batches_failed = 0usize;

        for (index, chunk) in targets.chunks(self.batch_size).enumerate() {
            match self.source.fetch_showtimes(chunk).await {
                Ok(payload) => {
                    tracing::info!(
                        batch = index + 1,
                        total_batches,
                        cinemas = payload.cinemas.len(),
                        "Scrape batch succeeded"
                    );
                    scraped.extend(payload.cinemas);
                }
                Err(e) => {
                    // Partial success is not fatal at the batch level
                    tracing::warn!(
                        batch = index + 1,
                        total_batches,
                        error = %e,
                        "Scrape batch failed, skipping"
                    );
                    batches_failed += 1;
                }
            }
        }

        if scraped.is_empty() {
            return Err(AppError::RefreshFailed(
                "no cinemas could be scraped".to_string(),
            ));
        }
        let cinemas_scraped = scraped.len();

        // Transforming: normalize, then embed what survived
        self.set_stage(RunStage::Transforming);
        let week_number = current_week_number();
        let payload = ScrapePayload { cinemas: scraped };
        let transformed = transform_payload(&payload, week_number, chrono::Utc::now());
        let mut films_skipped = transformed.skipped;

        let texts: Vec<String> = transformed
            .films
            .iter()
            .map(|f| f.embedding_text.clone())
            .collect();
        let vectors = self.embeddings.embed_all(&texts).await;

        let mut records: Vec<FilmRecord> = Vec::with_capacity(transformed.films.len());
        for (pending, vector) in transformed.films.into_iter().zip(vectors) {
            match vector {
                Some(embedding) => {
                    let mut record = pending.record;
                    record.embedding = embedding;
                    records.push(record);
                }
                None => {
                    tracing::warn!(
                        composite_id = %pending.record.composite_id,
                        "Embedding failed for film, skipping"
                    );
                    films_skipped += 1;
                }
            }
        }

        if records.is_empty() {
            return Err(AppError::RefreshFailed(
                "no films could be transformed".to_string(),
            ));
        }
        tracing::info!(films = records.len(), skipped = films_skipped, "Films embedded");

        // Upserting
        self.set_stage(RunStage::Upserting);
        let outcome = self.catalog.bulk_upsert(&records).await?;

        // Pruning: reclaim weeks that fell out of the retention window
        self.set_stage(RunStage::Pruning);
        let stale_deleted = self
            .catalog
            .delete_older_than(week_number - STALE_WEEKS)
            .await?;
        tracing::info!(stale_deleted, "Stale films pruned");

        Ok(RefreshSummary {
            week_number,
            cinemas_targeted: targets.len(),
            cinemas_scraped,
            batches_failed,
            films_processed: records.len(),
            films_skipped,
            films_created: outcome.created,
            films_updated: outcome.updated,
            films_failed: outcome.failed,
            stale_deleted,
            duration_seconds: started.elapsed().as_secs_f64(),
        })
    }

    /// The cinema ids this run covers: the full reference list, or the
    /// requested subset intersected with it (unknown ids are dropped).
    async fn resolve_targets(&self, options: &RefreshOptions) -> AppResult<Vec<String>> {
        let reference = self.cinemas.find_all().await?;

        let targets: Vec<String> = match &options.cinema_ids {
            Some(requested) if !requested.is_empty() => {
                let requested: HashSet<&str> = requested.iter().map(String::as_str).collect();
                reference
                    .iter()
                    .filter(|c| requested.contains(c.id.as_str()))
                    .map(|c| c.id.clone())
                    .collect()
            }
            _ => reference.iter().map(|c| c.id.clone()).collect(),
        };

        if targets.is_empty() {
            return Err(AppError::RefreshFailed(
                "no cinemas in the requested scope".to_string(),
            ));
        }

        Ok(targets)
    }
}
