use std::sync::Arc;

use crate::db::CatalogStore;
use crate::error::AppResult;
use crate::models::{FilmRecord, Preferences, RankedFilm};
use crate::services::embeddings::EmbeddingProvider;
use crate::services::transform::query_text;

pub const DEFAULT_TOP_K: usize = 10;

/// Ranks a cinema set's films against a preference query by embedding
/// similarity.
///
/// Read-only and lock-free: concurrent retrievals share no mutable state.
/// Never hard-fails a caller over embedding trouble; it degrades to
/// unranked candidates instead.
pub struct RetrievalService {
    catalog: Arc<dyn CatalogStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
}

impl RetrievalService {
    pub fn new(catalog: Arc<dyn CatalogStore>, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self { catalog, embeddings }
    }

    /// Top `top_k` films across the given cinemas, best match first.
    ///
    /// An empty cinema set yields an empty result, not an error. Ties are
    /// broken by rating (descending) then composite id (ascending), so a
    /// fixed input always ranks identically.
    pub async fn retrieve(
        &self,
        preferences: &Preferences,
        cinema_ids: &[String],
        top_k: usize,
    ) -> AppResult<Vec<RankedFilm>> {
        if cinema_ids.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self.catalog.find_by_cinemas(cinema_ids).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let text = query_text(preferences);
        tracing::debug!(
            candidates = candidates.len(),
            query = %text,
            "Scoring retrieval candidates"
        );

        let query = match self.embeddings.embed(&text).await {
            Ok(vector) => normalize(&vector),
            Err(e) => {
                tracing::warn!(error = %e, "Query embedding failed, returning unranked candidates");
                return Ok(fallback(candidates, top_k));
            }
        };

        // Cosine over normalized vectors; candidates are normalized here too
        // so ranking stays scale-invariant whatever the provider emits.
        let mut scored: Vec<(usize, f32)> = candidates
            .iter()
            .enumerate()
            .filter_map(|(index, record)| {
                if record.embedding.len() != query.len() {
                    tracing::warn!(
                        composite_id = %record.composite_id,
                        got = record.embedding.len(),
                        "Candidate embedding has wrong dimension, skipping"
                    );
                    return None;
                }
                Some((index, dot(&query, &normalize(&record.embedding))))
            })
            .collect();

        if scored.is_empty() {
            tracing::warn!("No candidate could be scored, returning unranked candidates");
            return Ok(fallback(candidates, top_k));
        }

        scored.sort_by(|(ia, sa), (ib, sb)| {
            sb.total_cmp(sa)
                .then_with(|| {
                    let ra = candidates[*ia].rating.unwrap_or(0.0);
                    let rb = candidates[*ib].rating.unwrap_or(0.0);
                    rb.total_cmp(&ra)
                })
                .then_with(|| candidates[*ia].composite_id.cmp(&candidates[*ib].composite_id))
        });
        scored.truncate(top_k);

        let mut slots: Vec<Option<FilmRecord>> = candidates.into_iter().map(Some).collect();
        let ranked = scored
            .into_iter()
            .filter_map(|(index, score)| {
                slots[index]
                    .take()
                    .map(|record| RankedFilm::from_record(record, Some(score)))
            })
            .collect();

        Ok(ranked)
    }
}

/// Unranked degradation: up to `top_k` candidates in catalog order.
fn fallback(candidates: Vec<FilmRecord>, top_k: usize) -> Vec<RankedFilm> {
    candidates
        .into_iter()
        .take(top_k)
        .map(|record| RankedFilm::from_record(record, None))
        .collect()
}

fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|x| x / norm).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
