use chrono::{DateTime, Utc};

use crate::models::{composite_id, FilmRecord, Preferences, ScrapePayload};

/// Query used when no preference field carries a value; an empty query text
/// would embed to noise.
const GENERIC_QUERY: &str = "popular well-rated film";

/// At most this many actors contribute to a film's embedding text
const MAX_EMBEDDED_ACTORS: usize = 5;

/// A normalized film record waiting for its embedding, paired with the text
/// the embedding is computed from.
#[derive(Debug, Clone)]
pub struct PendingFilm {
    pub record: FilmRecord,
    pub embedding_text: String,
}

/// Result of transforming a scrape payload: the films that normalized
/// cleanly plus the count of items that were skipped.
#[derive(Debug, Default)]
pub struct TransformOutcome {
    pub films: Vec<PendingFilm>,
    pub skipped: usize,
}

/// Splits a raw genre string on commas, trimming and dropping empties.
pub fn parse_genres(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|g| g.trim())
        .filter(|g| !g.is_empty())
        .map(|g| g.to_string())
        .collect()
}

/// Text a film is embedded from: label-prefixed lines in fixed order, each
/// present only when the field is. Missing fields are omitted entirely,
/// never rendered as empty.
pub fn film_embedding_text(record: &FilmRecord) -> String {
    let mut parts = vec![format!("Title: {}", record.title)];

    if !record.genres_array.is_empty() {
        parts.push(format!("Genres: {}", record.genres_array.join(", ")));
    }

    if let Some(director) = &record.director {
        parts.push(format!("Director: {}", director));
    }

    if !record.actors.is_empty() {
        let actors: Vec<&str> = record
            .actors
            .iter()
            .take(MAX_EMBEDDED_ACTORS)
            .map(String::as_str)
            .collect();
        parts.push(format!("Actors: {}", actors.join(", ")));
    }

    if let Some(duration) = record.duration_minutes {
        parts.push(format!("Duration: {} minutes", duration));
    }

    if let Some(rating) = record.rating {
        parts.push(format!("Rating: {}/5", rating));
    }

    parts.join("\n")
}

/// Query text for a retrieval call, same convention as the film side.
pub fn query_text(preferences: &Preferences) -> String {
    let mut parts = Vec::new();

    if let Some(genre) = &preferences.genre {
        parts.push(format!("Genre: {}", genre));
    }

    if let Some(director) = &preferences.director {
        parts.push(format!("Director: {}", director));
    }

    if !preferences.actors.is_empty() {
        parts.push(format!("Actors: {}", preferences.actors.join(", ")));
    }

    if let Some(max_duration) = preferences.max_duration {
        parts.push(format!("Max duration: {} minutes", max_duration));
    }

    if !preferences.keywords.is_empty() {
        parts.push(format!("Keywords: {}", preferences.keywords.join(", ")));
    }

    if parts.is_empty() {
        return GENERIC_QUERY.to_string();
    }

    parts.join("\n")
}

/// Normalizes a scrape payload into catalog records (minus embeddings).
///
/// A film that cannot be normalized (missing id or title) is logged and
/// skipped; it never aborts the batch.
pub fn transform_payload(
    payload: &ScrapePayload,
    week_number: i32,
    scraped_at: DateTime<Utc>,
) -> TransformOutcome {
    let mut outcome = TransformOutcome::default();

    for cinema in &payload.cinemas {
        tracing::debug!(
            cinema_id = %cinema.cinema_id,
            films = cinema.films.len(),
            "Transforming cinema programme"
        );

        for film in &cinema.films {
            let (film_id, title) = match (&film.film_id, &film.title) {
                (Some(id), Some(title)) if !id.is_empty() && !title.is_empty() => {
                    (id.clone(), title.clone())
                }
                _ => {
                    tracing::warn!(
                        cinema_id = %cinema.cinema_id,
                        title = ?film.title,
                        "Skipping film without id or title"
                    );
                    outcome.skipped += 1;
                    continue;
                }
            };

            let genres_array = film
                .genre
                .as_deref()
                .map(parse_genres)
                .unwrap_or_default();

            let record = FilmRecord {
                composite_id: composite_id(&film_id, &cinema.cinema_id),
                cinema_id: cinema.cinema_id.clone(),
                cinema_name: cinema.cinema_name.clone(),
                film_id,
                title,
                genre: film.genre.clone(),
                genres_array,
                duration_minutes: film.duration_minutes,
                duration_display: film.duration_display.clone(),
                director: film.director.clone(),
                actors: film.actors.clone(),
                rating: film.rating,
                release_date: film.release_date.clone(),
                showtimes: film.showtimes.clone(),
                embedding: Vec::new(),
                week_number,
                scraped_at,
            };

            let embedding_text = film_embedding_text(&record);
            outcome.films.push(PendingFilm {
                record,
                embedding_text,
            });
        }
    }

    outcome
}
