use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::catalog::{CinemaFilmCount, WeekFilmCount};
use crate::error::{AppError, AppResult};
use crate::models::{ChatTurn, Cinema, MessageRole, PreferencePatch, Preferences, RankedFilm};
use crate::services::ingestion::{RefreshOptions, RefreshSummary, RunStage};
use crate::services::{DEFAULT_TOP_K, HISTORY_LIMIT};

use super::AppState;

// Request/Response types

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationRequest {
    /// The user's free-text message, recorded in the session history
    pub message: String,
    pub session_id: Option<String>,
    /// Structured preferences extracted upstream; merged into the session
    pub preferences: Option<PreferencePatch>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub status: RecommendationStatus,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub preferences: Preferences,
    pub cinemas: Vec<Cinema>,
    pub films: Vec<RankedFilm>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    Success,
    NeedsInfo,
    NoResults,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub messages: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
pub struct CinemasResponse {
    pub count: usize,
    pub cinemas: Vec<Cinema>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RefreshRequest {
    /// Restrict the run to these cinema ids; absent means the full list
    pub cinema_ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_films: u64,
    pub total_cinemas: u64,
    pub refresh_stage: RunStage,
    pub films_by_cinema: Vec<CinemaFilmCount>,
    pub films_by_week: Vec<WeekFilmCount>,
}

/// A postal scope is either a 2-digit department or a 5-digit postal code.
fn validate_postal_code(postal_code: &str) -> AppResult<()> {
    let digits_only = postal_code.chars().all(|c| c.is_ascii_digit());
    if !digits_only || !(postal_code.len() == 2 || postal_code.len() == 5) {
        return Err(AppError::InvalidInput(format!(
            "invalid postal code '{}' (2 or 5 digits required)",
            postal_code
        )));
    }
    Ok(())
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Opens a new conversation session
pub async fn start_conversation(
    State(state): State<AppState>,
) -> AppResult<Json<StartSessionResponse>> {
    let session_id = state.sessions.create_session().await?;
    Ok(Json(StartSessionResponse { session_id }))
}

/// Main recommendation entry point: records the message, merges any
/// preference update, scopes candidates to the user's cinemas and returns
/// the ranked films.
pub async fn recommend(
    State(state): State<AppState>,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Json<RecommendationResponse>> {
    if request.message.trim().chars().count() < 3 {
        return Err(AppError::InvalidInput(
            "message must contain at least 3 characters".to_string(),
        ));
    }
    if let Some(patch) = &request.preferences {
        if let Some(postal_code) = &patch.postal_code {
            validate_postal_code(postal_code)?;
        }
    }

    // Reuse the caller's session when it is still alive; otherwise open a
    // fresh one. The session engine itself never auto-creates on append.
    let session_id = match request.session_id {
        Some(id) => {
            if state.sessions.get_session(&id).await.is_ok() {
                id
            } else {
                tracing::info!(session_id = %id, "Session expired or unknown, starting a new one");
                state.sessions.create_session().await?
            }
        }
        None => state.sessions.create_session().await?,
    };

    state
        .sessions
        .append_message(&session_id, MessageRole::User, request.message, None)
        .await?;

    let preferences = match request.preferences {
        Some(patch) => state.sessions.merge_preferences(&session_id, patch).await?,
        None => state.sessions.get_session(&session_id).await?.preferences,
    };

    let Some(postal_code) = preferences.postal_code.clone() else {
        let message = "Could you share your postal code? Genre, duration, favorite \
                       actors or directors also help narrow things down."
            .to_string();
        state
            .sessions
            .append_message(&session_id, MessageRole::Assistant, message.clone(), None)
            .await?;
        return Ok(Json(RecommendationResponse {
            status: RecommendationStatus::NeedsInfo,
            session_id,
            message: Some(message),
            preferences,
            cinemas: Vec::new(),
            films: Vec::new(),
        }));
    };

    let cinemas = state.cinemas.find_by_postal_code(&postal_code).await?;
    if cinemas.is_empty() {
        let message = format!("No cinemas found around postal code {}.", postal_code);
        state
            .sessions
            .append_message(&session_id, MessageRole::Assistant, message.clone(), None)
            .await?;
        return Ok(Json(RecommendationResponse {
            status: RecommendationStatus::NoResults,
            session_id,
            message: Some(message),
            preferences,
            cinemas: Vec::new(),
            films: Vec::new(),
        }));
    }

    let cinema_ids: Vec<String> = cinemas.iter().map(|c| c.id.clone()).collect();
    let films = state
        .retrieval
        .retrieve(&preferences, &cinema_ids, DEFAULT_TOP_K)
        .await?;

    if films.is_empty() {
        let message = "No films currently match your preferences in those cinemas.".to_string();
        state
            .sessions
            .append_message(&session_id, MessageRole::Assistant, message.clone(), None)
            .await?;
        return Ok(Json(RecommendationResponse {
            status: RecommendationStatus::NoResults,
            session_id,
            message: Some(message),
            preferences,
            cinemas,
            films: Vec::new(),
        }));
    }

    let metadata = json!({
        "preferences": preferences,
        "cinemas": cinemas,
    });
    state
        .sessions
        .append_message(
            &session_id,
            MessageRole::Assistant,
            format!("{} film(s) recommended", films.len()),
            Some(metadata),
        )
        .await?;

    Ok(Json(RecommendationResponse {
        status: RecommendationStatus::Success,
        session_id,
        message: None,
        preferences,
        cinemas,
        films,
    }))
}

/// Recent history of a session, for the text-generation collaborator
pub async fn conversation_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> AppResult<Json<HistoryResponse>> {
    let limit = params.limit.unwrap_or(HISTORY_LIMIT);
    let messages = state.sessions.recent_history(&session_id, limit).await?;
    Ok(Json(HistoryResponse {
        session_id,
        messages,
    }))
}

/// Drops a session ahead of its expiry
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<StatusCode> {
    state.sessions.delete_session(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Lists the whole cinema reference list (debug aid)
pub async fn list_cinemas(State(state): State<AppState>) -> AppResult<Json<CinemasResponse>> {
    let cinemas = state.cinemas.find_all().await?;
    Ok(Json(CinemasResponse {
        count: cinemas.len(),
        cinemas,
    }))
}

/// Cinemas matching a postal code or department
pub async fn cinemas_by_postal_code(
    State(state): State<AppState>,
    Path(postal_code): Path<String>,
) -> AppResult<Json<CinemasResponse>> {
    validate_postal_code(&postal_code)?;
    let cinemas = state.cinemas.find_by_postal_code(&postal_code).await?;
    Ok(Json(CinemasResponse {
        count: cinemas.len(),
        cinemas,
    }))
}

/// Triggers a catalog refresh: full when no body is given, scoped to
/// `cinema_ids` otherwise. Rejected with 409 while a run is in flight.
pub async fn refresh_catalog(
    State(state): State<AppState>,
    request: Option<Json<RefreshRequest>>,
) -> AppResult<Json<RefreshSummary>> {
    let Json(request) = request.unwrap_or_default();

    let summary = state
        .refresh
        .run(RefreshOptions {
            cinema_ids: request.cinema_ids,
        })
        .await?;

    Ok(Json(summary))
}

/// Catalog statistics and refresh-stage inspection
pub async fn catalog_stats(State(state): State<AppState>) -> AppResult<Json<StatsResponse>> {
    let stats = state.catalog.stats().await?;
    let total_cinemas = state.cinemas.count().await?;

    Ok(Json(StatsResponse {
        total_films: stats.total_films,
        total_cinemas,
        refresh_stage: state.refresh.stage(),
        films_by_cinema: stats.by_cinema,
        films_by_week: stats.by_week,
    }))
}
