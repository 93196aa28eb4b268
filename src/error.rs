use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// The embedding model is not installed on the backing endpoint.
    /// Fatal for an ingestion run; nothing is written after this.
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// The embedding endpoint could not be reached or refused the call.
    #[error("Embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The provider returned a vector of the wrong length. Never truncated
    /// or padded; the affected record or query is dropped.
    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    EmbeddingDimensionMismatch { expected: usize, got: usize },

    /// A scrape batch produced no usable data. Recoverable: the batch is
    /// skipped and counted, the run continues.
    #[error("Scrape failed: {0}")]
    ScrapeFailed(String),

    /// A single scraped film could not be turned into a catalog record.
    /// Recoverable: the item is skipped and counted.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// An ingestion run hit a fatal condition and was aborted.
    #[error("Refresh failed: {0}")]
    RefreshFailed(String),

    /// A catalog refresh is already running; runs are never concurrent.
    #[error("A catalog refresh is already in progress")]
    RefreshInProgress,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::SessionNotFound(_) | AppError::NotFound(_) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::RefreshInProgress => (StatusCode::CONFLICT, self.to_string()),
            AppError::ModelUnavailable(_) | AppError::EmbeddingUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            AppError::HttpClient(_)
            | AppError::ScrapeFailed(_)
            | AppError::EmbeddingDimensionMismatch { .. } => {
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
            AppError::InvalidRecord(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::Database(_)
            | AppError::Cache(_)
            | AppError::RefreshFailed(_)
            | AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
