use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::EMBEDDING_DIM;

/// Timeout budget per embedding call
const EMBED_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause between consecutive calls in `embed_all`, keeping the provider's
/// rate limit happy during ingestion
const BATCH_DELAY: Duration = Duration::from_millis(100);

/// Text embedding provider boundary
///
/// `embed` is the query-context entry point: a query needs exactly one
/// vector, so failures propagate. `embed_all` is the ingestion-context
/// variant: a failed item yields a `None` slot and the remaining items
/// continue.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds one text into exactly `EMBEDDING_DIM` components.
    ///
    /// Fails with `EmbeddingUnavailable` when the endpoint is unreachable
    /// and `EmbeddingDimensionMismatch` when the model returns the wrong
    /// length; a wrong-length vector is never truncated or padded.
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>>;

    /// Embeds texts sequentially; one slot per input, `None` where the call
    /// failed.
    async fn embed_all(&self, texts: &[String]) -> Vec<Option<Vec<f32>>>;

    /// Whether the configured model is installed on the backing endpoint
    async fn is_model_available(&self) -> AppResult<bool>;

    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// Ollama-backed embedding provider
pub struct OllamaEmbeddings {
    http_client: HttpClient,
    base_url: String,
    model: String,
}

impl OllamaEmbeddings {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            base_url,
            model,
        }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OllamaEmbeddings {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .timeout(EMBED_TIMEOUT)
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    AppError::EmbeddingUnavailable(format!(
                        "cannot reach {}: {}",
                        self.base_url, e
                    ))
                } else {
                    AppError::HttpClient(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Embedding request failed");
            return Err(AppError::EmbeddingUnavailable(format!(
                "endpoint returned status {}",
                status
            )));
        }

        let payload: EmbeddingResponse = response.json().await?;

        if payload.embedding.len() != EMBEDDING_DIM {
            return Err(AppError::EmbeddingDimensionMismatch {
                expected: EMBEDDING_DIM,
                got: payload.embedding.len(),
            });
        }

        Ok(payload.embedding)
    }

    async fn embed_all(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for (index, text) in texts.iter().enumerate() {
            match self.embed(text).await {
                Ok(vector) => embeddings.push(Some(vector)),
                Err(e) => {
                    tracing::warn!(index, error = %e, "Embedding failed for item, skipping");
                    embeddings.push(None);
                }
            }

            if index + 1 < texts.len() {
                tokio::time::sleep(BATCH_DELAY).await;
            }
        }

        embeddings
    }

    async fn is_model_available(&self) -> AppResult<bool> {
        let url = format!("{}/api/tags", self.base_url);

        let response = match self.http_client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "Could not query model list");
                return Ok(false);
            }
        };

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Model list request failed");
            return Ok(false);
        }

        let tags: TagsResponse = response.json().await?;
        let available = tags.models.iter().any(|m| m.name.contains(&self.model));

        if available {
            tracing::info!(model = %self.model, "Embedding model available");
        } else {
            tracing::warn!(model = %self.model, "Embedding model not installed");
        }

        Ok(available)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
