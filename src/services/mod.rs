pub mod embeddings;
pub mod ingestion;
pub mod retrieval;
pub mod scraper;
pub mod sessions;
pub mod transform;

pub use embeddings::{EmbeddingProvider, OllamaEmbeddings};
pub use ingestion::{RefreshOptions, RefreshService, RefreshSummary, RunStage};
pub use retrieval::{RetrievalService, DEFAULT_TOP_K};
pub use scraper::{ShowtimeSource, SubprocessScraper};
pub use sessions::{SessionService, HISTORY_LIMIT};
