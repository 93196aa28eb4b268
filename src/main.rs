use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use cinerec_api::api::{create_router, AppState};
use cinerec_api::config::Config;
use cinerec_api::db::{
    create_pool, create_redis_client, PgCatalogStore, PgCinemaStore, RedisSessionStore,
};
use cinerec_api::services::{
    OllamaEmbeddings, RefreshService, RetrievalService, SessionService, SubprocessScraper,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let redis_client = create_redis_client(&config.redis_url)?;

    let catalog: Arc<dyn cinerec_api::db::CatalogStore> =
        Arc::new(PgCatalogStore::new(pool.clone()));
    let cinemas: Arc<dyn cinerec_api::db::CinemaStore> = Arc::new(PgCinemaStore::new(pool));
    let embeddings = Arc::new(OllamaEmbeddings::new(
        config.ollama_url.clone(),
        config.embedding_model.clone(),
    ));
    let scraper = Arc::new(SubprocessScraper::new(
        config.scraper_command.clone(),
        config.scraper_script.clone(),
    ));

    let sessions = Arc::new(SessionService::new(Arc::new(RedisSessionStore::new(
        redis_client,
    ))));
    let retrieval = Arc::new(RetrievalService::new(
        catalog.clone(),
        embeddings.clone(),
    ));
    let refresh = Arc::new(RefreshService::new(
        catalog.clone(),
        cinemas.clone(),
        embeddings,
        scraper,
        config.scrape_batch_size,
    ));

    let state = AppState {
        catalog,
        cinemas,
        sessions,
        retrieval,
        refresh,
    };

    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server running");
    axum::serve(listener, app).await?;

    Ok(())
}
