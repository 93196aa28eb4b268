use sqlx::{postgres::PgPoolOptions, PgPool};

/// Retrieval traffic is read-heavy and short-lived; a small pool is plenty,
/// and the weekly refresh writes through the same connections.
const MAX_CONNECTIONS: u32 = 5;

/// Creates the PostgreSQL connection pool backing the film catalog and the
/// cinema reference list.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect(database_url)
        .await?;

    Ok(pool)
}
