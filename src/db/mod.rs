pub mod catalog;
pub mod cinemas;
pub mod postgres;
pub mod redis;
pub mod sessions;

pub use catalog::{CatalogStats, CatalogStore, PgCatalogStore, UpsertOutcome};
pub use cinemas::{CinemaStore, PgCinemaStore};
pub use postgres::create_pool;
pub use redis::create_redis_client;
pub use sessions::{RedisSessionStore, SessionStore, SESSION_TTL_SECONDS};
