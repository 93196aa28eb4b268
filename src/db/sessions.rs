use redis::{AsyncCommands, Client};

use crate::error::{AppError, AppResult};
use crate::models::ConversationSession;

/// Sessions expire after 24h of inactivity. The store enforces this via TTL;
/// every save refreshes the clock, reads do not.
pub const SESSION_TTL_SECONDS: u64 = 86_400;

fn session_key(session_id: &str) -> String {
    format!("session:{}", session_id)
}

/// Durable session storage with store-enforced inactivity expiry.
///
/// An expired session must read as absent even if still physically present;
/// callers never inspect `last_interaction` to decide liveness themselves.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> AppResult<Option<ConversationSession>>;

    /// Persists the session and refreshes its expiry clock
    async fn save(&self, session: &ConversationSession) -> AppResult<()>;

    async fn delete(&self, session_id: &str) -> AppResult<()>;
}

/// Redis-backed session store: one JSON document per session under
/// `session:{id}`, expiry delegated to the key TTL.
pub struct RedisSessionStore {
    redis_client: Client,
    ttl_seconds: u64,
}

impl RedisSessionStore {
    pub fn new(redis_client: Client) -> Self {
        Self {
            redis_client,
            ttl_seconds: SESSION_TTL_SECONDS,
        }
    }
}

#[async_trait::async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, session_id: &str) -> AppResult<Option<ConversationSession>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let cached: Option<String> = conn.get(session_key(session_id)).await?;

        match cached {
            Some(json) => {
                let session: ConversationSession = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Session deserialization error: {}", e))
                })?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, session: &ConversationSession) -> AppResult<()> {
        let json = serde_json::to_string(session)
            .map_err(|e| AppError::Internal(format!("Session serialization error: {}", e)))?;

        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn
            .set_ex(session_key(&session.session_id), json, self.ttl_seconds)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Redis session write failed");
                e
            })?;

        tracing::debug!(
            session_id = %session.session_id,
            ttl = self.ttl_seconds,
            "Session saved"
        );

        Ok(())
    }

    async fn delete(&self, session_id: &str) -> AppResult<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(session_key(session_id)).await?;
        Ok(())
    }
}
