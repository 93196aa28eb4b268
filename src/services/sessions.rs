use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::db::SessionStore;
use crate::error::{AppError, AppResult};
use crate::models::{ChatTurn, ConversationSession, MessageRole, PreferencePatch, Preferences};

/// Default number of messages handed to the text-generation collaborator
pub const HISTORY_LIMIT: usize = 10;

/// Conversation state on top of the session store.
///
/// Mutations on one session id are serialized through a per-session lock
/// (read-modify-write on the message log and preference map would otherwise
/// lose updates); different sessions never contend with each other.
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    locks: std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// The lock guarding one session id. Entries are dropped when the
    /// session is deleted; a session that merely expires leaves its (tiny)
    /// entry behind until then.
    fn lock_for(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Creates an empty session and returns its id.
    pub async fn create_session(&self) -> AppResult<String> {
        let session_id = Uuid::new_v4().to_string();
        let session = ConversationSession::new(session_id.clone());
        self.store.save(&session).await?;

        tracing::info!(session_id = %session_id, "Session created");
        Ok(session_id)
    }

    /// Loads a session; an expired or unknown id is `SessionNotFound`.
    pub async fn get_session(&self, session_id: &str) -> AppResult<ConversationSession> {
        self.store
            .load(session_id)
            .await?
            .ok_or_else(|| AppError::SessionNotFound(session_id.to_string()))
    }

    /// Appends one message. Never auto-creates: appending to a missing
    /// session fails with `SessionNotFound` and has no side effect.
    pub async fn append_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: String,
        metadata: Option<serde_json::Value>,
    ) -> AppResult<()> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut session = self.get_session(session_id).await?;
        session.push_message(role, content, metadata);
        self.store.save(&session).await?;

        tracing::debug!(session_id = %session_id, role = ?role, "Message appended");
        Ok(())
    }

    /// Merges a partial preference update into the session, field by field,
    /// and returns the merged result.
    pub async fn merge_preferences(
        &self,
        session_id: &str,
        patch: PreferencePatch,
    ) -> AppResult<Preferences> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut session = self.get_session(session_id).await?;
        session.preferences.merge(patch);
        session.last_interaction = Utc::now();
        self.store.save(&session).await?;

        tracing::debug!(session_id = %session_id, "Preferences merged");
        Ok(session.preferences)
    }

    /// The last `limit` messages as role/content pairs, oldest first.
    pub async fn recent_history(&self, session_id: &str, limit: usize) -> AppResult<Vec<ChatTurn>> {
        let session = self.get_session(session_id).await?;
        Ok(session.recent_history(limit))
    }

    pub async fn delete_session(&self, session_id: &str) -> AppResult<()> {
        self.store.delete(session_id).await?;
        self.locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(session_id);

        tracing::info!(session_id = %session_id, "Session deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory stand-in for the redis store; whole-document saves, like
    /// the real thing.
    #[derive(Default)]
    struct MemorySessionStore {
        sessions: std::sync::Mutex<HashMap<String, ConversationSession>>,
    }

    #[async_trait::async_trait]
    impl SessionStore for MemorySessionStore {
        async fn load(&self, session_id: &str) -> AppResult<Option<ConversationSession>> {
            Ok(self.sessions.lock().unwrap().get(session_id).cloned())
        }

        async fn save(&self, session: &ConversationSession) -> AppResult<()> {
            self.sessions
                .lock()
                .unwrap()
                .insert(session.session_id.clone(), session.clone());
            Ok(())
        }

        async fn delete(&self, session_id: &str) -> AppResult<()> {
            self.sessions.lock().unwrap().remove(session_id);
            Ok(())
        }
    }

    fn service() -> (SessionService, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::default());
        (SessionService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let (service, _) = service();
        let id = service.create_session().await.unwrap();

        let session = service.get_session(&id).await.unwrap();
        assert_eq!(session.session_id, id);
        assert!(session.messages.is_empty());
        assert!(session.preferences.is_empty());
    }

    #[tokio::test]
    async fn test_append_message_on_unknown_session_fails_without_side_effect() {
        let (service, store) = service();

        let err = service
            .append_message("missing", MessageRole::User, "hello".to_string(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::SessionNotFound(id) if id == "missing"));
        assert!(store.sessions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_merge_preferences_accumulates_fields() {
        let (service, _) = service();
        let id = service.create_session().await.unwrap();

        service
            .merge_preferences(
                &id,
                PreferencePatch {
                    genre: Some("action".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let merged = service
            .merge_preferences(
                &id,
                PreferencePatch {
                    director: Some("Nolan".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(merged.genre.as_deref(), Some("action"));
        assert_eq!(merged.director.as_deref(), Some("Nolan"));
    }

    #[tokio::test]
    async fn test_recent_history_returns_role_content_pairs() {
        let (service, _) = service();
        let id = service.create_session().await.unwrap();

        service
            .append_message(&id, MessageRole::User, "hi".to_string(), None)
            .await
            .unwrap();
        service
            .append_message(&id, MessageRole::Assistant, "hello".to_string(), None)
            .await
            .unwrap();

        let history = service.recent_history(&id, HISTORY_LIMIT).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[1].content, "hello");
    }

    #[tokio::test]
    async fn test_concurrent_appends_on_one_session_lose_nothing() {
        let (service, _) = service();
        let service = Arc::new(service);
        let id = service.create_session().await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let service = service.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                service
                    .append_message(&id, MessageRole::User, format!("msg {}", i), None)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let session = service.get_session(&id).await.unwrap();
        assert_eq!(session.messages.len(), 20);
    }

    #[tokio::test]
    async fn test_delete_session() {
        let (service, _) = service();
        let id = service.create_session().await.unwrap();

        service.delete_session(&id).await.unwrap();
        assert!(matches!(
            service.get_session(&id).await,
            Err(AppError::SessionNotFound(_))
        ));
    }
}
