use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a conversation message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One entry in a session's append-only message log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Free-form context attached to a message, e.g. the preferences and
    /// cinemas behind an assistant reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// A role/content pair, the shape the text-generation collaborator consumes
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatTurn {
    pub role: MessageRole,
    pub content: String,
}

/// Accumulated user preferences for a session. Each field is independently
/// optional; updates merge field-by-field and never replace the whole set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Preferences {
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub actors: Vec<String>,
    #[serde(default)]
    pub director: Option<String>,
    #[serde(default)]
    pub max_duration: Option<u32>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// A partial preference update. Absent fields leave the existing values
/// untouched; present fields override them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferencePatch {
    pub postal_code: Option<String>,
    pub genre: Option<String>,
    pub actors: Option<Vec<String>>,
    pub director: Option<String>,
    pub max_duration: Option<u32>,
    pub keywords: Option<Vec<String>>,
}

impl Preferences {
    /// Shallow field-by-field merge: later non-absent fields win.
    pub fn merge(&mut self, patch: PreferencePatch) {
        if let Some(postal_code) = patch.postal_code {
            self.postal_code = Some(postal_code);
        }
        if let Some(genre) = patch.genre {
            self.genre = Some(genre);
        }
        if let Some(actors) = patch.actors {
            self.actors = actors;
        }
        if let Some(director) = patch.director {
            self.director = Some(director);
        }
        if let Some(max_duration) = patch.max_duration {
            self.max_duration = Some(max_duration);
        }
        if let Some(keywords) = patch.keywords {
            self.keywords = keywords;
        }
    }

    /// True when no preference field carries a value
    pub fn is_empty(&self) -> bool {
        self.postal_code.is_none()
            && self.genre.is_none()
            && self.actors.is_empty()
            && self.director.is_none()
            && self.max_duration.is_none()
            && self.keywords.is_empty()
    }
}

/// One chat session: message history plus merged preferences.
///
/// Expiry (24h of inactivity) is enforced by the session store's TTL; an
/// expired session reads as not-found even if still physically present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
    pub preferences: Preferences,
    pub last_interaction: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ConversationSession {
    pub fn new(session_id: String) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            messages: Vec::new(),
            preferences: Preferences::default(),
            last_interaction: now,
            created_at: now,
        }
    }

    /// Appends to the message log and marks the session active.
    pub fn push_message(
        &mut self,
        role: MessageRole,
        content: String,
        metadata: Option<serde_json::Value>,
    ) {
        self.messages.push(ChatMessage {
            role,
            content,
            timestamp: Utc::now(),
            metadata,
        });
        self.last_interaction = Utc::now();
    }

    /// The last `limit` messages as role/content pairs, oldest first.
    pub fn recent_history(&self, limit: usize) -> Vec<ChatTurn> {
        let start = self.messages.len().saturating_sub(limit);
        self.messages[start..]
            .iter()
            .map(|m| ChatTurn {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_does_not_clobber_other_fields() {
        let mut prefs = Preferences::default();
        prefs.merge(PreferencePatch {
            genre: Some("action".to_string()),
            ..Default::default()
        });
        prefs.merge(PreferencePatch {
            director: Some("Nolan".to_string()),
            ..Default::default()
        });

        assert_eq!(prefs.genre.as_deref(), Some("action"));
        assert_eq!(prefs.director.as_deref(), Some("Nolan"));
    }

    #[test]
    fn test_merge_overrides_present_fields() {
        let mut prefs = Preferences {
            genre: Some("drama".to_string()),
            ..Default::default()
        };
        prefs.merge(PreferencePatch {
            genre: Some("thriller".to_string()),
            ..Default::default()
        });
        assert_eq!(prefs.genre.as_deref(), Some("thriller"));
    }

    #[test]
    fn test_merge_absent_fields_leave_values_untouched() {
        let mut prefs = Preferences {
            postal_code: Some("75001".to_string()),
            actors: vec!["Tom Cruise".to_string()],
            ..Default::default()
        };
        prefs.merge(PreferencePatch::default());
        assert_eq!(prefs.postal_code.as_deref(), Some("75001"));
        assert_eq!(prefs.actors, vec!["Tom Cruise".to_string()]);
    }

    #[test]
    fn test_is_empty() {
        assert!(Preferences::default().is_empty());
        let prefs = Preferences {
            keywords: vec!["space".to_string()],
            ..Default::default()
        };
        assert!(!prefs.is_empty());
    }

    #[test]
    fn test_recent_history_limits_and_preserves_order() {
        let mut session = ConversationSession::new("s1".to_string());
        for i in 0..15 {
            let role = if i % 2 == 0 {
                MessageRole::User
            } else {
                MessageRole::Assistant
            };
            session.push_message(role, format!("msg {}", i), None);
        }

        let history = session.recent_history(10);
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].content, "msg 5");
        assert_eq!(history[9].content, "msg 14");
    }

    #[test]
    fn test_push_message_updates_last_interaction() {
        let mut session = ConversationSession::new("s1".to_string());
        let before = session.last_interaction;
        session.push_message(MessageRole::User, "hello".to_string(), None);
        assert!(session.last_interaction >= before);
        assert_eq!(session.messages.len(), 1);
    }
}
