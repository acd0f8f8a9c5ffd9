//! Session identity and conversation history
//!
//! A session is created on first ingest and identified by a sortable string
//! id. Conversation history lives in a [`SessionStore`] injected into the
//! callers that need it; the retrieval core itself never mutates history.

use ahash::AHashMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use uuid::Uuid;

/// Generate a unique session identifier.
///
/// Format: `session_<UTC timestamp>_<8 hex chars>`, e.g.
/// `session_20250114_093012_3fa9c1d2`. Ids sort by creation time at second
/// granularity; the suffix carries 32 bits of randomness so that two calls
/// in the same instant do not collide.
pub fn generate_session_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let unique = Uuid::new_v4().simple().to_string();
    format!("session_{}_{}", timestamp, &unique[..8])
}

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Wire name used by chat-completion APIs
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single role-tagged message in a session's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A completed (question, answer) exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub user: String,
    pub assistant: String,
}

/// Conversation history store keyed by session id
///
/// Injected into callers rather than accessed as ambient global state, so a
/// persistent implementation can be swapped in without touching the
/// retrieval core.
pub trait SessionStore: Send + Sync {
    /// Full history for a session, oldest first. Unknown sessions yield an
    /// empty history.
    fn history(&self, session_id: &str) -> Vec<ChatMessage>;

    /// Append a completed turn to a session's history.
    fn append(&self, session_id: &str, turn: ChatTurn);

    /// Drop a session's history.
    fn clear(&self, session_id: &str);
}

/// In-memory session store
///
/// History lives only as long as the process; the on-disk index for the
/// same session id survives independently.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<AHashMap<String, Vec<ChatMessage>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn history(&self, session_id: &str) -> Vec<ChatMessage> {
        self.sessions
            .read()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    fn append(&self, session_id: &str, turn: ChatTurn) {
        let mut sessions = self.sessions.write().unwrap();
        let history = sessions.entry(session_id.to_string()).or_default();
        history.push(ChatMessage::user(turn.user));
        history.push(ChatMessage::assistant(turn.assistant));
    }

    fn clear(&self, session_id: &str) {
        self.sessions.write().unwrap().remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_format() {
        let id = generate_session_id();
        assert!(id.starts_with("session_"));

        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[1].len(), 8); // date
        assert_eq!(parts[2].len(), 6); // time
        assert_eq!(parts[3].len(), 8); // random suffix
        assert!(parts[3].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_session_id_uniqueness() {
        let ids: std::collections::HashSet<String> =
            (0..1000).map(|_| generate_session_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_memory_store_append_and_history() {
        let store = MemorySessionStore::new();
        assert!(store.history("s1").is_empty());

        store.append(
            "s1",
            ChatTurn {
                user: "hello".to_string(),
                assistant: "hi".to_string(),
            },
        );

        let history = store.history("s1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "hello");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "hi");
    }

    #[test]
    fn test_memory_store_isolates_sessions() {
        let store = MemorySessionStore::new();
        store.append(
            "a",
            ChatTurn {
                user: "q".to_string(),
                assistant: "a".to_string(),
            },
        );

        assert_eq!(store.history("a").len(), 2);
        assert!(store.history("b").is_empty());

        store.clear("a");
        assert!(store.history("a").is_empty());
    }
}
