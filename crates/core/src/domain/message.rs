use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::session::SessionId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// `InitialContext` marks the hidden briefing turn synthesized from the
/// declared context. It feeds the generation transcript but is excluded from
/// every guest-facing history read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Standard,
    InitialContext,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::InitialContext => "initial_context",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub session_id: SessionId,
    pub role: MessageRole,
    pub kind: MessageKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(session_id: SessionId, content: impl Into<String>) -> Self {
        Self::new(session_id, MessageRole::User, MessageKind::Standard, content)
    }

    pub fn assistant(session_id: SessionId, content: impl Into<String>) -> Self {
        Self::new(session_id, MessageRole::Assistant, MessageKind::Standard, content)
    }

    pub fn initial_context(session_id: SessionId, content: impl Into<String>) -> Self {
        Self::new(session_id, MessageRole::User, MessageKind::InitialContext, content)
    }

    fn new(
        session_id: SessionId,
        role: MessageRole,
        kind: MessageKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId(Uuid::new_v4().to_string()),
            session_id,
            role,
            kind,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Whether the message belongs in guest-facing history.
    pub fn is_visible(&self) -> bool {
        self.kind == MessageKind::Standard
    }
}

#[cfg(test)]
mod tests {
    use super::{Message, MessageKind, MessageRole};
    use crate::domain::session::SessionId;

    #[test]
    fn initial_context_turn_is_hidden_from_history() {
        let briefing = Message::initial_context(SessionId("s-1".to_owned()), "briefing");
        assert_eq!(briefing.role, MessageRole::User);
        assert_eq!(briefing.kind, MessageKind::InitialContext);
        assert!(!briefing.is_visible());
    }

    #[test]
    fn standard_turns_are_visible() {
        let user = Message::user(SessionId("s-1".to_owned()), "something bold with the lamb");
        let assistant = Message::assistant(SessionId("s-1".to_owned()), "Try the Barolo.");
        assert!(user.is_visible());
        assert!(assistant.is_visible());
    }
}
