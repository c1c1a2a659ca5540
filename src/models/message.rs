use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ChatMode;

/// Prefix of assistant messages that report a failed request.
pub const ERROR_PREFIX: &str = "Sorry, I couldn't respond. ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Whether TTS audio for this message is currently playing.
    /// Presentation state only, never persisted.
    #[serde(skip)]
    pub is_playing: bool,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            is_playing: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Whether this message belongs in persistent history for a
    /// conversation in `mode`. Welcome and error placeholders are
    /// regenerated at bind time and must not accumulate across
    /// sessions.
    pub fn is_durable(&self, mode: ChatMode) -> bool {
        match self.role {
            Role::User => true,
            Role::Assistant => {
                self.content != mode.welcome_text() && !self.content.starts_with(ERROR_PREFIX)
            }
            Role::System => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_are_always_durable() {
        let msg = Message::user("hello");
        assert!(msg.is_durable(ChatMode::General));
        assert!(msg.is_durable(ChatMode::Sbr));
    }

    #[test]
    fn welcome_message_is_not_durable_in_its_mode() {
        let msg = Message::assistant(ChatMode::Sbr.welcome_text());
        assert!(!msg.is_durable(ChatMode::Sbr));
        // A different mode's welcome text is ordinary assistant content.
        assert!(msg.is_durable(ChatMode::General));
    }

    #[test]
    fn error_message_is_not_durable() {
        let msg = Message::assistant(format!("{}connection reset", ERROR_PREFIX));
        assert!(!msg.is_durable(ChatMode::General));
        assert!(!msg.is_durable(ChatMode::Sbr));
    }

    #[test]
    fn system_messages_are_not_durable() {
        let msg = Message::system("context");
        assert!(!msg.is_durable(ChatMode::Sbr));
    }

    #[test]
    fn serialization_round_trip_preserves_identity() {
        let original = Message::assistant("Hi there");
        let json = serde_json::to_string(&original).unwrap();
        let decoded: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.id, original.id);
    }

    #[test]
    fn playback_flag_is_never_serialized() {
        let mut msg = Message::assistant("speaking");
        msg.is_playing = true;
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("isPlaying"));
        let decoded: Message = serde_json::from_str(&json).unwrap();
        assert!(!decoded.is_playing);
    }
}
