use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ChatMode, Message, Role};

const TITLE_MAX_CHARS: usize = 30;
const TITLE_PLACEHOLDER: &str = "New Chat";

/// A persisted conversation. The durable message list is stored as a
/// serialized blob so the entity stays cheap to list and sort.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    messages_data: String,
    #[serde(default)]
    pub mode: ChatMode,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(messages: Vec<Message>, mode: ChatMode) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            messages_data: Self::encode(&messages),
            mode,
            created_at: now,
            updated_at: now,
        }
    }

    /// The durable message list. Corrupt or missing backing data
    /// degrades to an empty list instead of failing the caller.
    pub fn messages(&self) -> Vec<Message> {
        Self::decode(&self.messages_data)
    }

    /// Replaces the message list and refreshes `updated_at`.
    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.messages_data = Self::encode(&messages);
        self.updated_at = Utc::now();
    }

    /// Title derived from the first user message, truncated to
    /// 30 characters with an ellipsis.
    pub fn title(&self) -> String {
        let first_user = self
            .messages()
            .into_iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content);

        let title = match first_user {
            Some(content) => content,
            None => return TITLE_PLACEHOLDER.to_string(),
        };

        if title.chars().count() > TITLE_MAX_CHARS {
            let truncated: String = title.chars().take(TITLE_MAX_CHARS).collect();
            format!("{truncated}…")
        } else {
            title
        }
    }

    /// Human-readable "updated ... ago" string for list rows.
    pub fn updated_display(&self) -> String {
        let elapsed = Utc::now().signed_duration_since(self.updated_at);
        if elapsed.num_seconds() < 60 {
            "just now".to_string()
        } else if elapsed.num_minutes() < 60 {
            format!("{}m ago", elapsed.num_minutes())
        } else if elapsed.num_hours() < 24 {
            format!("{}h ago", elapsed.num_hours())
        } else {
            format!("{}d ago", elapsed.num_days())
        }
    }

    fn encode(messages: &[Message]) -> String {
        serde_json::to_string(messages).unwrap_or_default()
    }

    fn decode(data: &str) -> Vec<Message> {
        serde_json::from_str(data).unwrap_or_default()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(Vec::new(), ChatMode::default())
    }
}
