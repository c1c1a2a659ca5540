use serde::{Deserialize, Serialize};

/// Discussion mode of a conversation. The mode decides the welcome
/// message shown in an empty chat and the system prompt sent with
/// every completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    General,
    #[default]
    Sbr,
}

impl ChatMode {
    pub fn welcome_text(self) -> &'static str {
        match self {
            ChatMode::General => "Hi! What would you like to talk about?",
            ChatMode::Sbr => "Hello! How can I help you today?",
        }
    }

    pub fn system_prompt(self) -> &'static str {
        match self {
            ChatMode::General => "You are a helpful, friendly assistant. Keep replies short.",
            ChatMode::Sbr => {
                "You are a helpful assistant on a smartwatch. \
                 Keep responses concise and clear due to the small screen size."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_have_distinct_welcome_text() {
        assert_ne!(ChatMode::General.welcome_text(), ChatMode::Sbr.welcome_text());
    }

    #[test]
    fn wire_tags_are_lowercase() {
        assert_eq!(serde_json::to_string(&ChatMode::Sbr).unwrap(), "\"sbr\"");
        assert_eq!(serde_json::to_string(&ChatMode::General).unwrap(), "\"general\"");
    }

    #[test]
    fn default_mode_matches_stored_conversations() {
        assert_eq!(ChatMode::default(), ChatMode::Sbr);
    }
}
