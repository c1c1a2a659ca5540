use log::debug;
use uuid::Uuid;

use super::chat_client::ChatBackend;
use super::conversation_store::{ConversationStore, StoreError};
use crate::models::{ChatMode, Conversation, Message, Role, ERROR_PREFIX};

/// Bridges a bound conversation with the chat backend, keeping durable
/// history separate from transient welcome/error messages.
///
/// All methods take `&mut self`: conversation state has a single owner
/// and every mutation happens on it. Overlapping sends are not
/// serialized by this type; callers should disable re-entrant sends at
/// the UI boundary.
pub struct ChatSessionManager<C: ChatBackend> {
    backend: C,
    store: ConversationStore,
    conversation: Option<Conversation>,
    messages: Vec<Message>,
    is_loading: bool,
    last_error: Option<String>,
}

impl<C: ChatBackend> ChatSessionManager<C> {
    pub fn new(backend: C, store: ConversationStore) -> Self {
        Self {
            backend,
            store,
            conversation: None,
            messages: Vec::new(),
            is_loading: false,
            last_error: None,
        }
    }

    /// The working message list, including transient messages.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    /// Binds a conversation: loads its durable messages, replays them
    /// into the backend context, and greets an empty conversation with
    /// the mode's welcome message.
    pub fn bind(&mut self, conversation: Conversation) -> Result<(), StoreError> {
        let mode = conversation.mode;
        let stored = conversation.messages();

        // Stored sets may carry non-durable leftovers written under an
        // earlier classification rule; drop them and rewrite at once.
        let durable: Vec<Message> = stored
            .iter()
            .filter(|m| m.is_durable(mode))
            .cloned()
            .collect();
        let needs_rewrite = durable.len() != stored.len();

        self.conversation = Some(conversation);
        self.messages = durable;
        self.last_error = None;

        if needs_rewrite {
            debug!("dropping stale non-durable messages on bind");
            self.persist()?;
        }

        self.backend.clear_context();
        self.backend.set_system_prompt(mode.system_prompt());
        for message in &self.messages {
            if message.role != Role::System {
                self.backend.restore(message.role, &message.content);
            }
        }

        if self.messages.is_empty() {
            self.add_welcome_message()?;
        }
        Ok(())
    }

    /// Sends a user message: appends it immediately, persists, then
    /// issues one request to the backend. On failure the reply slot is
    /// filled with a transient error message instead.
    pub async fn send_message(&mut self, content: &str) -> Result<(), StoreError> {
        let trimmed = content.trim().to_string();
        if trimmed.is_empty() {
            return Ok(());
        }

        self.messages.push(Message::user(trimmed.as_str()));
        self.persist()?;

        self.is_loading = true;
        self.last_error = None;

        match self.backend.send(&trimmed).await {
            Ok(reply) => {
                self.is_loading = false;
                self.messages.push(Message::assistant(reply));
                self.persist()?;
            }
            Err(err) => {
                self.is_loading = false;
                self.last_error = Some(err.to_string());
                self.messages.push(Message::assistant(format!("{ERROR_PREFIX}{err}")));
                self.persist()?;
            }
        }
        Ok(())
    }

    /// Empties the conversation and starts fresh with a welcome
    /// message.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.stop_all_playback();
        self.backend.clear_context();
        self.messages.clear();
        self.last_error = None;
        self.persist()?;
        self.add_welcome_message()
    }

    /// Marks a message's audio as playing or stopped. Presentation
    /// state only; never persisted.
    pub fn set_playing(&mut self, message_id: Uuid, is_playing: bool) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == message_id) {
            message.is_playing = is_playing;
        }
    }

    pub fn stop_all_playback(&mut self) {
        for message in &mut self.messages {
            message.is_playing = false;
        }
    }

    fn mode(&self) -> ChatMode {
        self.conversation
            .as_ref()
            .map(|c| c.mode)
            .unwrap_or_default()
    }

    fn add_welcome_message(&mut self) -> Result<(), StoreError> {
        let welcome = Message::assistant(self.mode().welcome_text());
        self.messages.push(welcome);
        self.persist()
    }

    /// Writes the durable subset of the working list through to the
    /// bound conversation.
    fn persist(&mut self) -> Result<(), StoreError> {
        let conversation = match self.conversation.as_mut() {
            Some(conversation) => conversation,
            None => return Ok(()),
        };
        let durable: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| m.is_durable(conversation.mode))
            .cloned()
            .collect();
        conversation.set_messages(durable);
        self.store.save(conversation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::chat_client::ChatApiError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeBackend {
        system_prompt: String,
        context: Vec<(Role, String)>,
        replies: VecDeque<Result<String, ChatApiError>>,
    }

    impl FakeBackend {
        fn replying(reply: &str) -> Self {
            let mut backend = Self::default();
            backend.replies.push_back(Ok(reply.to_string()));
            backend
        }

        fn failing() -> Self {
            let mut backend = Self::default();
            backend
                .replies
                .push_back(Err(ChatApiError::Api("boom".to_string())));
            backend
        }
    }

    #[async_trait]
    impl ChatBackend for FakeBackend {
        fn clear_context(&mut self) {
            self.context.clear();
        }

        fn restore(&mut self, role: Role, content: &str) {
            self.context.push((role, content.to_string()));
        }

        fn set_system_prompt(&mut self, prompt: &str) {
            self.system_prompt = prompt.to_string();
        }

        async fn send(&mut self, content: &str) -> Result<String, ChatApiError> {
            self.context.push((Role::User, content.to_string()));
            self.replies
                .pop_front()
                .unwrap_or(Err(ChatApiError::EmptyResponse))
        }
    }

    fn manager(backend: FakeBackend) -> (TempDir, ChatSessionManager<FakeBackend>) {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::with_dir(dir.path().to_path_buf());
        (dir, ChatSessionManager::new(backend, store))
    }

    fn reload(dir: &TempDir, id: Uuid) -> Conversation {
        ConversationStore::with_dir(dir.path().to_path_buf())
            .load(id)
            .unwrap()
    }

    #[test]
    fn binding_an_empty_conversation_adds_a_transient_welcome() {
        let (dir, mut manager) = manager(FakeBackend::default());
        let conversation = Conversation::new(Vec::new(), ChatMode::Sbr);
        let id = conversation.id;
        manager.bind(conversation).unwrap();

        assert_eq!(manager.messages().len(), 1);
        assert_eq!(manager.messages()[0].content, ChatMode::Sbr.welcome_text());
        // Nothing durable is written through.
        assert!(reload(&dir, id).messages().is_empty());
    }

    #[test]
    fn welcome_text_follows_the_conversation_mode() {
        let (_dir, mut manager) = manager(FakeBackend::default());
        manager
            .bind(Conversation::new(Vec::new(), ChatMode::General))
            .unwrap();
        assert_eq!(
            manager.messages()[0].content,
            ChatMode::General.welcome_text()
        );
    }

    #[test]
    fn bind_replays_durable_history_into_the_backend() {
        let (_dir, mut manager) = manager(FakeBackend::default());
        let conversation = Conversation::new(
            vec![
                Message::system("setup"),
                Message::user("question"),
                Message::assistant("answer"),
            ],
            ChatMode::Sbr,
        );
        manager.bind(conversation).unwrap();

        let backend = &manager.backend;
        assert_eq!(backend.system_prompt, ChatMode::Sbr.system_prompt());
        // System messages are not replayed as turns.
        assert_eq!(
            backend.context,
            vec![
                (Role::User, "question".to_string()),
                (Role::Assistant, "answer".to_string()),
            ]
        );
    }

    #[test]
    fn bind_drops_stale_non_durable_messages_and_rewrites() {
        let (dir, mut manager) = manager(FakeBackend::default());
        let conversation = Conversation::new(
            vec![
                Message::assistant(ChatMode::Sbr.welcome_text()),
                Message::user("real question"),
                Message::assistant(format!("{ERROR_PREFIX}old failure")),
            ],
            ChatMode::Sbr,
        );
        let id = conversation.id;
        manager.bind(conversation).unwrap();

        assert_eq!(manager.messages().len(), 1);
        assert_eq!(manager.messages()[0].content, "real question");

        let stored = reload(&dir, id).messages();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "real question");
    }

    #[tokio::test]
    async fn successful_send_persists_both_turns() {
        let (dir, mut manager) = manager(FakeBackend::replying("Hi there"));
        let conversation = Conversation::new(Vec::new(), ChatMode::Sbr);
        let id = conversation.id;
        manager.bind(conversation).unwrap();

        manager.send_message("Hello").await.unwrap();

        // welcome + user + assistant in the working list
        assert_eq!(manager.messages().len(), 3);
        assert!(!manager.is_loading());
        assert_eq!(manager.last_error(), None);

        let stored = reload(&dir, id).messages();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].content, "Hello");
        assert_eq!(stored[1].content, "Hi there");
    }

    #[tokio::test]
    async fn failed_send_leaves_a_transient_error_message() {
        let (dir, mut manager) = manager(FakeBackend::failing());
        let conversation = Conversation::new(Vec::new(), ChatMode::Sbr);
        let id = conversation.id;
        manager.bind(conversation).unwrap();

        manager.send_message("Hello").await.unwrap();

        let last = manager.messages().last().unwrap();
        assert!(last.content.starts_with(ERROR_PREFIX));
        assert_eq!(last.role, Role::Assistant);
        assert!(manager.last_error().is_some());

        // Only the user turn is durable.
        let stored = reload(&dir, id).messages();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "Hello");

        // A fresh bind shows durable history only.
        let mut manager2 = ChatSessionManager::new(
            FakeBackend::default(),
            ConversationStore::with_dir(dir.path().to_path_buf()),
        );
        manager2.bind(reload(&dir, id)).unwrap();
        assert_eq!(manager2.messages().len(), 1);
        assert_eq!(manager2.messages()[0].content, "Hello");
    }

    #[tokio::test]
    async fn whitespace_only_input_is_a_no_op() {
        let (_dir, mut manager) = manager(FakeBackend::default());
        manager
            .bind(Conversation::new(
                vec![Message::user("existing")],
                ChatMode::Sbr,
            ))
            .unwrap();

        manager.send_message("   \n  ").await.unwrap();
        assert_eq!(manager.messages().len(), 1);
    }

    #[tokio::test]
    async fn sent_content_is_trimmed() {
        let (dir, mut manager) = manager(FakeBackend::replying("ok"));
        let conversation = Conversation::new(Vec::new(), ChatMode::Sbr);
        let id = conversation.id;
        manager.bind(conversation).unwrap();

        manager.send_message("  Hello  ").await.unwrap();
        let stored = reload(&dir, id).messages();
        assert_eq!(stored[0].content, "Hello");
    }

    #[test]
    fn clear_empties_durable_storage_and_restores_the_welcome() {
        let (dir, mut manager) = manager(FakeBackend::default());
        let conversation = Conversation::new(
            vec![Message::user("hi"), Message::assistant("hello")],
            ChatMode::Sbr,
        );
        let id = conversation.id;
        manager.bind(conversation).unwrap();

        manager.clear().unwrap();

        assert_eq!(manager.messages().len(), 1);
        assert_eq!(manager.messages()[0].content, ChatMode::Sbr.welcome_text());
        assert!(manager.backend.context.is_empty());
        assert!(reload(&dir, id).messages().is_empty());
    }

    #[test]
    fn playback_flags_toggle_without_persisting() {
        let (dir, mut manager) = manager(FakeBackend::default());
        let conversation = Conversation::new(
            vec![Message::user("hi"), Message::assistant("hello")],
            ChatMode::Sbr,
        );
        let id = conversation.id;
        ConversationStore::with_dir(dir.path().to_path_buf())
            .save(&conversation)
            .unwrap();
        manager.bind(conversation).unwrap();

        let target = manager.messages()[1].id;
        manager.set_playing(target, true);
        assert!(manager.messages()[1].is_playing);
        assert!(!manager.messages()[0].is_playing);

        manager.stop_all_playback();
        assert!(manager.messages().iter().all(|m| !m.is_playing));

        // Flags never reach storage.
        assert!(reload(&dir, id).messages().iter().all(|m| !m.is_playing));
    }
}
