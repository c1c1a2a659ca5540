pub mod models;
pub mod services;

pub use models::{ChatMode, Conversation, Message, Role};
pub use services::chat_client::{ApiMessage, ChatApiError, ChatBackend, ChatClient};
pub use services::chat_session::ChatSessionManager;
pub use services::conversation_store::{ConversationStore, StoreError};
pub use services::history::trim;
pub use services::key_sync::{
    ActivationState, CompanionKeySync, KeyTransferPayload, KeyTransport, SyncAck, TargetKeySync,
};
pub use services::secret_store::{SecretStore, SecretStoreError};
