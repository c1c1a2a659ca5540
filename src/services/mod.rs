pub mod chat_client;
pub mod chat_session;
pub mod config_service;
pub mod conversation_store;
pub mod history;
pub mod key_sync;
pub mod secret_store;
