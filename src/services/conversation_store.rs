use std::fs;
use std::path::PathBuf;

use log::warn;
use thiserror::Error;
use uuid::Uuid;

use crate::models::Conversation;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not determine the data directory")]
    DataDirUnavailable,
    #[error("conversation {0} not found")]
    NotFound(Uuid),
    #[error("failed to access conversation storage: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode conversation: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Platform data directory for the app, created on first use.
pub fn app_data_dir() -> Result<PathBuf, StoreError> {
    let data_dir = dirs::data_dir()
        .ok_or(StoreError::DataDirUnavailable)?
        .join("WristChat");

    if !data_dir.exists() {
        fs::create_dir_all(&data_dir)?;
    }

    Ok(data_dir)
}

/// Conversation repository: one JSON file per conversation.
pub struct ConversationStore {
    dir: PathBuf,
}

impl ConversationStore {
    pub fn new() -> Result<Self, StoreError> {
        Ok(Self {
            dir: app_data_dir()?.join("conversations"),
        })
    }

    /// Repository rooted at a custom directory (for testing).
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// All conversations, most recently updated first. Unreadable
    /// entries are skipped rather than failing the whole listing.
    pub fn list(&self) -> Vec<Conversation> {
        let mut conversations = Vec::new();

        if let Ok(entries) = fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.extension().is_some_and(|ext| ext == "json") {
                    continue;
                }
                let content = match fs::read_to_string(&path) {
                    Ok(content) => content,
                    Err(err) => {
                        warn!("skipping unreadable conversation {}: {}", path.display(), err);
                        continue;
                    }
                };
                match serde_json::from_str::<Conversation>(&content) {
                    Ok(conversation) => conversations.push(conversation),
                    Err(err) => {
                        warn!("skipping corrupt conversation {}: {}", path.display(), err);
                    }
                }
            }
        }

        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        conversations
    }

    pub fn load(&self, id: Uuid) -> Result<Conversation, StoreError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(StoreError::NotFound(id));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Inserts or overwrites a conversation.
    pub fn save(&self, conversation: &Conversation) -> Result<(), StoreError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }
        let content = serde_json::to_string_pretty(conversation)?;
        fs::write(self.path_for(conversation.id), content)?;
        Ok(())
    }

    pub fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let path = self.path_for(id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}
