use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use log::{debug, warn};
use thiserror::Error;

use super::conversation_store::app_data_dir;

const ACCOUNT: &str = "openai_api_key";
const SECRETS_FILE: &str = "credentials.json";

#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("could not determine the data directory")]
    DataDirUnavailable,
    #[error("failed to access credential storage: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode credential storage: {0}")]
    Serialize(#[from] serde_json::Error),
}

type ChangeObserver = Box<dyn Fn() + Send + Sync>;

/// Secret storage for the API key, addressed by a fixed account name.
/// Registered observers are notified after every successful mutation.
pub struct SecretStore {
    path: PathBuf,
    observers: Vec<ChangeObserver>,
}

impl SecretStore {
    pub fn new() -> Result<Self, SecretStoreError> {
        let path = app_data_dir()
            .map_err(|_| SecretStoreError::DataDirUnavailable)?
            .join(SECRETS_FILE);
        Ok(Self {
            path,
            observers: Vec::new(),
        })
    }

    /// Store backed by a custom file (for testing).
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            observers: Vec::new(),
        }
    }

    /// Registers an observer invoked after every successful set/delete.
    pub fn subscribe(&mut self, observer: impl Fn() + Send + Sync + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn get(&self) -> Option<String> {
        self.read_all().remove(ACCOUNT)
    }

    pub fn set(&self, secret: &str) -> Result<(), SecretStoreError> {
        let mut secrets = self.read_all();
        secrets.insert(ACCOUNT.to_string(), secret.to_string());
        self.write_all(&secrets)?;
        debug!("api key updated");
        self.notify_changed();
        Ok(())
    }

    pub fn delete(&self) -> Result<(), SecretStoreError> {
        let mut secrets = self.read_all();
        if secrets.remove(ACCOUNT).is_some() {
            self.write_all(&secrets)?;
        }
        debug!("api key removed");
        self.notify_changed();
        Ok(())
    }

    /// Whether a usable (non-blank) secret is stored.
    pub fn exists(&self) -> bool {
        self.get().is_some_and(|key| !key.trim().is_empty())
    }

    fn read_all(&self) -> BTreeMap<String, String> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return BTreeMap::new(),
        };
        match serde_json::from_str(&content) {
            Ok(secrets) => secrets,
            Err(err) => {
                warn!("credential storage unreadable, treating as empty: {err}");
                BTreeMap::new()
            }
        }
    }

    fn write_all(&self, secrets: &BTreeMap<String, String>) -> Result<(), SecretStoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(secrets)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    fn notify_changed(&self) {
        for observer in &self.observers {
            observer();
        }
    }
}
