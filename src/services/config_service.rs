use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::conversation_store::app_data_dir;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-5.2";
pub const DEFAULT_TTS_MODEL: &str = "tts-1";
pub const DEFAULT_TTS_VOICE: &str = "alloy";
pub const DEFAULT_TTS_FORMAT: &str = "aac";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine the data directory")]
    DataDirUnavailable,
    #[error("failed to access config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tts_voice: Option<String>,
    #[serde(default)]
    pub tts_format: Option<String>,
}

impl Config {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_CHAT_MODEL)
    }

    pub fn tts_voice(&self) -> &str {
        self.tts_voice.as_deref().unwrap_or(DEFAULT_TTS_VOICE)
    }

    pub fn tts_format(&self) -> &str {
        self.tts_format.as_deref().unwrap_or(DEFAULT_TTS_FORMAT)
    }
}

/// A selectable chat model, as offered in settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelOption {
    pub id: &'static str,
    pub display_name: &'static str,
    pub cost_indicator: &'static str,
    pub description: &'static str,
}

pub const MODEL_OPTIONS: &[ModelOption] = &[
    ModelOption {
        id: "gpt-5.2",
        display_name: "GPT-5.2",
        cost_indicator: "$$$",
        description: "Best reasoning",
    },
    ModelOption {
        id: "gpt-5-mini",
        display_name: "GPT-5 mini",
        cost_indicator: "$",
        description: "Cost-effective",
    },
];

fn get_config_path() -> Result<std::path::PathBuf, ConfigError> {
    let dir = app_data_dir().map_err(|_| ConfigError::DataDirUnavailable)?;
    Ok(dir.join("config.json"))
}

pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&get_config_path()?)
}

pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    save_config_to(&get_config_path()?, config)
}

pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn save_config_to(path: &Path, config: &Config) -> Result<(), ConfigError> {
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

pub fn set_model(model: &str) -> Result<(), ConfigError> {
    let mut config = load_config().unwrap_or_default();
    config.model = Some(model.to_string());
    save_config(&config)
}

pub fn set_base_url(url: &str) -> Result<(), ConfigError> {
    let mut config = load_config().unwrap_or_default();
    config.base_url = Some(url.to_string());
    save_config(&config)
}
