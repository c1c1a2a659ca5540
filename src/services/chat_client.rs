use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config_service::{Config, DEFAULT_TTS_FORMAT, DEFAULT_TTS_MODEL, DEFAULT_TTS_VOICE};
use super::history;
use crate::models::Role;

/// Number of prior turns replayed to the API with each request.
const MAX_CONTEXT_MESSAGES: usize = 16;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 1024;
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors from the chat completions and text-to-speech endpoints.
#[derive(Debug, Error)]
pub enum ChatApiError {
    #[error("Invalid API key. Send a new key from the companion app.")]
    InvalidApiKey,
    #[error("Network error: {0}")]
    Network(reqwest::Error),
    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or("request failed"))]
    Http { status: u16, message: Option<String> },
    #[error("API error: {0}")]
    Api(String),
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Empty response from API.")]
    EmptyResponse,
}

/// Message in the wire format of the chat completions endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiMessage {
    pub role: String,
    pub content: String,
}

impl ApiMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role: role.as_str().to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ApiMessage,
}

#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// Error body returned by the API on failed requests.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Seam between the session manager and the remote chat API, so
/// session logic is testable without a network.
#[async_trait]
pub trait ChatBackend {
    /// Drops the accumulated conversation context.
    fn clear_context(&mut self);

    /// Replays a prior turn into the conversation context.
    fn restore(&mut self, role: Role, content: &str);

    /// Sets the system prompt sent with every request.
    fn set_system_prompt(&mut self, prompt: &str);

    /// Sends one user turn and returns the assistant's reply.
    async fn send(&mut self, content: &str) -> Result<String, ChatApiError>;
}

/// Client for OpenAI-compatible chat completion and TTS endpoints.
/// Holds the running conversation context between requests.
pub struct ChatClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    system_prompt: String,
    tts_voice: String,
    tts_format: String,
    context: Vec<ApiMessage>,
}

impl ChatClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            system_prompt: String::new(),
            tts_voice: DEFAULT_TTS_VOICE.to_string(),
            tts_format: DEFAULT_TTS_FORMAT.to_string(),
            context: Vec::new(),
        }
    }

    /// Create a client from the app configuration and a stored API key.
    pub fn from_config(config: &Config, api_key: &str) -> Self {
        let mut client = Self::new(config.base_url(), api_key, config.model());
        client.tts_voice = config.tts_voice().to_string();
        client.tts_format = config.tts_format().to_string();
        client
    }

    pub fn context(&self) -> &[ApiMessage] {
        &self.context
    }

    /// System prompt plus the bounded recent context, oldest first.
    fn request_messages(&self) -> Vec<ApiMessage> {
        let mut messages = vec![ApiMessage::new(Role::System, self.system_prompt.clone())];
        messages.extend(history::trim(self.context.clone(), MAX_CONTEXT_MESSAGES));
        messages
    }

    async fn chat_completion(&self, messages: &[ApiMessage]) -> Result<String, ChatApiError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: Some(DEFAULT_MAX_TOKENS),
        };

        // Allow base URLs that already name the full endpoint.
        let url = if self.base_url.contains("/chat/completions") {
            self.base_url.clone()
        } else {
            format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(ChatApiError::Network)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ChatApiError::InvalidApiKey);
        }

        let body = response.text().await.map_err(ChatApiError::Network)?;
        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
                return Err(ChatApiError::Api(error.error.message));
            }
            return Err(ChatApiError::Http {
                status: status.as_u16(),
                message: None,
            });
        }

        let completion: ChatCompletionResponse = serde_json::from_str(&body)?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(ChatApiError::EmptyResponse)
    }

    /// Converts text to speech, returning raw audio bytes.
    pub async fn text_to_speech(&self, text: &str) -> Result<Vec<u8>, ChatApiError> {
        let request = TtsRequest {
            model: DEFAULT_TTS_MODEL,
            input: text,
            voice: &self.tts_voice,
            response_format: &self.tts_format,
        };

        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(ChatApiError::Network)?;

        let status = response.status();
        // The endpoint returns audio bytes on success, JSON on error.
        if !status.is_success() {
            let message = response
                .text()
                .await
                .ok()
                .and_then(|body| serde_json::from_str::<ApiErrorResponse>(&body).ok())
                .map(|error| error.error.message);
            return Err(ChatApiError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await.map_err(ChatApiError::Network)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    fn clear_context(&mut self) {
        self.context.clear();
    }

    fn restore(&mut self, role: Role, content: &str) {
        self.context.push(ApiMessage::new(role, content));
    }

    fn set_system_prompt(&mut self, prompt: &str) {
        self.system_prompt = prompt.to_string();
    }

    async fn send(&mut self, content: &str) -> Result<String, ChatApiError> {
        self.context.push(ApiMessage::new(Role::User, content));
        let messages = self.request_messages();

        debug!("sending chat request with {} messages", messages.len());
        match self.chat_completion(&messages).await {
            Ok(reply) => {
                self.context
                    .push(ApiMessage::new(Role::Assistant, reply.clone()));
                Ok(reply)
            }
            Err(ChatApiError::EmptyResponse) => {
                // No valid reply; drop the user turn we just appended.
                self.context.pop();
                Err(ChatApiError::EmptyResponse)
            }
            Err(err) => Err(err),
        }
    }
}
