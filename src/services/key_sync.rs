use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::secret_store::SecretStore;

pub const PAYLOAD_KEY_FIELD: &str = "api_key";

/// Transport session lifecycle, tracked independently on each side.
/// Transitions are driven by transport callbacks, not polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationState {
    #[default]
    NotActivated,
    Activating,
    Activated,
    Inactive,
}

/// The key payload sent over every channel. Not persisted beyond the
/// transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyTransferPayload {
    pub api_key: String,
    pub sent_at: i64,
}

impl KeyTransferPayload {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            sent_at: Utc::now().timestamp(),
        }
    }

    /// Wire form. Sent as a loose JSON object so the receiving side
    /// can report a missing key field instead of failing to decode.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Reason codes carried in a negative acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckErrorReason {
    MissingApiKey,
    EmptyApiKey,
    SaveFailed,
}

/// Structured acknowledgement returned to a sender that expects a
/// reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncAck {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AckErrorReason>,
}

impl SyncAck {
    pub fn success() -> Self {
        Self { ok: true, error: None }
    }

    pub fn failure(reason: AckErrorReason) -> Self {
        Self {
            ok: false,
            error: Some(reason),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{0}")]
    Delivery(String),
}

/// Companion-side transport seam. Three delivery channels with
/// different durability/latency trade-offs:
/// - context: overwrite-latest, delivered when the target next runs;
/// - queued transfer: FIFO, every payload delivered exactly once;
/// - direct send: immediate, reachable-only, acknowledged.
#[async_trait]
pub trait KeyTransport {
    fn activation_state(&self) -> ActivationState;
    fn activate(&mut self);
    fn is_paired(&self) -> bool;
    fn is_app_installed(&self) -> bool;
    fn is_reachable(&self) -> bool;

    /// Overwrite-latest channel. Replaces any queued, undelivered
    /// context payload.
    fn update_context(&mut self, payload: &Value) -> Result<(), TransportError>;

    /// Durable FIFO channel. Queued payloads survive target restarts.
    fn queue_transfer(&mut self, payload: &Value);

    /// Immediate send with acknowledgement. Only attempted when the
    /// target is reachable.
    async fn send_direct(&mut self, payload: &Value) -> Result<SyncAck, TransportError>;
}

/// Companion-side manager: moves the key from the input buffer onto
/// the transport, reporting a user-facing status for every outcome.
pub struct CompanionKeySync<T: KeyTransport> {
    transport: T,
    pub api_key_input: String,
    status_message: String,
    activation_state: ActivationState,
}

impl<T: KeyTransport> CompanionKeySync<T> {
    pub fn new(mut transport: T) -> Self {
        transport.activate();
        Self {
            transport,
            api_key_input: String::new(),
            status_message: "Paste your API key, then send it to your watch.".to_string(),
            activation_state: ActivationState::Activating,
        }
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn activation_state(&self) -> ActivationState {
        self.activation_state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends the current input to the target. Precondition failures
    /// abort before any channel is touched; channel steps are
    /// independent of each other's success.
    pub async fn send_to_target(&mut self) {
        let key = self.api_key_input.trim().to_string();
        if key.is_empty() {
            self.status_message = "Enter a valid API key first.".to_string();
            return;
        }

        if self.transport.activation_state() != ActivationState::Activated {
            self.status_message =
                "Still connecting to your watch. Try again in a moment.".to_string();
            return;
        }
        if !self.transport.is_paired() {
            self.status_message = "No paired watch found.".to_string();
            return;
        }
        if !self.transport.is_app_installed() {
            self.status_message = "Install the watch app first.".to_string();
            return;
        }

        let payload = KeyTransferPayload::new(&key).to_value();

        if let Err(err) = self.transport.update_context(&payload) {
            self.status_message = format!("Failed to queue context update: {err}");
        }

        self.transport.queue_transfer(&payload);

        if !self.transport.is_reachable() {
            self.status_message = "Key queued. It will sync when the watch is reachable.".to_string();
            return;
        }

        self.status_message = "Sending key to watch...".to_string();
        match self.transport.send_direct(&payload).await {
            Ok(_) => {
                self.status_message = "API key synced to watch.".to_string();
            }
            Err(err) => {
                // The context and queued channels still carry the key.
                warn!("direct key send failed: {err}");
                self.status_message = format!("Queued, but immediate send failed: {err}");
            }
        }
    }

    pub fn activation_did_complete(&mut self, state: ActivationState, error: Option<&str>) {
        self.activation_state = state;
        if let Some(err) = error {
            self.status_message = format!("Activation error: {err}");
            return;
        }

        self.status_message = match state {
            ActivationState::Activated => "Connected. Paste your API key and send.",
            ActivationState::Inactive => "Connection inactive.",
            ActivationState::NotActivated | ActivationState::Activating => {
                "Connecting to your watch..."
            }
        }
        .to_string();
    }

    pub fn session_did_become_inactive(&mut self) {
        self.activation_state = ActivationState::Inactive;
        self.status_message = "Session became inactive.".to_string();
    }

    pub fn session_did_deactivate(&mut self) {
        self.status_message = "Session deactivated. Reconnecting...".to_string();
        self.activation_state = ActivationState::Activating;
        self.transport.activate();
    }
}

/// Target-side manager: validates payloads from any channel and writes
/// the key through to the secret store.
pub struct TargetKeySync {
    store: SecretStore,
    status_message: String,
    last_received_at: Option<DateTime<Utc>>,
    activation_state: ActivationState,
}

impl TargetKeySync {
    pub fn new(store: SecretStore) -> Self {
        Self {
            store,
            status_message: "Open the companion app to send your API key.".to_string(),
            last_received_at: None,
            activation_state: ActivationState::default(),
        }
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn last_received_at(&self) -> Option<DateTime<Utc>> {
        self.last_received_at
    }

    pub fn activation_state(&self) -> ActivationState {
        self.activation_state
    }

    /// Receipt over the overwrite-latest context channel.
    pub fn did_receive_context(&mut self, payload: &Value) {
        self.save_payload(payload, false);
    }

    /// Receipt over the durable FIFO channel.
    pub fn did_receive_transfer(&mut self, payload: &Value) {
        self.save_payload(payload, false);
    }

    /// Receipt over the direct channel. Returns an acknowledgement
    /// only when the sender expects a reply.
    pub fn did_receive_message(&mut self, payload: &Value, reply_expected: bool) -> Option<SyncAck> {
        self.save_payload(payload, reply_expected)
    }

    pub fn activation_did_complete(&mut self, state: ActivationState, error: Option<&str>) {
        self.activation_state = state;
        if let Some(err) = error {
            self.status_message = format!("Companion connection error: {err}");
            return;
        }

        self.status_message = match state {
            ActivationState::Activated => "Companion connection ready.",
            ActivationState::Inactive => "Companion connection inactive.",
            ActivationState::NotActivated | ActivationState::Activating => {
                "Connecting to the companion app..."
            }
        }
        .to_string();
    }

    fn save_payload(&mut self, payload: &Value, reply_expected: bool) -> Option<SyncAck> {
        let reply = |ack: SyncAck| if reply_expected { Some(ack) } else { None };

        let raw_key = match payload.get(PAYLOAD_KEY_FIELD).and_then(Value::as_str) {
            Some(raw) => raw,
            None => {
                self.status_message = "Received payload missing API key.".to_string();
                return reply(SyncAck::failure(AckErrorReason::MissingApiKey));
            }
        };

        let key = raw_key.trim();
        if key.is_empty() {
            self.status_message = "Received an empty API key.".to_string();
            return reply(SyncAck::failure(AckErrorReason::EmptyApiKey));
        }

        match self.store.set(key) {
            Ok(()) => {
                debug!("api key received and stored");
                self.last_received_at = Some(Utc::now());
                self.status_message = "API key synced from your phone.".to_string();
                reply(SyncAck::success())
            }
            Err(err) => {
                warn!("failed to store received api key: {err}");
                self.status_message = format!("Failed to save key: {err}");
                reply(SyncAck::failure(AckErrorReason::SaveFailed))
            }
        }
    }
}
