//! Message vocabulary shared by the popup, background and page agent
//!
//! Requests travel as JSON objects `{"action": ..., "payload": ...}`. Anything
//! that does not decode into a `Message` is dropped without a response.
//! Telemetry senders put their report under `data` instead of `payload`;
//! both are accepted, and a missing report decodes as `null`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::state::OverlayMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "camelCase")]
pub enum Message {
    CheckState,
    ActivateDarkMode,
    DeactivateDarkMode,
    ActivateGalacticMode,
    DeactivateGalacticMode,
    /// Theme id; unknown ids fall back to the default theme
    ChangeGalaxy(String),
    /// Event name from the cosmic event set
    TriggerCosmicEvent(String),
    /// Usage data reported to the background (`null` when none was sent)
    CosmicTelemetry(Value),
}

impl Message {
    pub fn activate(mode: OverlayMode) -> Self {
        match mode {
            OverlayMode::Dark => Self::ActivateDarkMode,
            OverlayMode::Galactic => Self::ActivateGalacticMode,
        }
    }

    pub fn deactivate(mode: OverlayMode) -> Self {
        match mode {
            OverlayMode::Dark => Self::DeactivateDarkMode,
            OverlayMode::Galactic => Self::DeactivateGalacticMode,
        }
    }

    /// For mode toggles: the mode and whether it is being switched on
    pub fn toggle(&self) -> Option<(OverlayMode, bool)> {
        match self {
            Self::ActivateDarkMode => Some((OverlayMode::Dark, true)),
            Self::DeactivateDarkMode => Some((OverlayMode::Dark, false)),
            Self::ActivateGalacticMode => Some((OverlayMode::Galactic, true)),
            Self::DeactivateGalacticMode => Some((OverlayMode::Galactic, false)),
            _ => None,
        }
    }

    /// Decode a raw request, returning None for unknown actions or bad payloads
    pub fn decode(raw: &Value) -> Option<Self> {
        match serde_json::from_value(normalize_telemetry(raw.clone())) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::debug!(request = %raw, "Ignoring unrecognized message: {}", e);
                None
            }
        }
    }

    pub fn encode(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

fn normalize_telemetry(mut raw: Value) -> Value {
    if let Some(fields) = raw.as_object_mut() {
        let is_telemetry = fields.get("action").and_then(Value::as_str) == Some("cosmicTelemetry");
        if is_telemetry && !fields.contains_key("payload") {
            let data = fields.remove("data").unwrap_or(Value::Null);
            fields.insert("payload".to_string(), data);
        }
    }
    raw
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    State {
        #[serde(rename = "isActive")]
        is_active: bool,
    },
    Ack {
        success: bool,
    },
}

impl Response {
    pub fn ok() -> Self {
        Response::Ack { success: true }
    }

    pub fn state(is_active: bool) -> Self {
        Response::State { is_active }
    }

    pub fn is_active(&self) -> Option<bool> {
        match self {
            Response::State { is_active } => Some(*is_active),
            Response::Ack { .. } => None,
        }
    }
}
