use serde::{Deserialize, Serialize};
use serde_json::Value;

// Run the outbound hook, then drop the envelope.
pub const SKIP_MESSAGE: &str = "__skip_message__";

pub const SETTING_CHANGE: &str = "setting_change";
pub const SETTING_UPDATE_REQ: &str = "setting_update_req";
pub const UI_CONNECTED: &str = "ui_connected";
pub const TRANSLATE_SETTINGS: &str = "translate_settings";
pub const INSTALLED_LANGUAGES: &str = "installed_languages";
pub const TTS_LANGUAGES: &str = "tts_languages";
pub const TTS_VOICES: &str = "tts_voices";
pub const TTS_SAVE: &str = "tts_save";

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Frame(#[source] serde_json::Error),
    #[error("frame has an empty type")]
    EmptyType,
    #[error("payload decode failed for {message_type}: {source}")]
    Payload {
        message_type: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("payload for {message_type} must be a JSON object")]
    NotAnObject { message_type: String },
    #[error("audio payload is not valid base64: {0}")]
    Audio(#[from] base64::DecodeError),
}

impl DecodeError {
    pub fn payload(message_type: &str, source: serde_json::Error) -> Self {
        Self::Payload {
            message_type: message_type.to_string(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    Local,
    Remote,
}

impl BackendMode {
    pub fn from_run_backend(run_backend: bool) -> Self {
        if run_backend {
            Self::Local
        } else {
            Self::Remote
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
}

impl Envelope {
    pub fn new(message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            name: String::new(),
            value: Value::Null,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }

    pub fn setting_change(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(SETTING_CHANGE).with_name(name).with_value(value)
    }

    pub fn bootstrap(mode: BackendMode) -> Self {
        match mode {
            BackendMode::Remote => Self::new(SETTING_UPDATE_REQ),
            BackendMode::Local => Self::new(UI_CONNECTED).with_value(true),
        }
    }

    pub fn skip(&mut self) {
        self.value = Value::String(SKIP_MESSAGE.to_string());
    }

    pub fn is_skip(&self) -> bool {
        self.value.as_str() == Some(SKIP_MESSAGE)
    }

    pub fn from_frame(frame: &str) -> Result<Self, DecodeError> {
        let envelope: Envelope = serde_json::from_str(frame).map_err(DecodeError::Frame)?;
        if envelope.message_type.is_empty() {
            return Err(DecodeError::EmptyType);
        }
        Ok(envelope)
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
