use crate::handlers;
use crate::model::{
    decode_listing, LanguageCatalog, TranslateSetting, TtsLanguagesListing, TtsSpeechAudio,
    TtsVoicesListing,
};
use crate::protocol::{
    DecodeError, Envelope, INSTALLED_LANGUAGES, SETTING_CHANGE, TRANSLATE_SETTINGS, TTS_LANGUAGES,
    TTS_SAVE, TTS_VOICES,
};
use crate::state::AppState;
use crate::ui::AudioExporter;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

type FallbackHandler = Box<dyn Fn(&Envelope) -> Result<(), DecodeError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    SettingsSnapshot(Map<String, Value>),
    SettingChange { name: String, value: Value },
    InstalledLanguages(LanguageCatalog),
    TtsLanguages(TtsLanguagesListing),
    TtsVoices(TtsVoicesListing),
    TtsAudio(TtsSpeechAudio),
}

impl Inbound {
    pub fn decode(envelope: &Envelope) -> Result<Option<Self>, DecodeError> {
        let message_type = envelope.message_type.as_str();
        let value = envelope.value.clone();
        let payload_err = |err: serde_json::Error| DecodeError::payload(message_type, err);

        let inbound = match message_type {
            SETTING_CHANGE if !envelope.name.is_empty() => Self::SettingChange {
                name: envelope.name.clone(),
                value,
            },
            SETTING_CHANGE | TRANSLATE_SETTINGS => match value {
                Value::Object(map) => Self::SettingsSnapshot(map),
                _ => {
                    return Err(DecodeError::NotAnObject {
                        message_type: message_type.to_string(),
                    })
                }
            },
            INSTALLED_LANGUAGES => Self::InstalledLanguages(LanguageCatalog {
                languages: decode_listing(value).map_err(payload_err)?,
            }),
            TTS_LANGUAGES => Self::TtsLanguages(TtsLanguagesListing {
                languages: decode_listing(value).map_err(payload_err)?,
            }),
            TTS_VOICES => Self::TtsVoices(TtsVoicesListing {
                voices: decode_listing(value).map_err(payload_err)?,
            }),
            TTS_SAVE => Self::TtsAudio(serde_json::from_value(value).map_err(payload_err)?),
            _ => return Ok(None),
        };
        Ok(Some(inbound))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Settings(TranslateSetting),
    Languages(LanguageCatalog),
    TtsLanguages(TtsLanguagesListing),
    TtsVoices(TtsVoicesListing),
    AudioOffered(Option<PathBuf>),
    Custom,
}

pub struct Registry {
    state: AppState,
    exporter: Arc<dyn AudioExporter>,
    fallback: HashMap<String, FallbackHandler>,
}

impl Registry {
    pub fn new(state: AppState, exporter: Arc<dyn AudioExporter>) -> Self {
        Self {
            state,
            exporter,
            fallback: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, message_type: impl Into<String>, handler: F)
    where
        F: Fn(&Envelope) -> Result<(), DecodeError> + Send + Sync + 'static,
    {
        self.fallback.insert(message_type.into(), Box::new(handler));
    }

    pub fn dispatch(&self, envelope: &Envelope) -> Result<Option<Applied>, DecodeError> {
        if envelope.message_type.is_empty() {
            return Ok(None);
        }
        if let Some(inbound) = Inbound::decode(envelope)? {
            return self.apply(inbound).map(Some);
        }
        match self.fallback.get(&envelope.message_type) {
            Some(handler) => {
                handler(envelope)?;
                Ok(Some(Applied::Custom))
            }
            None => {
                tracing::debug!(message_type = %envelope.message_type, "no handler registered");
                Ok(None)
            }
        }
    }

    fn apply(&self, inbound: Inbound) -> Result<Applied, DecodeError> {
        Ok(match inbound {
            Inbound::SettingsSnapshot(patch) => Applied::Settings(handlers::apply_settings(
                &self.state,
                TRANSLATE_SETTINGS,
                &patch,
            )?),
            Inbound::SettingChange { name, value } => {
                let mut patch = Map::new();
                patch.insert(name, value);
                Applied::Settings(handlers::apply_settings(
                    &self.state,
                    SETTING_CHANGE,
                    &patch,
                )?)
            }
            Inbound::InstalledLanguages(catalog) => {
                Applied::Languages(handlers::apply_languages(&self.state, catalog))
            }
            Inbound::TtsLanguages(listing) => {
                Applied::TtsLanguages(handlers::apply_tts_languages(&self.state, listing))
            }
            Inbound::TtsVoices(listing) => {
                Applied::TtsVoices(handlers::apply_tts_voices(&self.state, listing))
            }
            Inbound::TtsAudio(audio) => Applied::AudioOffered(handlers::export_tts_audio(
                self.exporter.as_ref(),
                &audio,
            )?),
        })
    }
}
