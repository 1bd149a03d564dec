use base64::{engine::general_purpose, Engine as _};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const TTS_MODEL_VERSION_TAG: &str = "v3";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Conf {
    pub src_lang: String,
    pub trg_lang: String,
    pub whisper_task: String,
    pub current_language: String,
    pub stt_enabled: bool,
    pub txt_translate: bool,
    pub tts_answer: bool,
    pub tts_model: Vec<String>,
    pub tts_voice: String,
    pub ocr_window_name: String,
    pub osc_chat_limit: usize,
    pub osc_type_transfer: String,
    pub osc_type_transfer_split: String,
    pub plugins: BTreeMap<String, bool>,
    pub plugin_settings: Map<String, Value>,
    pub websocket_ip: String,
    pub websocket_port: u16,
    pub run_backend: bool,
}

impl Default for Conf {
    fn default() -> Self {
        Self {
            src_lang: "auto".to_string(),
            trg_lang: "en".to_string(),
            whisper_task: "transcribe".to_string(),
            current_language: String::new(),
            stt_enabled: true,
            txt_translate: false,
            tts_answer: false,
            tts_model: Vec::new(),
            tts_voice: String::new(),
            ocr_window_name: String::new(),
            osc_chat_limit: 144,
            osc_type_transfer: "translation_result".to_string(),
            osc_type_transfer_split: " 🌐 ".to_string(),
            plugins: BTreeMap::new(),
            plugin_settings: Map::new(),
            websocket_ip: "127.0.0.1".to_string(),
            websocket_port: 5000,
            run_backend: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhisperLanguage {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateSetting {
    pub whisper_languages: Vec<WhisperLanguage>,
    pub osc_auto_processing_enabled: bool,
    #[serde(flatten)]
    pub conf: Conf,
}

impl TranslateSetting {
    pub fn whisper_language_name_by_code(&self, code: &str) -> Option<&str> {
        self.whisper_languages
            .iter()
            .find(|l| l.code == code)
            .map(|l| l.name.as_str())
    }

    pub fn whisper_language_code_by_name(&self, name: &str) -> Option<&str> {
        self.whisper_languages
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
            .map(|l| l.code.as_str())
    }

    // Nothing is mutated when the merged document fails to decode.
    pub fn merged(&self, patch: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        let mut doc = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in patch {
            doc.insert(key.clone(), value.clone());
        }
        serde_json::from_value(Value::Object(doc))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageEntry {
    pub code: String,
    pub name: String,
}

const BUILTIN_LANGUAGES: &[(&str, &str)] = &[
    ("auto", "Auto"),
    ("ar", "Arabic"),
    ("bg", "Bulgarian"),
    ("cs", "Czech"),
    ("da", "Danish"),
    ("de", "German"),
    ("el", "Greek"),
    ("en", "English"),
    ("es", "Spanish"),
    ("et", "Estonian"),
    ("fi", "Finnish"),
    ("fr", "French"),
    ("hi", "Hindi"),
    ("hu", "Hungarian"),
    ("id", "Indonesian"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("lt", "Lithuanian"),
    ("lv", "Latvian"),
    ("nl", "Dutch"),
    ("no", "Norwegian"),
    ("pl", "Polish"),
    ("pt", "Portuguese"),
    ("ro", "Romanian"),
    ("ru", "Russian"),
    ("sk", "Slovak"),
    ("sl", "Slovenian"),
    ("sv", "Swedish"),
    ("th", "Thai"),
    ("tr", "Turkish"),
    ("uk", "Ukrainian"),
    ("vi", "Vietnamese"),
    ("zh", "Chinese"),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageCatalog {
    pub languages: Vec<LanguageEntry>,
}

impl LanguageCatalog {
    pub fn name_by_code(&self, code: &str) -> Option<String> {
        if let Some(entry) = self.languages.iter().find(|l| l.code == code) {
            return Some(entry.name.clone());
        }
        BUILTIN_LANGUAGES
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, name)| name.to_string())
    }

    pub fn display_name(&self, code: &str) -> String {
        title_case(&self.name_by_code(code).unwrap_or_else(|| code.to_string()))
    }

    pub fn display_names(&self) -> Vec<String> {
        self.languages.iter().map(|l| title_case(&l.name)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsLanguage {
    pub language: String,
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TtsLanguagesListing {
    pub languages: Vec<TtsLanguage>,
}

impl TtsLanguagesListing {
    pub fn versioned_models(&self) -> Vec<String> {
        self.languages
            .iter()
            .flat_map(|l| l.models.iter())
            .filter(|m| m.contains(TTS_MODEL_VERSION_TAG))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TtsVoicesListing {
    pub voices: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TtsSpeechAudio {
    #[serde(rename = "type", default)]
    pub audio_type: String,
    #[serde(default)]
    pub wav_data: String,
}

impl TtsSpeechAudio {
    pub fn bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        general_purpose::STANDARD.decode(self.wav_data.trim())
    }

    pub fn extension(&self) -> &str {
        let ext = self.audio_type.trim();
        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return "wav";
        }
        ext
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Wrapped { data: Vec<T> },
    Bare(Vec<T>),
}

pub fn decode_listing<T: DeserializeOwned>(value: Value) -> Result<Vec<T>, serde_json::Error> {
    Ok(match serde_json::from_value::<Listing<T>>(value)? {
        Listing::Wrapped { data } => data,
        Listing::Bare(items) => items,
    })
}

pub fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn count_utf16(s: &str) -> usize {
    s.encode_utf16().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn catalog_resolves_installed_then_builtin() {
        let catalog = LanguageCatalog {
            languages: vec![LanguageEntry {
                code: "deu_Latn".to_string(),
                name: "german (standard)".to_string(),
            }],
        };
        assert_eq!(catalog.display_name("deu_Latn"), "German (standard)");
        assert_eq!(catalog.display_name("de"), "German");
        assert_eq!(catalog.display_name("xx"), "Xx");
    }

    #[test]
    fn merged_overlays_partial_document() {
        let current = TranslateSetting::default();
        let patch = json!({"trg_lang": "de", "osc_auto_processing_enabled": true});
        let next = current.merged(patch.as_object().unwrap()).unwrap();
        assert_eq!(next.conf.trg_lang, "de");
        assert!(next.osc_auto_processing_enabled);
        assert_eq!(next.conf.src_lang, current.conf.src_lang);
    }

    #[test]
    fn merged_rejects_mistyped_field() {
        let current = TranslateSetting::default();
        let patch = json!({"stt_enabled": "yes"});
        assert!(current.merged(patch.as_object().unwrap()).is_err());
    }

    #[test]
    fn whisper_language_lookups() {
        let settings = TranslateSetting {
            whisper_languages: vec![WhisperLanguage {
                name: "japanese".to_string(),
                code: "ja".to_string(),
            }],
            ..Default::default()
        };
        assert_eq!(settings.whisper_language_name_by_code("ja"), Some("japanese"));
        assert_eq!(settings.whisper_language_code_by_name("Japanese"), Some("ja"));
        assert_eq!(settings.whisper_language_name_by_code("de"), None);
    }

    #[test]
    fn listing_accepts_wrapped_and_bare() {
        let wrapped: Vec<String> = decode_listing(json!({"data": ["a", "b"]})).unwrap();
        let bare: Vec<String> = decode_listing(json!(["a", "b"])).unwrap();
        assert_eq!(wrapped, bare);
        assert!(decode_listing::<String>(json!({"voices": []})).is_err());
    }

    #[test]
    fn versioned_models_filter_by_tag() {
        let listing = TtsLanguagesListing {
            languages: vec![
                TtsLanguage {
                    language: "en".to_string(),
                    models: vec!["v3_en".to_string(), "v2_en".to_string()],
                },
                TtsLanguage {
                    language: "de".to_string(),
                    models: vec!["v3_de".to_string()],
                },
            ],
        };
        assert_eq!(listing.versioned_models(), vec!["v3_en", "v3_de"]);
    }

    #[test]
    fn title_case_and_utf16_helpers() {
        assert_eq!(title_case("brazilian portuguese"), "Brazilian Portuguese");
        assert_eq!(title_case("GERMAN"), "German");
        assert_eq!(count_utf16("abc"), 3);
        assert_eq!(count_utf16("🌐"), 2);
    }

    #[test]
    fn audio_payload_decodes_base64() {
        let audio = TtsSpeechAudio {
            audio_type: String::new(),
            wav_data: general_purpose::STANDARD.encode(b"RIFF"),
        };
        assert_eq!(audio.bytes().unwrap(), b"RIFF");
        assert_eq!(audio.extension(), "wav");
    }

    #[test]
    fn audio_extension_must_be_alphanumeric() {
        let audio = |audio_type: &str| TtsSpeechAudio {
            audio_type: audio_type.to_string(),
            wav_data: String::new(),
        };
        assert_eq!(audio("mp3").extension(), "mp3");
        assert_eq!(audio(" ogg ").extension(), "ogg");
        assert_eq!(audio("../../evil").extension(), "wav");
        assert_eq!(audio("wav/x").extension(), "wav");
        assert_eq!(audio("wav.exe").extension(), "wav");
    }
}
