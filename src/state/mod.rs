use crate::model::{count_utf16, Conf, LanguageCatalog, TranslateSetting};
use std::sync::{Arc, Mutex, PoisonError};

pub const TASK_TRANSLATE: &str = "translate (to English)";
pub const TASK_TRANSCRIBE: &str = "transcribe";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Combo {
    pub options: Vec<String>,
    pub selected: String,
}

impl Combo {
    fn select(&mut self, value: &str) -> bool {
        if self.selected == value {
            return false;
        }
        self.selected = value.to_string();
        true
    }

    fn set_options(&mut self, options: Vec<String>) -> bool {
        if self.options == options {
            return false;
        }
        self.options = options;
        true
    }

    fn offers(&self, value: &str) -> bool {
        !value.is_empty() && self.options.iter().any(|o| o == value)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Label {
    pub text: String,
    pub visible: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiState {
    pub source_language: Combo,
    pub target_language: Combo,
    pub text_translate_target_language: Combo,
    pub transcription_task: Combo,
    pub speaker_language: Combo,
    pub tts_model: Combo,
    pub tts_voice: Combo,
    pub ocr_window: Combo,
    pub stt_enabled: bool,
    pub txt_translate_enabled: bool,
    pub tts_enabled: bool,
    pub osc_enabled: bool,
    pub limit_hint: Label,
    pub transcription_text: String,
    pub translation_text: String,
    pub revision: u64,
}

impl UiState {
    fn touch(&mut self, changed: bool) -> bool {
        if changed {
            self.revision += 1;
        }
        changed
    }

    pub(crate) fn select(&mut self, pick: fn(&mut UiState) -> &mut Combo, value: &str) -> bool {
        let changed = pick(self).select(value);
        self.touch(changed)
    }

    pub(crate) fn set_options(
        &mut self,
        pick: fn(&mut UiState) -> &mut Combo,
        options: Vec<String>,
    ) -> bool {
        let changed = pick(self).set_options(options);
        self.touch(changed)
    }

    pub(crate) fn add_option(&mut self, pick: fn(&mut UiState) -> &mut Combo, value: &str) -> bool {
        let combo = pick(self);
        if combo.options.iter().any(|o| o == value) {
            return false;
        }
        combo.options.push(value.to_string());
        self.touch(true)
    }

    pub(crate) fn offers(&self, pick: fn(&UiState) -> &Combo, value: &str) -> bool {
        pick(self).offers(value)
    }

    pub(crate) fn set_flag(&mut self, pick: fn(&mut UiState) -> &mut bool, value: bool) -> bool {
        let flag = pick(self);
        let changed = *flag != value;
        *flag = value;
        self.touch(changed)
    }

    pub(crate) fn refresh_limit_hint(&mut self, conf: &Conf, visible: bool) -> bool {
        let transcription = count_utf16(&self.transcription_text);
        let translation = count_utf16(&self.translation_text);
        let split = count_utf16(&conf.osc_type_transfer_split);
        let used = match conf.osc_type_transfer.as_str() {
            "source" => transcription,
            "translation_result" => translation,
            "both" => transcription + split + translation,
            _ => 0,
        };
        let text = format!("{}/{}", used, conf.osc_chat_limit);
        let changed = self.limit_hint.text != text || self.limit_hint.visible != visible;
        self.limit_hint.text = text;
        self.limit_hint.visible = visible;
        self.touch(changed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LiveState {
    pub settings: TranslateSetting,
    pub languages: LanguageCatalog,
    pub ui: UiState,
}

impl LiveState {
    pub(crate) fn refresh_limit_hint(&mut self) -> bool {
        let visible = self.settings.osc_auto_processing_enabled;
        self.ui.refresh_limit_hint(&self.settings.conf, visible)
    }
}

// `update` is the only way to mutate.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    inner: Arc<Mutex<LiveState>>,
}

impl AppState {
    pub fn new(settings: TranslateSetting) -> Self {
        let mut live = LiveState {
            settings,
            ..Default::default()
        };
        live.refresh_limit_hint();
        live.ui.revision = 0;
        Self {
            inner: Arc::new(Mutex::new(live)),
        }
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut LiveState) -> R) -> R {
        let mut live = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut live)
    }

    pub fn settings(&self) -> TranslateSetting {
        self.update(|live| live.settings.clone())
    }

    pub fn ui(&self) -> UiState {
        self.update(|live| live.ui.clone())
    }

    pub fn languages(&self) -> LanguageCatalog {
        self.update(|live| live.languages.clone())
    }

    pub fn set_transcription_text(&self, text: &str) -> bool {
        self.update(|live| {
            live.ui.transcription_text = text.to_string();
            live.refresh_limit_hint()
        })
    }

    pub fn set_translation_text(&self, text: &str) -> bool {
        self.update(|live| {
            live.ui.translation_text = text.to_string();
            live.refresh_limit_hint()
        })
    }
}
