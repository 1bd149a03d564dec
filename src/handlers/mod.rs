use crate::model::{
    title_case, LanguageCatalog, TranslateSetting, TtsLanguagesListing, TtsSpeechAudio,
    TtsVoicesListing,
};
use crate::protocol::DecodeError;
use crate::state::{AppState, LiveState, TASK_TRANSCRIBE, TASK_TRANSLATE};
use crate::ui::AudioExporter;
use chrono::NaiveDateTime;
use serde_json::{Map, Value};
use std::path::PathBuf;

pub fn apply_settings(
    state: &AppState,
    message_type: &str,
    patch: &Map<String, Value>,
) -> Result<TranslateSetting, DecodeError> {
    state.update(|live| -> Result<TranslateSetting, DecodeError> {
        let next = live
            .settings
            .merged(patch)
            .map_err(|err| DecodeError::payload(message_type, err))?;
        project_settings(live, &next);
        live.settings = next.clone();
        live.refresh_limit_hint();
        Ok(next)
    })
}

fn project_settings(live: &mut LiveState, next: &TranslateSetting) {
    let ui = &mut live.ui;
    let languages = &live.languages;
    let conf = &next.conf;

    if ui.speaker_language.options.len() < next.whisper_languages.len() {
        let names = next
            .whisper_languages
            .iter()
            .map(|l| title_case(&l.name))
            .collect();
        ui.set_options(|u| &mut u.speaker_language, names);
    }

    if conf.whisper_task.contains("translate") {
        ui.select(|u| &mut u.transcription_task, TASK_TRANSLATE);
    }
    if conf.whisper_task.contains("transcribe")
        && !ui.transcription_task.selected.contains("transcribe")
    {
        ui.select(|u| &mut u.transcription_task, TASK_TRANSCRIBE);
    }

    let speaker = next
        .whisper_language_name_by_code(&conf.current_language)
        .map(title_case)
        .unwrap_or_default();
    ui.select(|u| &mut u.speaker_language, &speaker);

    // Echoes of the user's own pick differ only in case and must not reselect.
    let source = languages.display_name(&conf.src_lang);
    if !ui.source_language.selected.eq_ignore_ascii_case(&source) {
        ui.select(|u| &mut u.source_language, &source);
    }

    let target = languages.display_name(&conf.trg_lang);
    if !ui.target_language.selected.eq_ignore_ascii_case(&target) {
        ui.select(|u| &mut u.target_language, &target);
        if ui.text_translate_target_language.selected.is_empty() {
            ui.select(|u| &mut u.text_translate_target_language, &target);
        }
    }

    ui.set_flag(|u| &mut u.stt_enabled, conf.stt_enabled);
    ui.set_flag(|u| &mut u.txt_translate_enabled, conf.txt_translate);
    ui.set_flag(|u| &mut u.tts_enabled, conf.tts_answer);
    ui.set_flag(|u| &mut u.osc_enabled, next.osc_auto_processing_enabled);

    if let Some(model) = conf.tts_model.get(1) {
        if !ui.tts_model.options.is_empty() {
            ui.select(|u| &mut u.tts_model, model);
        }
    }

    if ui.offers(|u| &u.tts_voice, &conf.tts_voice) {
        ui.select(|u| &mut u.tts_voice, &conf.tts_voice);
    }

    if !conf.ocr_window_name.is_empty() && ui.ocr_window.selected != conf.ocr_window_name {
        ui.add_option(|u| &mut u.ocr_window, &conf.ocr_window_name);
        ui.select(|u| &mut u.ocr_window, &conf.ocr_window_name);
    }
}

pub fn apply_languages(state: &AppState, catalog: LanguageCatalog) -> LanguageCatalog {
    state.update(|live| {
        let names = catalog.display_names();
        let mut source_names = vec![title_case("auto")];
        source_names.extend(names.iter().filter(|n| n.as_str() != "Auto").cloned());
        live.ui.set_options(|u| &mut u.source_language, source_names);
        live.ui.set_options(|u| &mut u.target_language, names.clone());
        live.ui
            .set_options(|u| &mut u.text_translate_target_language, names);
        live.languages = catalog.clone();
        let current = live.settings.clone();
        project_settings(live, &current);
    });
    catalog
}

pub fn apply_tts_languages(state: &AppState, listing: TtsLanguagesListing) -> TtsLanguagesListing {
    let models = listing.versioned_models();
    state.update(|live| live.ui.set_options(|u| &mut u.tts_model, models));
    listing
}

pub fn apply_tts_voices(state: &AppState, listing: TtsVoicesListing) -> TtsVoicesListing {
    state.update(|live| {
        live.ui
            .set_options(|u| &mut u.tts_voice, listing.voices.clone());
        let configured = &live.settings.conf.tts_voice;
        if !listing.voices.iter().any(|v| v == configured) {
            if let Some(first) = listing.voices.first() {
                live.ui.select(|u| &mut u.tts_voice, first);
            }
        }
    });
    listing
}

pub fn audio_file_name(audio: &TtsSpeechAudio, now: NaiveDateTime) -> String {
    format!(
        "tts_{}.{}",
        now.format("%Y-%m-%d_%H-%M-%S"),
        audio.extension()
    )
}

pub fn export_tts_audio(
    exporter: &dyn AudioExporter,
    audio: &TtsSpeechAudio,
) -> Result<Option<PathBuf>, DecodeError> {
    let data = audio.bytes()?;
    let name = audio_file_name(audio, chrono::Local::now().naive_local());
    match exporter.offer_save(&name, &data) {
        Ok(path) => Ok(path),
        Err(err) => {
            tracing::warn!(error = %err, file = %name, "saving tts audio failed");
            Ok(None)
        }
    }
}
