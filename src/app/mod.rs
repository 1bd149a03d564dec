use crate::config::Config;
use crate::connection::TungsteniteDialer;
use crate::dispatch::Registry;
use crate::model::TranslateSetting;
use crate::outbound::{self, OutboundQueue, SettingsSendHook};
use crate::plugins;
use crate::protocol::{DecodeError, Envelope};
use crate::session::{Session, SessionConfig, SessionHandle};
use crate::state::AppState;
use crate::ui::{FileAudioExporter, LogIndicator, LogNotifier, Notifier};
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

pub const TRANSCRIPT: &str = "transcript";
pub const TRANSLATE_RESULT: &str = "translate_result";

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(ref command) = std::env::args().nth(1) {
        if command == "config-init" {
            return handle_config_init();
        }
    }

    let config = Config::load()?;
    let url = config.websocket_url();
    let mode = config.backend_mode();
    tracing::info!(url = %url, mode = ?mode, "starting ui session");

    let state = AppState::new(initial_settings(&config));
    let exporter = Arc::new(FileAudioExporter::new(config.export.audio_dir.as_deref()));
    tracing::info!(dir = %exporter.dir().display(), "tts audio export directory");
    let mut registry = Registry::new(state.clone(), exporter);
    register_live_text(&mut registry, &state);

    let hook = Arc::new(SettingsSendHook::new(
        state.clone(),
        config.session.local_only_settings.clone(),
    ));
    let (queue, outbound_rx) = outbound::channel();

    let session = Session::new(
        SessionConfig {
            url,
            mode,
            retry_delay: config.retry_delay(),
            close_timeout: config.close_timeout(),
            handle_interrupt: true,
        },
        TungsteniteDialer,
        Arc::new(registry),
        hook,
        Arc::new(LogIndicator),
        outbound_rx,
    );
    let handle = session.handle();
    let console = tokio::spawn(run_console(
        state.clone(),
        queue,
        Arc::new(LogNotifier),
        handle,
    ));

    let result = session.start().await;
    console.abort();
    tracing::info!(revision = state.ui().revision, "ui state at exit");
    result?;
    Ok(())
}

fn handle_config_init() -> Result<(), Box<dyn std::error::Error>> {
    let path = Config::default_path();
    Config::write_default(&path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

fn initial_settings(config: &Config) -> TranslateSetting {
    let mut settings = TranslateSetting::default();
    settings.conf.websocket_ip = config.backend.host.clone();
    settings.conf.websocket_port = config.backend.port;
    settings.conf.run_backend = config.backend.run_backend;
    settings
}

#[derive(Deserialize)]
struct TextPayload {
    #[serde(default)]
    text: String,
}

fn register_live_text(registry: &mut Registry, state: &AppState) {
    let transcripts = state.clone();
    registry.register(TRANSCRIPT, move |env| {
        let payload: TextPayload = serde_json::from_value(env.value.clone())
            .map_err(|err| DecodeError::payload(&env.message_type, err))?;
        transcripts.set_transcription_text(&payload.text);
        Ok(())
    });
    let translations = state.clone();
    registry.register(TRANSLATE_RESULT, move |env| {
        let payload: TextPayload = serde_json::from_value(env.value.clone())
            .map_err(|err| DecodeError::payload(&env.message_type, err))?;
        translations.set_translation_text(&payload.text);
        Ok(())
    });
}

#[derive(Debug, PartialEq)]
enum Command {
    Quit,
    Status,
    Send(Envelope),
    Speaker(String),
    PluginToggle { class: String, enabled: bool },
    PluginShow(String),
    PluginSettings { class: String, text: String },
}

// Console syntax:
// `quit`, `status`, `speaker <Language>`, `plugin <Class> on|off`, `plugin-show <Class>`,
// `plugin-settings <Class> key = value; other = value`, or a raw JSON envelope.
fn parse_command(line: &str) -> Result<Option<Command>, Box<dyn std::error::Error>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if line == "quit" {
        return Ok(Some(Command::Quit));
    }
    if line == "status" {
        return Ok(Some(Command::Status));
    }
    if line.starts_with('{') {
        return Ok(Some(Command::Send(Envelope::from_frame(line)?)));
    }

    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    match verb {
        "speaker" if !rest.is_empty() => Ok(Some(Command::Speaker(rest.to_string()))),
        "plugin" => {
            let (class, toggle) = rest
                .split_once(' ')
                .ok_or("usage: plugin <Class> on|off")?;
            let enabled = match toggle.trim() {
                "on" => true,
                "off" => false,
                other => return Err(format!("expected on|off, got {other:?}").into()),
            };
            Ok(Some(Command::PluginToggle {
                class: class.to_string(),
                enabled,
            }))
        }
        "plugin-show" if !rest.is_empty() => Ok(Some(Command::PluginShow(rest.to_string()))),
        "plugin-settings" => {
            let (class, text) = rest
                .split_once(' ')
                .ok_or("usage: plugin-settings <Class> key = value; ...")?;
            let text = text
                .split(';')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            Ok(Some(Command::PluginSettings {
                class: class.to_string(),
                text,
            }))
        }
        _ => Err(format!("unknown command: {verb}").into()),
    }
}

fn speaker_change(state: &AppState, name: &str) -> Option<Envelope> {
    let settings = state.settings();
    let code = settings.whisper_language_code_by_name(name)?;
    Some(Envelope::setting_change("current_language", code))
}

fn print_status(state: &AppState, session: &SessionHandle) {
    let ui = state.ui();
    println!(
        "connection: {:?} (connected: {})",
        session.state(),
        session.is_connected()
    );
    println!(
        "source: {} | target: {} | task: {} | speaker: {}",
        ui.source_language.selected,
        ui.target_language.selected,
        ui.transcription_task.selected,
        ui.speaker_language.selected
    );
    println!(
        "tts: {} / {} | limit: {} | installed languages: {}",
        ui.tts_model.selected,
        ui.tts_voice.selected,
        ui.limit_hint.text,
        state.languages().languages.len()
    );
}

async fn run_console(
    state: AppState,
    queue: OutboundQueue,
    notifier: Arc<dyn Notifier>,
    session: SessionHandle,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "console read failed");
                break;
            }
        };
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(error = %err, "console input rejected");
                continue;
            }
        };
        match command {
            Command::Quit => {
                session.close();
                break;
            }
            Command::Status => print_status(&state, &session),
            Command::Send(envelope) => queue.send(envelope),
            Command::Speaker(name) => match speaker_change(&state, &name) {
                Some(envelope) => queue.send(envelope),
                None => tracing::warn!(language = %name, "unknown speaker language"),
            },
            Command::PluginToggle { class, enabled } => {
                plugins::set_plugin_enabled(&state, &queue, &class, enabled);
            }
            Command::PluginShow(class) => match plugins::plugin_settings_text(&state, &class) {
                Ok(text) => println!("[{class}]\n{text}"),
                Err(err) => tracing::warn!(plugin = %class, error = %err, "cannot render plugin settings"),
            },
            Command::PluginSettings { class, text } => {
                if let Err(err) = plugins::submit_plugin_settings(
                    &state,
                    &queue,
                    notifier.as_ref(),
                    &class,
                    &text,
                ) {
                    tracing::debug!(plugin = %class, error = %err, "plugin settings not submitted");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Applied;
    use crate::ui::AudioExporter;
    use std::io;
    use std::path::PathBuf;

    struct NoExport;

    impl AudioExporter for NoExport {
        fn offer_save(&self, _name: &str, _data: &[u8]) -> io::Result<Option<PathBuf>> {
            Ok(None)
        }
    }

    #[test]
    fn parses_console_commands() {
        assert_eq!(parse_command("   ").unwrap(), None);
        assert_eq!(parse_command("quit").unwrap(), Some(Command::Quit));
        assert_eq!(parse_command("status").unwrap(), Some(Command::Status));
        assert_eq!(
            parse_command("speaker Japanese").unwrap(),
            Some(Command::Speaker("Japanese".to_string()))
        );
        assert_eq!(
            parse_command(r#"{"type":"setting_update_req"}"#).unwrap(),
            Some(Command::Send(Envelope::new("setting_update_req")))
        );
        assert_eq!(
            parse_command("plugin ChatGPT on").unwrap(),
            Some(Command::PluginToggle {
                class: "ChatGPT".to_string(),
                enabled: true,
            })
        );
        assert_eq!(
            parse_command("plugin-settings ChatGPT model = \"gpt-4\"; max_tokens = 10").unwrap(),
            Some(Command::PluginSettings {
                class: "ChatGPT".to_string(),
                text: "model = \"gpt-4\"\nmax_tokens = 10".to_string(),
            })
        );
        assert!(parse_command("plugin ChatGPT maybe").is_err());
        assert!(parse_command(r#"{"type":""}"#).is_err());
        assert!(parse_command("dance").is_err());
    }

    #[test]
    fn speaker_pick_sends_whisper_code() {
        let state = AppState::default();
        let patch = serde_json::json!({
            "whisper_languages": [{"name": "japanese", "code": "ja"}]
        });
        crate::handlers::apply_settings(
            &state,
            "translate_settings",
            patch.as_object().unwrap(),
        )
        .unwrap();
        assert_eq!(
            speaker_change(&state, "Japanese"),
            Some(Envelope::setting_change("current_language", "ja"))
        );
        assert_eq!(speaker_change(&state, "Klingon"), None);
    }

    #[test]
    fn initial_settings_follow_backend_config() {
        let mut config = Config::default();
        config.backend.host = "192.168.1.20".to_string();
        config.backend.port = 5001;
        config.backend.run_backend = false;
        let settings = initial_settings(&config);
        assert_eq!(settings.conf.websocket_ip, "192.168.1.20");
        assert_eq!(settings.conf.websocket_port, 5001);
        assert!(!settings.conf.run_backend);
    }

    #[test]
    fn live_text_updates_limit_hint() {
        let mut settings = TranslateSetting::default();
        settings.osc_auto_processing_enabled = true;
        settings.conf.osc_type_transfer = "both".to_string();
        settings.conf.osc_type_transfer_split = " | ".to_string();
        let state = AppState::new(settings);
        let mut registry = Registry::new(state.clone(), Arc::new(NoExport));
        register_live_text(&mut registry, &state);

        let transcript = Envelope::new(TRANSCRIPT).with_value(serde_json::json!({"text": "hi"}));
        let translated =
            Envelope::new(TRANSLATE_RESULT).with_value(serde_json::json!({"text": "hallo"}));
        assert_eq!(registry.dispatch(&transcript).unwrap(), Some(Applied::Custom));
        registry.dispatch(&translated).unwrap();
        assert_eq!(state.ui().limit_hint.text, "10/144");

        let bad = Envelope::new(TRANSCRIPT).with_value("oops");
        assert!(registry.dispatch(&bad).is_err());
        assert_eq!(state.ui().transcription_text, "hi");
    }
}
