use crate::outbound::OutboundQueue;
use crate::protocol::Envelope;
use crate::state::AppState;
use crate::ui::Notifier;
use serde_json::Value;

pub const PLUGINS_SETTING: &str = "plugins";
pub const PLUGIN_SETTINGS_SETTING: &str = "plugin_settings";

#[derive(Debug, thiserror::Error)]
pub enum PluginSettingsError {
    #[error("invalid plugin settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("plugin settings cannot be shown as toml: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("plugin settings are not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn set_plugin_enabled(state: &AppState, queue: &OutboundQueue, class: &str, enabled: bool) {
    let plugins = state.update(|live| {
        live.settings
            .conf
            .plugins
            .insert(class.to_string(), enabled);
        live.settings.conf.plugins.clone()
    });
    tracing::info!(plugin = %class, enabled, "plugin toggled");
    match serde_json::to_value(plugins) {
        Ok(value) => queue.send(Envelope::setting_change(PLUGINS_SETTING, value)),
        Err(err) => tracing::warn!(plugin = %class, error = %err, "plugin map not sent"),
    }
}

pub fn plugin_settings_text(state: &AppState, class: &str) -> Result<String, PluginSettingsError> {
    let settings = state.settings();
    match settings.conf.plugin_settings.get(class) {
        Some(value @ Value::Object(_)) => Ok(toml::to_string_pretty(value)?),
        _ => Ok(String::new()),
    }
}

pub fn submit_plugin_settings(
    state: &AppState,
    queue: &OutboundQueue,
    notifier: &dyn Notifier,
    class: &str,
    text: &str,
) -> Result<(), PluginSettingsError> {
    let parsed = match parse_settings_text(text) {
        Ok(parsed) => parsed,
        Err(err) => {
            notifier.show_error(&format!("{class} settings"), &err.to_string());
            return Err(err);
        }
    };
    let all = state.update(|live| {
        live.settings
            .conf
            .plugin_settings
            .insert(class.to_string(), parsed);
        live.settings.conf.plugin_settings.clone()
    });
    queue.send(Envelope::setting_change(
        PLUGIN_SETTINGS_SETTING,
        Value::Object(all),
    ));
    Ok(())
}

fn parse_settings_text(text: &str) -> Result<Value, PluginSettingsError> {
    let table: toml::Table = toml::from_str(text)?;
    Ok(serde_json::to_value(table)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        errors: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn show_error(&self, title: &str, _message: &str) {
            self.errors.lock().unwrap().push(title.to_string());
        }
    }

    #[tokio::test]
    async fn toggling_a_plugin_sends_the_whole_map() {
        let state = AppState::default();
        let (queue, mut rx) = outbound::channel();
        set_plugin_enabled(&state, &queue, "ChatGPT", true);
        set_plugin_enabled(&state, &queue, "Volume", false);

        rx.recv().await.unwrap();
        let sent = rx.recv().await.unwrap();
        assert_eq!(sent.name, PLUGINS_SETTING);
        assert_eq!(sent.value, json!({"ChatGPT": true, "Volume": false}));
        assert_eq!(state.settings().conf.plugins.get("Volume"), Some(&false));
    }

    #[tokio::test]
    async fn valid_settings_text_is_stored_and_sent() {
        let state = AppState::default();
        let (queue, mut rx) = outbound::channel();
        let notifier = RecordingNotifier::default();
        let text = "model = \"gpt-4\"\nmax_tokens = 200\n";

        submit_plugin_settings(&state, &queue, &notifier, "ChatGPT", text).unwrap();

        let sent = rx.recv().await.unwrap();
        assert_eq!(sent.name, PLUGIN_SETTINGS_SETTING);
        assert_eq!(
            sent.value,
            json!({"ChatGPT": {"model": "gpt-4", "max_tokens": 200}})
        );
        assert!(notifier.errors.lock().unwrap().is_empty());

        let rendered = plugin_settings_text(&state, "ChatGPT").unwrap();
        assert!(rendered.contains("model = \"gpt-4\""));
        assert!(rendered.contains("max_tokens = 200"));
    }

    #[test]
    fn malformed_settings_text_shows_error_and_sends_nothing() {
        let state = AppState::default();
        let (queue, mut rx) = outbound::channel();
        let notifier = RecordingNotifier::default();

        let err = submit_plugin_settings(&state, &queue, &notifier, "ChatGPT", "model = ")
            .unwrap_err();
        assert!(matches!(err, PluginSettingsError::Parse(_)));
        assert_eq!(*notifier.errors.lock().unwrap(), vec!["ChatGPT settings"]);
        assert!(state.settings().conf.plugin_settings.is_empty());

        drop(queue);
        assert!(futures::executor::block_on(rx.recv()).is_none());
    }

    #[test]
    fn missing_plugin_renders_empty_text() {
        let state = AppState::default();
        assert_eq!(plugin_settings_text(&state, "Nope").unwrap(), "");
    }
}
