use crate::protocol::BackendMode;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::time::Duration;

const CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "TIGER_UI_";
const MIN_DELAY_MS: u64 = 10;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub session: SessionSettings,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
    pub run_backend: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            run_backend: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionSettings {
    pub retry_delay_ms: u64,
    pub close_timeout_ms: u64,
    pub local_only_settings: Vec<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            retry_delay_ms: 500,
            close_timeout_ms: 1000,
            local_only_settings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ExportConfig {
    pub audio_dir: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = Self::default();
        let config_path = active_config_path();

        if let Ok(raw) = fs::read_to_string(&config_path) {
            match toml::from_str::<Config>(&raw) {
                Ok(file_config) => config = file_config,
                Err(err) => {
                    tracing::warn!(path = %config_path.display(), error = %err, "ignoring unreadable config file");
                }
            }
        }

        config.apply_overrides(|key| env::var(format!("{}{}", ENV_PREFIX, key)).ok());

        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("BACKEND_HOST") {
            self.backend.host = val;
        }
        if let Some(val) = lookup("BACKEND_PORT") {
            if let Ok(port) = val.parse() {
                self.backend.port = port;
            }
        }
        if let Some(val) = lookup("RUN_BACKEND") {
            if let Ok(run) = val.parse() {
                self.backend.run_backend = run;
            }
        }

        if let Some(val) = lookup("RETRY_DELAY_MS") {
            if let Ok(ms) = val.parse() {
                self.session.retry_delay_ms = ms;
            }
        }
        if let Some(val) = lookup("CLOSE_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                self.session.close_timeout_ms = ms;
            }
        }

        if let Some(val) = lookup("AUDIO_DIR") {
            self.export.audio_dir = Some(val);
        }
    }

    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.backend.port == 0 {
            return Err("backend.port must be non-zero".into());
        }
        if self.backend.host.trim().is_empty() {
            return Err("backend.host must be set".into());
        }
        if self.session.retry_delay_ms < MIN_DELAY_MS {
            return Err(format!("session.retry_delay_ms must be >= {MIN_DELAY_MS}").into());
        }
        if self.session.close_timeout_ms < MIN_DELAY_MS {
            return Err(format!("session.close_timeout_ms must be >= {MIN_DELAY_MS}").into());
        }
        Ok(())
    }

    pub fn write_default<P: AsRef<Path>>(path: P) -> Result<(), Box<dyn std::error::Error>> {
        if path.as_ref().exists() {
            return Err("config.toml already exists".into());
        }
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let data = toml::to_string_pretty(&Config::default())?;
        fs::write(path, data)?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        managed_config_path()
    }

    pub fn websocket_url(&self) -> String {
        format!("ws://{}:{}/", self.backend.host, self.backend.port)
    }

    pub fn backend_mode(&self) -> BackendMode {
        BackendMode::from_run_backend(self.backend.run_backend)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.session.retry_delay_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.session.close_timeout_ms)
    }
}

fn managed_config_path() -> PathBuf {
    if let Ok(path) = env::var(format!("{}CONFIG_PATH", ENV_PREFIX)) {
        return PathBuf::from(path);
    }
    let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
    Path::new(&appdata).join("TigerUi").join(CONFIG_FILE)
}

fn active_config_path() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        local
    } else {
        managed_config_path()
    }
}
