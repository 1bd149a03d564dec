use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub trait ConnectingIndicator: Send + Sync {
    fn show(&self, target: &str);
    fn hide(&self);
}

pub trait AudioExporter: Send + Sync {
    fn offer_save(&self, suggested_name: &str, data: &[u8]) -> io::Result<Option<PathBuf>>;
}

pub trait Notifier: Send + Sync {
    fn show_error(&self, title: &str, message: &str);
}

pub struct LogIndicator;

impl ConnectingIndicator for LogIndicator {
    fn show(&self, target: &str) {
        tracing::info!(url = %target, "connecting...");
    }

    fn hide(&self) {
        tracing::info!("connected");
    }
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show_error(&self, title: &str, message: &str) {
        tracing::error!(title = %title, "{message}");
    }
}

pub struct FileAudioExporter {
    dir: PathBuf,
}

impl FileAudioExporter {
    pub fn new(dir: Option<&str>) -> Self {
        Self {
            dir: dir.map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl AudioExporter for FileAudioExporter {
    fn offer_save(&self, suggested_name: &str, data: &[u8]) -> io::Result<Option<PathBuf>> {
        if !self.dir.as_os_str().is_empty() {
            fs::create_dir_all(&self.dir)?;
        }
        let path = self.dir.join(suggested_name);
        fs::write(&path, data)?;
        tracing::info!(path = %path.display(), bytes = data.len(), "saved tts audio");
        Ok(Some(path))
    }
}
