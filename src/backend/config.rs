use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::archive::DEFAULT_COMPRESSION_LEVEL;
use super::download::DEFAULT_DOWNLOAD_ROOT;
use super::error::Result;
use super::site::{DEFAULT_HOST, DEFAULT_SERIES_PATH, Site};

const APP_DIR: &str = "dc-downloader";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub site_host: String,
    pub series_path: String,
    /// Folder created under the output directory for every manga.
    pub download_root: String,
    /// Defaults to the user's download directory.
    pub output_dir: Option<PathBuf>,
    pub chapter_delay_ms: u64,
    pub image_delay_ms: u64,
    pub chapter_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub compression_level: i64,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            site_host: DEFAULT_HOST.to_string(),
            series_path: DEFAULT_SERIES_PATH.to_string(),
            download_root: DEFAULT_DOWNLOAD_ROOT.to_string(),
            output_dir: None,
            chapter_delay_ms: 1000,
            image_delay_ms: 50,
            chapter_timeout_secs: 300,
            request_timeout_secs: 30,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            user_agent: format!("DC-Downloader-TUI/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn default_log_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("dc-downloader.log")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

impl Settings {
    /// Loads the settings file, writing the defaults out first if there is none.
    pub fn load() -> Result<Self> {
        let path = settings_path();
        if !path.exists() {
            let settings = Settings::default();
            if let Err(e) = settings.save_to(&path) {
                log::warn!("could not write default settings to {}: {e}", path.display());
            }
            return Ok(settings);
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn site(&self) -> Site {
        Site {
            host: self.site_host.clone(),
            series_path: self.series_path.clone(),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn chapter_delay(&self) -> Duration {
        Duration::from_millis(self.chapter_delay_ms)
    }

    pub fn image_delay(&self) -> Duration {
        Duration::from_millis(self.image_delay_ms)
    }

    pub fn chapter_timeout(&self) -> Duration {
        Duration::from_secs(self.chapter_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
