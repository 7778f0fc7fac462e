//! Configuration management for gotta-speak.
//!
//! Loads config from YAML files in standard locations. Every section has
//! defaults, so an absent or broken file still yields a working setup
//! (minus speech synthesis, which needs an API key).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::speech::pcm::PcmFormat;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// Inline key. Prefer `api_key_env` outside of local testing.
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub endpoint: String,
    pub model: String,
    pub voice: String,
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: "GEMINI_API_KEY".into(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".into(),
            model: "gemini-2.5-flash-preview-tts".into(),
            voice: "Kore".into(),
            timeout_secs: 30,
        }
    }
}

impl GeminiConfig {
    /// Inline key if set, otherwise the environment variable named by `api_key_env`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                std::env::var(&self.api_key_env)
                    .ok()
                    .filter(|k| !k.trim().is_empty())
            })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    pub sample_rate: u32,
    pub channels: u16,
    pub poll_interval_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: 24000,
            channels: 1,
            poll_interval_ms: 50,
        }
    }
}

impl AudioConfig {
    pub fn pcm_format(&self) -> PcmFormat {
        PcmFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: String,
}

impl CacheConfig {
    pub fn dir(&self) -> PathBuf {
        non_empty_path(&self.dir).unwrap_or_else(crate::speech::store::default_store_dir)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    pub enabled: bool,
    pub dir: String,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: String::new(),
        }
    }
}

impl UsageConfig {
    pub fn dir(&self) -> PathBuf {
        non_empty_path(&self.dir).unwrap_or_else(crate::speech::usage::default_usage_dir)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub dir: String,
}

impl ProgressConfig {
    pub fn dir(&self) -> PathBuf {
        non_empty_path(&self.dir).unwrap_or_else(crate::progress::default_progress_dir)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub audio: AudioConfig,
    pub cache: CacheConfig,
    pub usage: UsageConfig,
    pub progress: ProgressConfig,
}

impl Config {
    /// Load configuration, falling back to defaults when no file is found
    /// or the file is unusable.
    ///
    /// Without an explicit `path`, the first existing file of
    /// [`search_paths`](Self::search_paths) is used.
    pub fn load(path: Option<&Path>) -> Self {
        let found = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::search_paths().into_iter().find(|p| p.exists()),
        };
        let Some(path) = found else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        Self::from_file(&path).unwrap_or_else(|e| {
            warn!("{e}, using defaults");
            Self::default()
        })
    }

    /// `./config.yaml`, then `~/.config/gotta-speak/config.yaml`, then
    /// `/etc/gotta-speak/config.yaml`.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(3);
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join("config.yaml"));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("gotta-speak").join("config.yaml"));
        }
        paths.push(PathBuf::from("/etc/gotta-speak/config.yaml"));
        paths
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        let config = Self::parse(&contents)
            .map_err(|e| format!("Failed to parse {}: {e}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(contents)
    }
}

fn non_empty_path(raw: &str) -> Option<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|h| h.join(rest)),
        None => Some(PathBuf::from(raw)),
    }
}
