use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::{gemini, github};

/// Looked up in the working directory when `--config` is not given.
pub const CONFIG_FILE: &str = ".pr-learnings.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{what} required: use {flag} flag or {env} env var")]
    MissingCredential {
        what: &'static str,
        flag: &'static str,
        env: &'static str,
    },
}

/// Top-level configuration loaded from `.pr-learnings.toml`.
/// Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub pacing: Pacing,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// Falls back to the GITHUB_TOKEN env var.
    pub token: Option<String>,
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeminiConfig {
    /// Falls back to the GEMINI_API_KEY env var.
    pub api_key: Option<String>,
    /// Falls back to the GEMINI_MODEL env var, then `gemini::DEFAULT_MODEL`.
    pub model: Option<String>,
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub style_guide: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            style_guide: PathBuf::from("STYLE_GUIDE.md"),
        }
    }
}

/// Delays applied between remote calls, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Pacing {
    /// Minimum spacing of GitHub requests
    pub request_interval_ms: u64,
    /// Pause after each downloaded PR
    pub download_delay_ms: u64,
    /// Pause after each PR sent for learning extraction
    pub learning_delay_ms: u64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            request_interval_ms: 1000,
            download_delay_ms: 100,
            learning_delay_ms: 500,
        }
    }
}

impl Pacing {
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    pub fn download_delay(&self) -> Duration {
        Duration::from_millis(self.download_delay_ms)
    }

    pub fn learning_delay(&self) -> Duration {
        Duration::from_millis(self.learning_delay_ms)
    }
}

impl Config {
    /// Load `path` if given, otherwise `.pr-learnings.toml` in the current
    /// directory. A missing default file yields `Config::default()`; a
    /// missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Path::new(CONFIG_FILE);
                if path.exists() {
                    Self::load_from(path)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Flag, then config file, then GITHUB_TOKEN.
    pub fn github_token(&self, flag: Option<&str>) -> Result<String, ConfigError> {
        first_set(flag, self.github.token.as_deref(), env("GITHUB_TOKEN")).ok_or(
            ConfigError::MissingCredential {
                what: "GitHub token",
                flag: "--token",
                env: "GITHUB_TOKEN",
            },
        )
    }

    /// Flag, then config file, then GEMINI_API_KEY.
    pub fn gemini_api_key(&self, flag: Option<&str>) -> Result<String, ConfigError> {
        first_set(flag, self.gemini.api_key.as_deref(), env("GEMINI_API_KEY")).ok_or(
            ConfigError::MissingCredential {
                what: "Gemini API key",
                flag: "--key",
                env: "GEMINI_API_KEY",
            },
        )
    }

    pub fn gemini_model(&self, flag: Option<&str>) -> String {
        first_set(flag, self.gemini.model.as_deref(), env("GEMINI_MODEL"))
            .unwrap_or_else(|| gemini::DEFAULT_MODEL.to_string())
    }

    pub fn github_api_url(&self) -> &str {
        self.github.api_url.as_deref().unwrap_or(github::DEFAULT_API_URL)
    }

    pub fn gemini_api_url(&self) -> &str {
        self.gemini.api_url.as_deref().unwrap_or(gemini::DEFAULT_API_URL)
    }

    pub fn data_dir(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .unwrap_or_else(|| self.storage.data_dir.clone())
    }

    pub fn style_guide(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .unwrap_or_else(|| self.storage.style_guide.clone())
    }
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// First non-empty value in precedence order.
fn first_set(flag: Option<&str>, file: Option<&str>, env: Option<String>) -> Option<String> {
    flag.filter(|v| !v.is_empty())
        .or(file.filter(|v| !v.is_empty()))
        .map(str::to_string)
        .or(env.filter(|v| !v.is_empty()))
}
