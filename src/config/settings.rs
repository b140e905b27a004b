//! Application settings and configuration types.
//!
//! Settings are persisted to `~/.config/finmail/settings.json` (or XDG
//! equivalent) and loaded at startup. Every section has serde defaults so a
//! partial file works.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::BatchConfig;

/// Top-level application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Directory for persisted JSON artifacts. Defaults to the platform data
    /// directory.
    pub data_dir: Option<PathBuf>,
    /// Gmail account configuration.
    #[serde(default)]
    pub gmail: GmailSettings,
    /// AI provider configuration.
    #[serde(default)]
    pub ai: AiSettings,
    /// Batch pipeline tuning.
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

/// Gmail account configuration.
///
/// The OAuth client secret bundle itself lives in the system keychain; the
/// settings file only names the account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailSettings {
    /// Account name used for keychain lookups.
    pub account: String,
    /// Result cap for listing calls.
    pub list_max_results: u32,
}

impl Default for GmailSettings {
    fn default() -> Self {
        Self {
            account: "default".to_string(),
            list_max_results: 5,
        }
    }
}

/// AI provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSettings {
    /// Provider name. Only "gemini" is currently implemented.
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens in a response.
    pub max_tokens: Option<usize>,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-1.5-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            temperature: 0.1,
            max_tokens: Some(4096),
        }
    }
}

/// Batch pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Emails per model call.
    pub batch_size: usize,
    /// Maximum retries per batch.
    pub max_retries: u32,
    /// Base rate-limit backoff in seconds.
    pub rate_limit_base_secs: u64,
    /// Base service-unavailable backoff in seconds.
    pub unavailable_base_secs: u64,
    /// Backoff ceiling in seconds.
    pub backoff_cap_secs: u64,
    /// Throttling delay between batches in seconds.
    pub inter_batch_delay_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let defaults = BatchConfig::default();
        Self {
            batch_size: defaults.batch_size,
            max_retries: defaults.max_retries,
            rate_limit_base_secs: defaults.rate_limit_base.as_secs(),
            unavailable_base_secs: defaults.unavailable_base.as_secs(),
            backoff_cap_secs: defaults.backoff_cap.as_secs(),
            inter_batch_delay_secs: defaults.inter_batch_delay.as_secs(),
        }
    }
}

impl PipelineSettings {
    /// Converts the persisted form to the pipeline's runtime config.
    pub fn to_batch_config(&self) -> BatchConfig {
        BatchConfig {
            batch_size: self.batch_size,
            max_retries: self.max_retries,
            rate_limit_base: Duration::from_secs(self.rate_limit_base_secs),
            unavailable_base: Duration::from_secs(self.unavailable_base_secs),
            backoff_cap: Duration::from_secs(self.backoff_cap_secs),
            inter_batch_delay: Duration::from_secs(self.inter_batch_delay_secs),
        }
    }
}

impl Settings {
    /// Platform path of the settings file.
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "finmail", "finmail")
            .map(|dirs| dirs.config_dir().join("settings.json"))
    }

    /// Resolved artifact directory: configured override or the platform data
    /// directory.
    pub fn resolved_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("com", "finmail", "finmail")
            .map(|dirs| dirs.data_dir().join("data"))
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    /// Loads settings from the default location, falling back to defaults
    /// when the file does not exist yet.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(error) => {
                tracing::debug!(%error, "settings not loaded, using defaults");
                Self::default()
            }
        }
    }

    /// Loads settings from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, std::io::Error> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(std::io::Error::other)
    }

    /// Saves settings to an explicit path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, bytes)
    }
}
