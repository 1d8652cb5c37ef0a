//! Application settings read from `storywriter.toml`.
//!
//! Every field is optional; a missing file means all defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use storywriter_core::{StoryError, StoryResult};
use storywriter_llm::{ClientSettings, DEFAULT_MAX_LENGTH};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppConfig {
    /// Backend list, relative to the settings file.
    #[serde(default = "default_llm_config")]
    pub llm_config: PathBuf,
    #[serde(default = "default_max_length")]
    pub max_length: u32,
    /// Per-request HTTP timeout. Unset means requests may wait forever.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm_config: default_llm_config(),
            max_length: default_max_length(),
            request_timeout_secs: None,
        }
    }
}

fn default_llm_config() -> PathBuf {
    PathBuf::from("llm_config.json")
}
fn default_max_length() -> u32 {
    DEFAULT_MAX_LENGTH
}

impl AppConfig {
    /// Reads `path`, resolving `llm_config` against its directory.
    pub async fn load(path: &Path) -> StoryResult<Self> {
        let mut config = match tokio::fs::read_to_string(path).await {
            Ok(data) => Self::parse(&data).map_err(|e| {
                StoryError::Config(format!("Failed to parse '{}': {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No settings file, using defaults");
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };

        if config.llm_config.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            config.llm_config = base.join(&config.llm_config);
        }
        Ok(config)
    }

    pub fn parse(data: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(data)
    }

    pub fn client_settings(&self) -> ClientSettings {
        match self.request_timeout_secs {
            Some(secs) if secs > 0 => ClientSettings::with_timeout(Duration::from_secs(secs)),
            _ => ClientSettings::default(),
        }
    }
}
