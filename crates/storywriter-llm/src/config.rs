use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use storywriter_core::{StoryError, StoryResult};

/// Base URL used by OpenAI backends whose `address` is empty.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Completion model used by OpenAI backends that do not name one.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo-instruct";

/// The kind of a backend. Fixed when the backend is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// A KoboldAI or KoboldCpp server.
    Kobold,
    /// An OpenAI-compatible completions API.
    #[serde(rename = "OpenAI")]
    OpenAi,
}

impl BackendKind {
    /// Every kind, in the order offered when adding a backend.
    pub const ALL: [BackendKind; 2] = [BackendKind::Kobold, BackendKind::OpenAi];

    /// The `type` string used in persisted configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Kobold => "Kobold",
            BackendKind::OpenAi => "OpenAI",
        }
    }

    /// Parses a persisted `type` string.
    pub fn parse(s: &str) -> StoryResult<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| StoryError::Config(format!("Unknown LLM type: {s}")))
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration of a Kobold-style local server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KoboldConfig {
    /// Unique display name.
    pub name: String,
    /// Base URL, e.g. `http://localhost:5001`.
    #[serde(default)]
    pub address: String,
    /// Stored for the settings UI; Kobold requests never send it.
    #[serde(default)]
    pub system_prompt: String,
}

/// Configuration of an OpenAI-compatible completion API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Unique display name.
    pub name: String,
    /// API base URL. Empty means [`DEFAULT_OPENAI_BASE_URL`].
    #[serde(default)]
    pub address: String,
    /// The literal key, or the name of an environment variable holding it
    /// when `use_env_var` is set.
    #[serde(default)]
    pub api_key: String,
    /// Prepended to every prompt when non-empty.
    #[serde(default)]
    pub system_prompt: String,
    /// Treat `api_key` as an environment variable name.
    #[serde(default)]
    pub use_env_var: bool,
    /// Completion model. Omitted from the file when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // An env var name is not a secret; a literal key is.
        let api_key = if self.use_env_var {
            self.api_key.as_str()
        } else if self.api_key.is_empty() {
            ""
        } else {
            "<redacted>"
        };
        f.debug_struct("OpenAiConfig")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("api_key", &api_key)
            .field("system_prompt", &self.system_prompt)
            .field("use_env_var", &self.use_env_var)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiConfig {
    /// The API base without a trailing slash.
    pub fn base_url(&self) -> &str {
        let address = self.address.trim();
        if address.is_empty() {
            DEFAULT_OPENAI_BASE_URL
        } else {
            address.trim_end_matches('/')
        }
    }

    /// The completion model to request.
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL)
    }

    /// Resolves the effective API key at call time.
    ///
    /// With `use_env_var` the configured value names an environment variable;
    /// an unset variable is a configuration error. Returns `None` when no key
    /// is configured at all (some local OpenAI-compatible servers need none).
    pub fn resolve_api_key(&self) -> StoryResult<Option<String>> {
        if self.use_env_var {
            let var = self.api_key.trim();
            if var.is_empty() {
                return Err(StoryError::Config(
                    "use_env_var is set but no environment variable name is configured".into(),
                ));
            }
            return std::env::var(var).map(Some).map_err(|_| {
                StoryError::Config(format!("environment variable '{var}' is not set"))
            });
        }
        if self.api_key.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.api_key.clone()))
        }
    }
}

/// One persisted backend record, tagged by its `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BackendConfig {
    /// `"type": "Kobold"`
    Kobold(KoboldConfig),
    /// `"type": "OpenAI"`
    #[serde(rename = "OpenAI")]
    OpenAi(OpenAiConfig),
}

impl BackendConfig {
    /// A fresh record as offered by the settings UI for a new backend.
    pub fn new_default(kind: BackendKind) -> Self {
        let name = format!("New {kind} LLM");
        let system_prompt = "You are a helpful assistant.".to_string();
        match kind {
            BackendKind::Kobold => BackendConfig::Kobold(KoboldConfig {
                name,
                address: String::new(),
                system_prompt,
            }),
            BackendKind::OpenAi => BackendConfig::OpenAi(OpenAiConfig {
                name,
                address: String::new(),
                api_key: String::new(),
                system_prompt,
                use_env_var: false,
                model: None,
            }),
        }
    }

    /// Parses a single record, rejecting unknown `type` values with a
    /// config error rather than a bare serde message.
    pub fn from_value(value: serde_json::Value) -> StoryResult<Self> {
        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| StoryError::Config("LLM config has no 'type' field".into()))?;
        BackendKind::parse(kind)?;
        Ok(serde_json::from_value(value)?)
    }

    /// The kind named by the `type` tag.
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendConfig::Kobold(_) => BackendKind::Kobold,
            BackendConfig::OpenAi(_) => BackendKind::OpenAi,
        }
    }

    /// The backend's display name.
    pub fn name(&self) -> &str {
        match self {
            BackendConfig::Kobold(c) => &c.name,
            BackendConfig::OpenAi(c) => &c.name,
        }
    }

    /// The address as stored, without defaults applied.
    pub fn address(&self) -> &str {
        match self {
            BackendConfig::Kobold(c) => &c.address,
            BackendConfig::OpenAi(c) => &c.address,
        }
    }
}

/// HTTP client settings shared by every backend built from a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientSettings {
    /// Per-request timeout. `None` waits forever, so a hung server stalls
    /// the whole task queue.
    pub timeout: Option<Duration>,
}

impl ClientSettings {
    /// Settings with a per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    pub(crate) fn build_client(&self) -> StoryResult<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| StoryError::Config(format!("Failed to build HTTP client: {e}")))
    }
}
