use crate::backends::LlmBackend;
use crate::config::{BackendConfig, ClientSettings};
use crate::factory::create_backend;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use storywriter_core::{StoryError, StoryResult};
use tracing::{info, warn};

/// On-disk shape of `llm_config.json`.
#[derive(Deserialize)]
struct LlmConfigFile {
    #[serde(default)]
    llms: Vec<serde_json::Value>,
    #[serde(default)]
    token_count_llm_name: Option<String>,
}

#[derive(Serialize)]
struct LlmConfigFileRef<'a> {
    llms: Vec<BackendConfig>,
    token_count_llm_name: Option<&'a str>,
}

/// Ordered collection of configured backends.
///
/// The registry owns the backend handles; tasks clone an `Arc` at enqueue
/// time, so editing the registry never touches a request already in flight.
/// Insertion order is display order.
pub struct BackendRegistry {
    backends: Vec<Arc<dyn LlmBackend>>,
    token_count_llm_name: Option<String>,
    settings: ClientSettings,
}

impl BackendRegistry {
    /// An empty registry whose backends are built with `settings`.
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            backends: Vec::new(),
            token_count_llm_name: None,
            settings,
        }
    }

    /// Loads a registry from `path`. A missing file yields an empty registry.
    ///
    /// Entries that fail to parse (for example an unknown `type`) are skipped
    /// with a warning so that one bad record does not hide the others.
    /// Connectivity is not checked here; see [`verify_all`](Self::verify_all).
    pub async fn load(path: &Path, settings: ClientSettings) -> StoryResult<Self> {
        let mut registry = Self::new(settings);
        if !path.exists() {
            info!(path = %path.display(), "No LLM config found, starting empty");
            return Ok(registry);
        }

        let data = tokio::fs::read_to_string(path).await?;
        let file: LlmConfigFile = serde_json::from_str(&data).map_err(|e| {
            StoryError::Config(format!("Failed to parse {}: {e}", path.display()))
        })?;

        for (index, value) in file.llms.into_iter().enumerate() {
            let config = match BackendConfig::from_value(value) {
                Ok(c) => c,
                Err(e) => {
                    warn!(index, error = %e, "Skipping unreadable LLM config entry");
                    continue;
                }
            };
            if let Err(e) = registry.add(config) {
                warn!(index, error = %e, "Skipping LLM config entry");
            }
        }
        registry.token_count_llm_name = file.token_count_llm_name;

        info!(
            path = %path.display(),
            backends = registry.len(),
            token_counter = ?registry.token_count_llm_name,
            "Loaded LLM config"
        );
        Ok(registry)
    }

    /// Writes every backend config plus the token-counter name to `path`,
    /// overwriting it.
    pub async fn save(&self, path: &Path) -> StoryResult<()> {
        let file = LlmConfigFileRef {
            llms: self.configs(),
            token_count_llm_name: self.token_count_llm_name.as_deref(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Builds a backend from `config` and appends it.
    pub fn add(&mut self, config: BackendConfig) -> StoryResult<Arc<dyn LlmBackend>> {
        if self.get(config.name()).is_some() {
            warn!(name = config.name(), "Backend name already in use; lookups will find the first");
        }
        let backend = create_backend(config, &self.settings)?;
        self.backends.push(Arc::clone(&backend));
        Ok(backend)
    }

    /// Removes the first backend called `name`. Returns whether one was found.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(index) => {
                self.backends.remove(index);
                true
            }
            None => false,
        }
    }

    /// Rebuilds the backend called `name` from `config`, keeping its position.
    ///
    /// The kind of a backend is fixed; changing it is rejected.
    pub fn replace(&mut self, name: &str, config: BackendConfig) -> StoryResult<()> {
        let index = self
            .position(name)
            .ok_or_else(|| StoryError::Config(format!("No LLM named '{name}'")))?;
        let current = self.backends[index].kind();
        if current != config.kind() {
            return Err(StoryError::Config(format!(
                "Cannot change the type of '{name}' from {current} to {}",
                config.kind()
            )));
        }
        self.backends[index] = create_backend(config, &self.settings)?;
        Ok(())
    }

    /// The first backend called `name`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn LlmBackend>> {
        self.backends.iter().find(|b| b.name() == name).cloned()
    }

    /// All backends, in file order.
    pub fn backends(&self) -> &[Arc<dyn LlmBackend>] {
        &self.backends
    }

    /// Backend names, in file order.
    pub fn names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    /// The records to persist, in file order.
    pub fn configs(&self) -> Vec<BackendConfig> {
        self.backends.iter().map(|b| b.to_config()).collect()
    }

    /// Number of backends.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Whether no backend is configured.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// The configured token-counter name, resolved or not.
    pub fn token_count_llm_name(&self) -> Option<&str> {
        self.token_count_llm_name.as_deref()
    }

    /// Designates the backend used for token counting. The name is not
    /// required to exist; a dangling name simply resolves to nothing.
    pub fn set_token_count_llm_name(&mut self, name: Option<String>) {
        self.token_count_llm_name = name;
    }

    /// The token-counting backend, or `None` if unset or unresolved.
    /// Callers decide the fallback; the registry never guesses one.
    pub fn token_counter(&self) -> Option<Arc<dyn LlmBackend>> {
        let name = self.token_count_llm_name.as_deref()?;
        if name.is_empty() {
            return None;
        }
        let backend = self.get(name);
        if backend.is_none() {
            warn!(name, "Token counting LLM not found in the list");
        }
        backend
    }

    /// Tests every backend concurrently. Results are in registry order.
    pub async fn verify_all(&self) -> Vec<(String, bool)> {
        join_all(self.backends.iter().map(|b| async move {
            let ok = b.test_connection().await;
            (b.name().to_string(), ok)
        }))
        .await
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.backends.iter().position(|b| b.name() == name)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new(ClientSettings::default())
    }
}
