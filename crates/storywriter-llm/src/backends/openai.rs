use super::LlmBackend;
use crate::config::{BackendConfig, BackendKind, ClientSettings, OpenAiConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use storywriter_core::{StoryError, StoryResult};
use tracing::{debug, warn};

/// OpenAI-compatible completion API backend.
///
/// Uses the plain `/completions` endpoint rather than chat, since prompts
/// are assembled as a single block of text. Works with any server exposing
/// that API under the configured base URL.
pub struct OpenAiBackend {
    config: OpenAiConfig,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
}

impl OpenAiBackend {
    /// Builds the backend and its HTTP client. The key is resolved per request.
    pub fn new(config: OpenAiConfig, settings: &ClientSettings) -> StoryResult<Self> {
        Ok(Self {
            config,
            http: settings.build_client()?,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> StoryResult<reqwest::RequestBuilder> {
        Ok(match self.config.resolve_api_key()? {
            Some(key) => request.bearer_auth(key),
            None => request,
        })
    }

    /// The configured system prompt, when set, leads the prompt text.
    fn full_prompt(&self, prompt: &str) -> String {
        let system = self.config.system_prompt.trim();
        if system.is_empty() {
            prompt.to_string()
        } else {
            format!("{system}\n\n{prompt}")
        }
    }

    async fn try_generate(&self, prompt: &str, max_length: u32) -> StoryResult<String> {
        let url = format!("{}/completions", self.config.base_url());
        let prompt = self.full_prompt(prompt);
        let request = self.authorize(self.http.post(&url))?;

        let resp = request
            .json(&CompletionRequest {
                model: self.config.model(),
                prompt: &prompt,
                max_tokens: max_length,
            })
            .send()
            .await
            .map_err(|e| StoryError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let error_body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(StoryError::Http(format!(
                "OpenAI API error {status}: {error_body}"
            )));
        }

        let body: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| StoryError::Backend(format!("Malformed completion response: {e}")))?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.text.trim().to_string())
            .ok_or_else(|| StoryError::Backend("Completion response contained no choices".into()))
    }

    async fn try_test_connection(&self) -> StoryResult<()> {
        let url = format!("{}/models", self.config.base_url());
        let resp = self
            .authorize(self.http.get(&url))?
            .send()
            .await
            .map_err(|e| StoryError::Http(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(StoryError::Http(format!("OpenAI API error {status}")))
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::OpenAi
    }

    async fn generate(&self, prompt: &str, max_length: u32) -> String {
        match self.try_generate(prompt, max_length).await {
            Ok(text) => text,
            Err(e) => {
                warn!(backend = %self.config.name, error = %e, "OpenAI generation failed");
                e.to_generation_text()
            }
        }
    }

    /// Approximate: whitespace-delimited word count, no tokenizer call.
    async fn count_tokens(&self, text: &str) -> i64 {
        text.split_whitespace().count() as i64
    }

    async fn test_connection(&self) -> bool {
        match self.try_test_connection().await {
            Ok(()) => true,
            Err(e) => {
                debug!(backend = %self.config.name, error = %e, "OpenAI connection test failed");
                false
            }
        }
    }

    fn to_config(&self) -> BackendConfig {
        BackendConfig::OpenAi(self.config.clone())
    }
}
