use super::LlmBackend;
use crate::config::{BackendConfig, BackendKind, ClientSettings, KoboldConfig};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use storywriter_core::{StoryError, StoryResult, TOKEN_COUNT_FAILED};
use tracing::{debug, warn};

/// Kobold-style local inference server (KoboldCpp, KoboldAI).
///
/// Endpoints:
/// - `POST /api/v1/generate`: `{prompt, max_length}` → `{results: [{text}]}`
/// - `POST /api/extra/tokencount`: `{prompt}` → `{value}`
/// - `GET /api/v1/version`
pub struct KoboldBackend {
    config: KoboldConfig,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    max_length: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    results: Vec<GenerateResult>,
}

#[derive(Deserialize)]
struct GenerateResult {
    text: String,
}

#[derive(Serialize)]
struct TokenCountRequest<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct TokenCountResponse {
    value: i64,
}

impl KoboldBackend {
    /// Builds the backend and its HTTP client.
    pub fn new(config: KoboldConfig, settings: &ClientSettings) -> StoryResult<Self> {
        Ok(Self {
            config,
            http: settings.build_client()?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.address.trim_end_matches('/'), path)
    }

    async fn try_generate(&self, prompt: &str, max_length: u32) -> StoryResult<String> {
        let resp = self
            .http
            .post(self.url("/api/v1/generate"))
            .json(&GenerateRequest { prompt, max_length })
            .send()
            .await
            .map_err(|e| StoryError::Http(e.to_string()))?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(StoryError::Http(format!("Kobold API error {status}")));
        }

        let body: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| StoryError::Backend(format!("Malformed generate response: {e}")))?;

        body.results
            .into_iter()
            .next()
            .map(|r| r.text.trim().to_string())
            .ok_or_else(|| StoryError::Backend("Generate response contained no results".into()))
    }

    async fn try_count_tokens(&self, text: &str) -> StoryResult<i64> {
        let resp = self
            .http
            .post(self.url("/api/extra/tokencount"))
            .json(&TokenCountRequest { prompt: text })
            .send()
            .await
            .map_err(|e| StoryError::Http(e.to_string()))?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(StoryError::Http(format!("Kobold API error {status}")));
        }

        let body: TokenCountResponse = resp
            .json()
            .await
            .map_err(|e| StoryError::Backend(format!("Malformed token count response: {e}")))?;
        Ok(body.value)
    }
}

#[async_trait]
impl LlmBackend for KoboldBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Kobold
    }

    async fn generate(&self, prompt: &str, max_length: u32) -> String {
        match self.try_generate(prompt, max_length).await {
            Ok(text) => {
                debug!(backend = %self.config.name, chars = text.len(), "Kobold generation finished");
                text
            }
            Err(e) => {
                warn!(backend = %self.config.name, error = %e, "Kobold generation failed");
                e.to_generation_text()
            }
        }
    }

    async fn count_tokens(&self, text: &str) -> i64 {
        match self.try_count_tokens(text).await {
            Ok(count) => count,
            Err(e) => {
                warn!(backend = %self.config.name, error = %e, "Kobold token count failed");
                TOKEN_COUNT_FAILED
            }
        }
    }

    async fn test_connection(&self) -> bool {
        match self.http.get(self.url("/api/v1/version")).send().await {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(e) => {
                debug!(backend = %self.config.name, error = %e, "Kobold connection test failed");
                false
            }
        }
    }

    fn to_config(&self) -> BackendConfig {
        BackendConfig::Kobold(self.config.clone())
    }
}
