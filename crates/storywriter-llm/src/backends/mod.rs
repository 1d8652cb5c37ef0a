/// KoboldAI / KoboldCpp HTTP backend.
pub mod kobold;
/// OpenAI-compatible completions backend.
pub mod openai;

pub use kobold::KoboldBackend;
pub use openai::OpenAiBackend;

use crate::config::{BackendConfig, BackendKind};
use async_trait::async_trait;

/// Generation length used when the caller does not pick one.
pub const DEFAULT_MAX_LENGTH: u32 = 1024;

/// Capability set shared by every LLM backend.
///
/// None of these methods fail: transport errors, unexpected statuses and
/// malformed bodies are logged and turned into sentinels at this boundary,
/// so the task layer above never performs error recovery.
///
/// To add a new backend:
/// 1. Create a new module in `backends/`
/// 2. Implement `LlmBackend` for your struct
/// 3. Add the variant to `BackendConfig` and `BackendKind` in `config.rs`
/// 4. Wire it up in `create_backend()` in `factory.rs`
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// User-chosen identifier, used for menus and token-counter lookup.
    fn name(&self) -> &str;

    /// Which implementation this is; fixed for the backend's lifetime.
    fn kind(&self) -> BackendKind;

    /// Sends `prompt` to the completion endpoint and returns the trimmed text.
    ///
    /// On failure returns a message starting with
    /// [`GENERATION_ERROR_PREFIX`](storywriter_core::GENERATION_ERROR_PREFIX).
    async fn generate(&self, prompt: &str, max_length: u32) -> String;

    /// Counts tokens in `text`, or returns
    /// [`TOKEN_COUNT_FAILED`](storywriter_core::TOKEN_COUNT_FAILED).
    async fn count_tokens(&self, text: &str) -> i64;

    /// Returns `true` if the backend is reachable and accepts our credentials.
    async fn test_connection(&self) -> bool;

    /// The persisted record this backend was built from.
    fn to_config(&self) -> BackendConfig;
}
