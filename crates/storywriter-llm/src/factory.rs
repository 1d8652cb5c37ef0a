use crate::backends::{KoboldBackend, LlmBackend, OpenAiBackend};
use crate::config::{BackendConfig, ClientSettings};
use std::sync::Arc;
use storywriter_core::StoryResult;

/// Builds the backend described by `config`.
///
/// This is the only place that maps a [`BackendConfig`] variant to an
/// implementation; call sites only ever see `Arc<dyn LlmBackend>`.
pub fn create_backend(
    config: BackendConfig,
    settings: &ClientSettings,
) -> StoryResult<Arc<dyn LlmBackend>> {
    let backend: Arc<dyn LlmBackend> = match config {
        BackendConfig::Kobold(c) => Arc::new(KoboldBackend::new(c, settings)?),
        BackendConfig::OpenAi(c) => Arc::new(OpenAiBackend::new(c, settings)?),
    };
    Ok(backend)
}
