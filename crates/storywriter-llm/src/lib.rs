//! LLM backends for storywriter.
//!
//! Two structurally different remote APIs sit behind one capability trait:
//! a local Kobold-style REST server with bespoke endpoints, and a hosted
//! OpenAI-compatible completion API with authentication.
//!
//! # Main types
//!
//! - [`LlmBackend`]: Capability trait: generate, count tokens, test connection.
//! - [`BackendConfig`]: Persisted per-backend record, tagged by `type`.
//! - [`create_backend`]: The single place that maps a config to an implementation.
//! - [`BackendRegistry`]: Ordered backends plus the token-counting designation.

/// Backend implementations and the capability trait.
pub mod backends;
/// Persisted backend configuration records.
pub mod config;
/// Config-to-backend factory.
pub mod factory;
/// Ordered backend collection with JSON persistence.
pub mod registry;

pub use backends::{KoboldBackend, LlmBackend, OpenAiBackend, DEFAULT_MAX_LENGTH};
pub use config::{BackendConfig, BackendKind, ClientSettings, KoboldConfig, OpenAiConfig};
pub use factory::create_backend;
pub use registry::BackendRegistry;
