//! Core types shared across the storywriter crates.
//!
//! # Main types
//!
//! - [`StoryError`]: Unified error enum for every storywriter subsystem.
//! - [`StoryResult`]: Convenience alias for `Result<T, StoryError>`.
//! - [`GENERATION_ERROR_PREFIX`]: Marker that starts every generation failure text.

/// Error types.
pub mod error;

pub use error::{StoryError, StoryResult, GENERATION_ERROR_PREFIX, TOKEN_COUNT_FAILED};
