//! The story document: chapters, scenes, story objects, and the token counts
//! cached alongside each text field.
//!
//! The document is the owner of every field a queued task targets. It
//! implements [`storywriter_worker::ResultSink`] for [`StoryField`], so
//! completions are applied by whoever holds the `Story`, never by the worker.

/// Prompt assembly for scene generation and chapter summaries.
pub mod prompt;
/// The document model and field addressing.
pub mod story;
/// JSON persistence and plain text export.
pub mod store;

pub use story::{
    format_tokens, Chapter, Scene, Story, StoryField, StoryObject, GENERATING_PLACEHOLDER,
};
pub use store::sanitize_filename;
