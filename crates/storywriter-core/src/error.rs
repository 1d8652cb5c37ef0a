use thiserror::Error;

/// Text that starts every failed generation result shown to the user.
pub const GENERATION_ERROR_PREFIX: &str = "Error generating response";

/// Token count reported when the count is unknown or the request failed.
pub const TOKEN_COUNT_FAILED: i64 = -1;

/// Top-level error type for the storywriter crates.
///
/// Backend calls never surface these to the task layer; they are collapsed
/// into sentinels at the backend boundary. Everything else (config files,
/// story documents, the CLI) propagates them with `?`.
#[derive(Error, Debug)]
pub enum StoryError {
    /// An outbound HTTP request failed or returned an unexpected status.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A backend answered, but the answer could not be used.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Invalid or unresolvable configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// A story document is malformed or a chapter/scene index is out of range.
    #[error("Document error: {0}")]
    Document(String),

    /// The task queue could not accept or run work.
    #[error("Queue error: {0}")]
    Queue(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`StoryError`].
pub type StoryResult<T> = Result<T, StoryError>;

impl StoryError {
    /// Renders this error as the text a failed generation hands to its sink.
    pub fn to_generation_text(&self) -> String {
        format!("{GENERATION_ERROR_PREFIX}: {self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_text_carries_marker() {
        let err = StoryError::Http("500 Internal Server Error".into());
        let text = err.to_generation_text();
        assert!(text.starts_with(GENERATION_ERROR_PREFIX));
        assert!(text.contains("500"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: StoryError = io.into();
        assert!(matches!(err, StoryError::Io(_)));
        assert_eq!(err.to_string(), "IO error: gone");
    }
}
