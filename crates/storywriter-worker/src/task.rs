use std::fmt;
use std::sync::Arc;
use storywriter_core::{StoryError, TOKEN_COUNT_FAILED};
use storywriter_llm::{LlmBackend, DEFAULT_MAX_LENGTH};
use tracing::debug;

/// What a task asks its backend to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// Count the tokens in `text`.
    Count { text: String },
    /// Generate up to `max_length` tokens continuing `prompt`.
    Generate { prompt: String, max_length: u32 },
}

impl TaskKind {
    /// The sentinel reported when a task of this kind cannot finish:
    /// `-1` for counts, an error text for generations.
    pub fn failed_output(&self, reason: &str) -> TaskOutput {
        match self {
            TaskKind::Count { .. } => TaskOutput::TokensCounted(TOKEN_COUNT_FAILED),
            TaskKind::Generate { .. } => TaskOutput::ResponseGenerated(
                StoryError::Backend(reason.to_string()).to_generation_text(),
            ),
        }
    }

    /// Runs this request against `backend`.
    pub(crate) async fn run(self, backend: &dyn LlmBackend) -> TaskOutput {
        let output = match self {
            TaskKind::Count { text } => TaskOutput::TokensCounted(backend.count_tokens(&text).await),
            TaskKind::Generate { prompt, max_length } => {
                TaskOutput::ResponseGenerated(backend.generate(&prompt, max_length).await)
            }
        };
        debug!(backend = backend.name(), output = output.label(), "Task finished");
        output
    }
}

/// One queued request.
///
/// The backend handle is captured when the task is built, so later edits to
/// the registry do not affect it. `target` identifies where the result goes;
/// it is handed back untouched in the [`Completion`].
pub struct Task<T> {
    kind: TaskKind,
    backend: Arc<dyn LlmBackend>,
    target: T,
}

impl<T> Task<T> {
    /// A token-count request for `text`.
    pub fn count(text: impl Into<String>, backend: Arc<dyn LlmBackend>, target: T) -> Self {
        Self {
            kind: TaskKind::Count { text: text.into() },
            backend,
            target,
        }
    }

    /// A generation request for `prompt` with the default length.
    pub fn generate(prompt: impl Into<String>, backend: Arc<dyn LlmBackend>, target: T) -> Self {
        Self {
            kind: TaskKind::Generate {
                prompt: prompt.into(),
                max_length: DEFAULT_MAX_LENGTH,
            },
            backend,
            target,
        }
    }

    /// Overrides the generation length. No effect on count tasks.
    pub fn with_max_length(mut self, max_length: u32) -> Self {
        if let TaskKind::Generate { max_length: m, .. } = &mut self.kind {
            *m = max_length;
        }
        self
    }

    /// What this task asks for.
    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    /// Name of the captured backend.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Where the result goes.
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Splits the task so the target outlives a failed execution.
    pub fn into_parts(self) -> (TaskKind, Arc<dyn LlmBackend>, T) {
        (self.kind, self.backend, self.target)
    }

    /// Runs the task against its backend.
    ///
    /// Backends never fail past their own boundary, so this always produces
    /// a completion: a count (possibly the `-1` sentinel) or a text (possibly
    /// an error message).
    pub async fn execute(self) -> Completion<T> {
        let (kind, backend, target) = self.into_parts();
        let output = kind.run(backend.as_ref()).await;
        Completion {
            target,
            backend: backend.name().to_string(),
            output,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("kind", &self.kind)
            .field("backend", &self.backend.name())
            .field("target", &self.target)
            .finish()
    }
}

/// The result of an executed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutput {
    /// Token count, or `-1` if counting failed.
    TokensCounted(i64),
    /// Generated text, or an error text if generation failed.
    ResponseGenerated(String),
}

impl TaskOutput {
    fn label(&self) -> &'static str {
        match self {
            TaskOutput::TokensCounted(_) => "tokens_counted",
            TaskOutput::ResponseGenerated(_) => "response_generated",
        }
    }
}

/// A finished task on its way back to the owning context.
#[derive(Debug)]
pub struct Completion<T> {
    /// The target the task was created with.
    pub target: T,
    /// Name of the backend that served the task.
    pub backend: String,
    /// What the backend produced.
    pub output: TaskOutput,
}

impl<T> Completion<T> {
    /// Hands the result to `sink`. Consumes the completion, so each result
    /// reaches a sink at most once.
    pub fn deliver<S: ResultSink<T> + ?Sized>(self, sink: &mut S) {
        match self.output {
            TaskOutput::TokensCounted(count) => sink.on_tokens_counted(self.target, count),
            TaskOutput::ResponseGenerated(text) => sink.on_response_generated(self.target, text),
        }
    }
}

/// Receiver of task results, implemented by whatever owns the target fields.
///
/// Called only from the context that drains the completion channel, never
/// from the worker.
pub trait ResultSink<T> {
    /// Stores a token count (`-1` when unknown) for `target`.
    fn on_tokens_counted(&mut self, target: T, count: i64);
    /// Stores generated text (or an error text) into `target`.
    fn on_response_generated(&mut self, target: T, text: String);
}
