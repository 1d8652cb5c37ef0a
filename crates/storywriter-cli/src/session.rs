//! An open story plus the queue that feeds it.
//!
//! The session is the owning context: tasks run on the queue's background
//! loop, but their completions are received and applied here, so the story
//! is only ever mutated by the session.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use storywriter_core::{StoryError, StoryResult};
use storywriter_llm::LlmBackend;
use storywriter_story::{Story, StoryField};
use storywriter_worker::{Completions, Task, TaskQueue};
use tracing::{info, warn};

pub struct StorySession {
    story: Story,
    path: PathBuf,
    queue: TaskQueue<StoryField>,
    completions: Completions<StoryField>,
    token_counter: Option<Arc<dyn LlmBackend>>,
}

impl StorySession {
    /// Loads the story at `path`. Must be called inside a Tokio runtime.
    pub async fn open(path: &Path, token_counter: Option<Arc<dyn LlmBackend>>) -> StoryResult<Self> {
        let story = Story::load(path).await?;
        let (queue, completions) = TaskQueue::current()?;
        Ok(Self {
            story,
            path: path.to_path_buf(),
            queue,
            completions,
            token_counter,
        })
    }

    pub fn story(&self) -> &Story {
        &self.story
    }

    /// Generates text into `field`, then recounts it when a token counter
    /// is configured.
    pub async fn generate(
        &mut self,
        field: StoryField,
        prompt: String,
        backend: Arc<dyn LlmBackend>,
        max_length: u32,
    ) -> StoryResult<()> {
        self.story.begin_generation(field)?;
        info!(field = %field, backend = backend.name(), "Generating");
        self.queue
            .enqueue(Task::generate(prompt, backend, field).with_max_length(max_length));

        let completion = self
            .completions
            .recv()
            .await
            .ok_or_else(|| StoryError::Queue("Completion channel closed".into()))?;
        completion.deliver(&mut self.story);

        self.recount(vec![field]).await?;
        Ok(())
    }

    /// Replaces a field's text by hand, then recounts it.
    pub async fn set_text(&mut self, field: StoryField, text: String) -> StoryResult<()> {
        self.story.set_field_text(field, text)?;
        self.recount(vec![field]).await?;
        Ok(())
    }

    /// Counts tokens for `fields` on the token counter and applies the
    /// results. Returns how many counts were queued.
    pub async fn recount(&mut self, fields: Vec<StoryField>) -> StoryResult<usize> {
        let Some(counter) = self.token_counter.clone() else {
            warn!("No token counting LLM configured; counts left stale");
            return Ok(0);
        };

        let mut queued = 0;
        for field in fields {
            let Some((text, _)) = self.story.field(field) else {
                continue;
            };
            self.queue
                .enqueue(Task::count(text, Arc::clone(&counter), field));
            queued += 1;
        }
        self.settle().await;
        Ok(queued)
    }

    pub async fn save(&self) -> StoryResult<()> {
        self.story.save(&self.path).await
    }

    async fn settle(&mut self) {
        self.queue.wait_idle().await;
        while let Ok(completion) = self.completions.try_recv() {
            completion.deliver(&mut self.story);
        }
    }
}

/// Converts 1-based user input into a 0-based index.
pub fn index_arg(what: &str, n: usize) -> StoryResult<usize> {
    n.checked_sub(1)
        .ok_or_else(|| StoryError::Document(format!("{what} numbers start at 1")))
}
