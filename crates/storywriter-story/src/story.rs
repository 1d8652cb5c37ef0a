use serde::{Deserialize, Serialize};
use std::fmt;
use storywriter_core::{StoryError, StoryResult, TOKEN_COUNT_FAILED};
use storywriter_worker::ResultSink;
use tracing::debug;

/// Text placed in a field while its generation is queued.
pub const GENERATING_PLACEHOLDER: &str = "Generating...";

const DEFAULT_CHAPTER_SUMMARY_PROMPT: &str = "Please summarize this chapter in 200 words or less, \
focusing on the information that's important for writing future scenes in this story.";
const DEFAULT_SCENE_GENERATION_PROMPT: &str = "Please write out this scene.";

fn default_chapter_summary_prompt() -> String {
    DEFAULT_CHAPTER_SUMMARY_PROMPT.to_string()
}

fn default_scene_generation_prompt() -> String {
    DEFAULT_SCENE_GENERATION_PROMPT.to_string()
}

fn stale_tokens() -> i64 {
    TOKEN_COUNT_FAILED
}

/// A whole story document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    /// Shown in prompts and used for file names.
    #[serde(default)]
    pub title: String,
    /// Optional; omitted from prompts when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub genre: String,
    /// Background information placed near the top of every prompt.
    #[serde(default)]
    pub summary: String,
    /// Instruction closing every chapter summary prompt.
    #[serde(default = "default_chapter_summary_prompt")]
    pub chapter_summary_prompt: String,
    /// Instruction closing every scene prompt.
    #[serde(default = "default_scene_generation_prompt")]
    pub scene_generation_prompt: String,
    /// Characters, places and things listed in scene prompts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub story_objects: Vec<StoryObject>,
    /// Chapters in reading order.
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

/// A chapter. Its summary describes the *previous* chapter and gives the
/// LLM context for how the story reached this point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// Used as the heading in plain text exports.
    #[serde(default)]
    pub title: String,
    /// Summary of everything up to the start of this chapter.
    #[serde(default)]
    pub summary: String,
    /// Token count of `summary`; `-1` when unknown.
    #[serde(rename = "summaryTokens", default = "stale_tokens")]
    pub summary_tokens: i64,
    /// Scenes in reading order.
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

/// A scene: what should happen, and the prose that was written for it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    /// What happens in the scene; drives generation.
    #[serde(default)]
    pub summary: String,
    /// Token count of `summary`; `-1` when unknown.
    #[serde(rename = "summaryTokens", default = "stale_tokens")]
    pub summary_tokens: i64,
    /// The scene prose.
    #[serde(default)]
    pub text: String,
    /// Token count of `text`; `-1` when unknown.
    #[serde(rename = "textTokens", default = "stale_tokens")]
    pub text_tokens: i64,
}

/// A character, place or thing listed in scene prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryObject {
    /// Unique within a story.
    pub name: String,
    /// Comma-separated.
    #[serde(default)]
    pub tags: String,
    /// One line, included in scene prompts.
    #[serde(default)]
    pub short_desc: String,
    /// Free-form notes; never sent to an LLM.
    #[serde(default)]
    pub long_desc: String,
}

/// Address of a text field that tasks can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoryField {
    /// `chapters[chapter].summary`
    ChapterSummary { chapter: usize },
    /// `chapters[chapter].scenes[scene].summary`
    SceneSummary { chapter: usize, scene: usize },
    /// `chapters[chapter].scenes[scene].text`
    SceneText { chapter: usize, scene: usize },
}

impl fmt::Display for StoryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoryField::ChapterSummary { chapter } => write!(f, "chapter {} summary", chapter + 1),
            StoryField::SceneSummary { chapter, scene } => {
                write!(f, "chapter {} scene {} summary", chapter + 1, scene + 1)
            }
            StoryField::SceneText { chapter, scene } => {
                write!(f, "chapter {} scene {} text", chapter + 1, scene + 1)
            }
        }
    }
}

impl Default for Story {
    fn default() -> Self {
        Self::new("")
    }
}

impl Chapter {
    /// An empty chapter with no scenes.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: String::new(),
            summary_tokens: 0,
            scenes: Vec::new(),
        }
    }
}

impl Story {
    /// An empty story with the default prompts.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            genre: String::new(),
            summary: String::new(),
            chapter_summary_prompt: default_chapter_summary_prompt(),
            scene_generation_prompt: default_scene_generation_prompt(),
            story_objects: Vec::new(),
            chapters: Vec::new(),
        }
    }

    /// Appends an empty chapter and returns its index.
    pub fn add_chapter(&mut self, title: impl Into<String>) -> usize {
        self.chapters.push(Chapter::new(title));
        self.chapters.len() - 1
    }

    /// Appends an empty scene to `chapter` and returns its index.
    pub fn add_scene(&mut self, chapter: usize) -> StoryResult<usize> {
        let ch = self.chapter_mut(chapter)?;
        ch.scenes.push(Scene::default());
        Ok(ch.scenes.len() - 1)
    }

    /// Removes and returns a chapter with its scenes.
    pub fn remove_chapter(&mut self, chapter: usize) -> StoryResult<Chapter> {
        self.chapter(chapter)?;
        Ok(self.chapters.remove(chapter))
    }

    /// Removes and returns a scene.
    pub fn remove_scene(&mut self, chapter: usize, scene: usize) -> StoryResult<Scene> {
        let ch = self.chapter_mut(chapter)?;
        if scene >= ch.scenes.len() {
            return Err(no_scene(chapter, scene));
        }
        Ok(ch.scenes.remove(scene))
    }

    /// Swaps a scene with its neighbour. Returns `false` (and changes
    /// nothing) when the scene is already first/last.
    pub fn move_scene(&mut self, chapter: usize, scene: usize, up: bool) -> StoryResult<bool> {
        let ch = self.chapter_mut(chapter)?;
        if scene >= ch.scenes.len() {
            return Err(no_scene(chapter, scene));
        }
        let target = if up { scene.checked_sub(1) } else { Some(scene + 1) };
        match target {
            Some(t) if t < ch.scenes.len() => {
                ch.scenes.swap(scene, t);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// The chapter at `chapter`, or a document error.
    pub fn chapter(&self, chapter: usize) -> StoryResult<&Chapter> {
        self.chapters
            .get(chapter)
            .ok_or_else(|| StoryError::Document(format!("No chapter {}", chapter + 1)))
    }

    fn chapter_mut(&mut self, chapter: usize) -> StoryResult<&mut Chapter> {
        self.chapters
            .get_mut(chapter)
            .ok_or_else(|| StoryError::Document(format!("No chapter {}", chapter + 1)))
    }

    /// The scene at `chapter`/`scene`, or a document error.
    pub fn scene(&self, chapter: usize, scene: usize) -> StoryResult<&Scene> {
        self.chapter(chapter)?
            .scenes
            .get(scene)
            .ok_or_else(|| no_scene(chapter, scene))
    }

    /// Text and cached token count of a field, if it still exists.
    pub fn field(&self, field: StoryField) -> Option<(&str, i64)> {
        match field {
            StoryField::ChapterSummary { chapter } => {
                let ch = self.chapters.get(chapter)?;
                Some((ch.summary.as_str(), ch.summary_tokens))
            }
            StoryField::SceneSummary { chapter, scene } => {
                let sc = self.chapters.get(chapter)?.scenes.get(scene)?;
                Some((sc.summary.as_str(), sc.summary_tokens))
            }
            StoryField::SceneText { chapter, scene } => {
                let sc = self.chapters.get(chapter)?.scenes.get(scene)?;
                Some((sc.text.as_str(), sc.text_tokens))
            }
        }
    }

    fn field_mut(&mut self, field: StoryField) -> Option<(&mut String, &mut i64)> {
        match field {
            StoryField::ChapterSummary { chapter } => {
                let ch = self.chapters.get_mut(chapter)?;
                Some((&mut ch.summary, &mut ch.summary_tokens))
            }
            StoryField::SceneSummary { chapter, scene } => {
                let sc = self.chapters.get_mut(chapter)?.scenes.get_mut(scene)?;
                Some((&mut sc.summary, &mut sc.summary_tokens))
            }
            StoryField::SceneText { chapter, scene } => {
                let sc = self.chapters.get_mut(chapter)?.scenes.get_mut(scene)?;
                Some((&mut sc.text, &mut sc.text_tokens))
            }
        }
    }

    /// Replaces a field's text and marks its token count stale.
    pub fn set_field_text(&mut self, field: StoryField, text: impl Into<String>) -> StoryResult<()> {
        let (slot, tokens) = self
            .field_mut(field)
            .ok_or_else(|| StoryError::Document(format!("No {field}")))?;
        *slot = text.into();
        *tokens = TOKEN_COUNT_FAILED;
        Ok(())
    }

    /// Puts the placeholder into a field about to be generated. The count is
    /// set to zero so nobody queues a recount of the placeholder.
    pub fn begin_generation(&mut self, field: StoryField) -> StoryResult<()> {
        let (slot, tokens) = self
            .field_mut(field)
            .ok_or_else(|| StoryError::Document(format!("No {field}")))?;
        *slot = GENERATING_PLACEHOLDER.to_string();
        *tokens = 0;
        Ok(())
    }

    /// Adds a story object. Names must be unique.
    pub fn add_object(&mut self, object: StoryObject) -> StoryResult<()> {
        if self.object(&object.name).is_some() {
            return Err(StoryError::Document(format!(
                "Story object '{}' already exists",
                object.name
            )));
        }
        self.story_objects.push(object);
        Ok(())
    }

    /// Removes and returns the story object called `name`.
    pub fn remove_object(&mut self, name: &str) -> StoryResult<StoryObject> {
        let index = self
            .story_objects
            .iter()
            .position(|o| o.name == name)
            .ok_or_else(|| StoryError::Document(format!("No story object '{name}'")))?;
        Ok(self.story_objects.remove(index))
    }

    /// The story object called `name`.
    pub fn object(&self, name: &str) -> Option<&StoryObject> {
        self.story_objects.iter().find(|o| o.name == name)
    }

    /// Every addressable field, in document order.
    pub fn fields(&self) -> Vec<StoryField> {
        let mut fields = Vec::new();
        for (c, chapter) in self.chapters.iter().enumerate() {
            fields.push(StoryField::ChapterSummary { chapter: c });
            for s in 0..chapter.scenes.len() {
                fields.push(StoryField::SceneSummary { chapter: c, scene: s });
                fields.push(StoryField::SceneText { chapter: c, scene: s });
            }
        }
        fields
    }

    /// Fields whose token count is unknown and should be recounted.
    pub fn stale_fields(&self) -> Vec<StoryField> {
        self.fields()
            .into_iter()
            .filter(|f| matches!(self.field(*f), Some((_, tokens)) if tokens < 0))
            .collect()
    }

    /// Sum of all known token counts. Stale fields are not included.
    pub fn total_tokens(&self) -> i64 {
        self.fields()
            .into_iter()
            .filter_map(|f| self.field(f).map(|(_, t)| t))
            .filter(|t| *t >= 0)
            .sum()
    }
}

/// A token count as shown to the user: the number, or `unknown` for `-1`.
pub fn format_tokens(count: i64) -> String {
    if count < 0 {
        "unknown".to_string()
    } else {
        count.to_string()
    }
}

fn no_scene(chapter: usize, scene: usize) -> StoryError {
    StoryError::Document(format!("No scene {} in chapter {}", scene + 1, chapter + 1))
}

impl ResultSink<StoryField> for Story {
    fn on_tokens_counted(&mut self, target: StoryField, count: i64) {
        match self.field_mut(target) {
            Some((_, tokens)) => *tokens = count,
            None => debug!(field = %target, "Token count for a field that no longer exists"),
        }
    }

    fn on_response_generated(&mut self, target: StoryField, text: String) {
        if self.set_field_text(target, text).is_err() {
            debug!(field = %target, "Generated text for a field that no longer exists");
        }
    }
}
