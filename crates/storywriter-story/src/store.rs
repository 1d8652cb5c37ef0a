use crate::story::Story;
use std::path::Path;
use storywriter_core::{StoryError, StoryResult};
use tracing::{debug, info};

/// Replaces anything that isn't safe in a file name with `_`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl Story {
    /// Reads a story from a JSON file.
    pub async fn load(path: &Path) -> StoryResult<Self> {
        let data = tokio::fs::read_to_string(path).await?;
        let story: Story = serde_json::from_str(&data).map_err(|e| {
            StoryError::Document(format!("Failed to parse {}: {e}", path.display()))
        })?;
        debug!(
            path = %path.display(),
            chapters = story.chapters.len(),
            "Story loaded"
        );
        Ok(story)
    }

    /// Writes the story as pretty-printed JSON, creating parent directories.
    pub async fn save(&self, path: &Path) -> StoryResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        info!(path = %path.display(), "Story saved");
        Ok(())
    }

    /// File stem derived from the title, used for default save/export names.
    pub fn file_stem(&self) -> String {
        let stem = sanitize_filename(self.title.trim());
        if stem.is_empty() {
            "untitled".to_string()
        } else {
            stem
        }
    }

    /// Plain text rendering: the title, then every chapter title underlined
    /// with `=` followed by its scene texts.
    pub fn export_text(&self) -> String {
        let mut out = format!("{}\n\n", self.title);
        for chapter in &self.chapters {
            out.push_str(&chapter.title);
            out.push('\n');
            out.push_str(&"=".repeat(chapter.title.chars().count()));
            out.push_str("\n\n");
            for scene in &chapter.scenes {
                out.push_str(&scene.text);
                out.push_str("\n\n");
            }
        }
        out
    }

    /// Writes [`export_text`](Self::export_text) to `path`.
    pub async fn export(&self, path: &Path) -> StoryResult<()> {
        tokio::fs::write(path, self.export_text()).await?;
        info!(path = %path.display(), "Story exported");
        Ok(())
    }
}
