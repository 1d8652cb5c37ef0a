//! Offline edits to a story document: structure, objects and prompts.
//!
//! Nothing here talks to an LLM; text fields that need a recount go through
//! [`StorySession`](crate::session::StorySession) instead.

use crate::session::index_arg;
use clap::{Subcommand, ValueEnum};
use storywriter_core::StoryResult;
use storywriter_story::{format_tokens, Story, StoryField, StoryObject};

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum EditAction {
    /// Set title, genre or background summary
    Info {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        genre: Option<String>,
        /// General background information included in every prompt
        #[arg(long)]
        summary: Option<String>,
    },
    /// Show or set the instructions that close each prompt
    Prompts {
        #[arg(long)]
        chapter_summary: Option<String>,
        #[arg(long)]
        scene_generation: Option<String>,
    },
    /// Append a chapter
    AddChapter { title: String },
    /// Append a scene to a chapter
    AddScene {
        #[arg(long)]
        chapter: usize,
        /// What happens in the scene
        #[arg(long, default_value = "")]
        summary: String,
    },
    /// Move a scene one place up or down within its chapter
    MoveScene {
        #[arg(long)]
        chapter: usize,
        #[arg(long)]
        scene: usize,
        direction: Direction,
    },
    /// Delete a chapter and all its scenes
    RemoveChapter {
        #[arg(long)]
        chapter: usize,
    },
    /// Delete a scene
    RemoveScene {
        #[arg(long)]
        chapter: usize,
        #[arg(long)]
        scene: usize,
    },
    /// Add a character, place or thing
    AddObject {
        name: String,
        /// Comma-separated
        #[arg(long, default_value = "")]
        tags: String,
        /// One line, included in scene prompts
        #[arg(long, default_value = "")]
        short_desc: String,
        #[arg(long, default_value = "")]
        long_desc: String,
    },
    /// Remove a story object
    RemoveObject { name: String },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl EditAction {
    /// Whether the action changes the document (and so needs a save).
    pub fn modifies(&self) -> bool {
        !matches!(
            self,
            EditAction::Prompts {
                chapter_summary: None,
                scene_generation: None,
            }
        )
    }
}

/// Applies `action` to `story` and returns a message for the user.
/// Chapter and scene numbers are 1-based.
pub fn apply(story: &mut Story, action: EditAction) -> StoryResult<String> {
    match action {
        EditAction::Info {
            title,
            genre,
            summary,
        } => {
            if let Some(title) = title {
                story.title = title;
            }
            if let Some(genre) = genre {
                story.genre = genre;
            }
            if let Some(summary) = summary {
                story.summary = summary;
            }
            Ok(format!("Updated \"{}\"", story.title))
        }
        EditAction::Prompts {
            chapter_summary,
            scene_generation,
        } => {
            if chapter_summary.is_none() && scene_generation.is_none() {
                return Ok(format!(
                    "Chapter summary prompt:\n  {}\nScene generation prompt:\n  {}",
                    story.chapter_summary_prompt, story.scene_generation_prompt
                ));
            }
            if let Some(prompt) = chapter_summary {
                story.chapter_summary_prompt = prompt;
            }
            if let Some(prompt) = scene_generation {
                story.scene_generation_prompt = prompt;
            }
            Ok("Prompts updated".to_string())
        }
        EditAction::AddChapter { title } => {
            let c = story.add_chapter(title);
            Ok(format!("Added chapter {}", c + 1))
        }
        EditAction::AddScene { chapter, summary } => {
            let c = index_arg("Chapter", chapter)?;
            let s = story.add_scene(c)?;
            if !summary.is_empty() {
                story.set_field_text(StoryField::SceneSummary { chapter: c, scene: s }, summary)?;
            }
            Ok(format!("Added scene {} to chapter {}", s + 1, c + 1))
        }
        EditAction::MoveScene {
            chapter,
            scene,
            direction,
        } => {
            let c = index_arg("Chapter", chapter)?;
            let s = index_arg("Scene", scene)?;
            if story.move_scene(c, s, direction == Direction::Up)? {
                Ok("Scene moved".to_string())
            } else {
                Ok("Scene is already at the edge of its chapter".to_string())
            }
        }
        EditAction::RemoveChapter { chapter } => {
            let removed = story.remove_chapter(index_arg("Chapter", chapter)?)?;
            Ok(format!(
                "Removed chapter \"{}\" ({} scene(s))",
                removed.title,
                removed.scenes.len()
            ))
        }
        EditAction::RemoveScene { chapter, scene } => {
            story.remove_scene(index_arg("Chapter", chapter)?, index_arg("Scene", scene)?)?;
            Ok(format!("Removed scene {scene} from chapter {chapter}"))
        }
        EditAction::AddObject {
            name,
            tags,
            short_desc,
            long_desc,
        } => {
            story.add_object(StoryObject {
                name: name.clone(),
                tags,
                short_desc,
                long_desc,
            })?;
            Ok(format!("Added story object '{name}'"))
        }
        EditAction::RemoveObject { name } => {
            story.remove_object(&name)?;
            Ok(format!("Removed story object '{name}'"))
        }
    }
}

/// Chapter/scene overview with per-field token counts.
pub fn outline(story: &Story) -> String {
    let mut out = format!("{}\n", story.title);
    if !story.genre.is_empty() {
        out.push_str(&format!("Genre: {}\n", story.genre));
    }
    for obj in &story.story_objects {
        out.push_str(&format!("  * {}: {}\n", obj.name, obj.short_desc));
    }
    for (c, chapter) in story.chapters.iter().enumerate() {
        out.push_str(&format!(
            "\nChapter {}: {} (summary: {} tokens)\n",
            c + 1,
            chapter.title,
            format_tokens(chapter.summary_tokens)
        ));
        for (s, scene) in chapter.scenes.iter().enumerate() {
            out.push_str(&format!(
                "  Scene {}: {} (summary: {}, text: {} tokens)\n",
                s + 1,
                scene.summary,
                format_tokens(scene.summary_tokens),
                format_tokens(scene.text_tokens)
            ));
        }
    }
    out.push_str(&format!(
        "\nTotal: {} tokens, {} field(s) unknown\n",
        story.total_tokens(),
        story.stale_fields().len()
    ));
    out
}
