//! Prompt assembly.
//!
//! Prompts are plain text wrapped in the instruct markers understood by
//! KoboldCpp's adapter templates.

use crate::story::Story;
use storywriter_core::StoryResult;

const INPUT_MARKER: &str = "{{[INPUT]}}";
const OUTPUT_MARKER: &str = "{{[OUTPUT]}}";

impl Story {
    fn prompt_preamble(&self, background_separator: &str) -> String {
        let mut prompt = format!(
            "{INPUT_MARKER}\nYou are to take the role of an author writing a story. \
             The story is titled \"{}\".",
            self.title
        );
        if !self.summary.is_empty() {
            prompt.push_str(background_separator);
            prompt.push_str("General background information: ");
            prompt.push_str(&self.summary);
        }
        if !self.genre.is_empty() {
            prompt.push_str("\n\nGenre: ");
            prompt.push_str(&self.genre);
        }
        prompt
    }

    /// Prompt asking for the text of scene `scene` in chapter `chapter`.
    ///
    /// Context, in order: background, genre, story objects, the summaries
    /// of every chapter up to and including this one, the summaries of the
    /// scenes before the previous one, the full text of the previous scene,
    /// then this scene's summary and the story's scene instruction.
    pub fn scene_prompt(&self, chapter: usize, scene: usize) -> StoryResult<String> {
        let current = self.scene(chapter, scene)?;
        let ch = self.chapter(chapter)?;

        let mut prompt = self.prompt_preamble("\n\n");
        if !self.story_objects.is_empty() {
            prompt.push_str("\n\nStory Objects:");
            for obj in &self.story_objects {
                prompt.push_str(&format!("\n- {}: {}", obj.name, obj.short_desc));
            }
        }

        prompt.push_str("\n\nThe story so far has had the following major events happen:");
        for earlier in &self.chapters[..=chapter] {
            prompt.push_str("\n\n");
            prompt.push_str(&earlier.summary);
        }
        prompt.push_str(&format!("\n\nThe current chapter is titled \"{}\"", ch.title));

        if scene > 1 {
            prompt.push_str("\n\nThe following scenes have already happened in this chapter:");
            for earlier in &ch.scenes[..scene - 1] {
                prompt.push('\n');
                prompt.push_str(&earlier.summary);
            }
        }
        if scene > 0 {
            prompt.push_str("\n\nThe most recent scene before this one was:\n\n");
            prompt.push_str(&ch.scenes[scene - 1].text);
        }

        prompt.push_str("\n\nYou are now writing the next scene in which the following occurs: ");
        prompt.push_str(&current.summary);
        prompt.push_str("\n\n");
        prompt.push_str(&self.scene_generation_prompt);
        prompt.push('\n');
        prompt.push_str(OUTPUT_MARKER);
        Ok(prompt)
    }

    /// Prompt asking for a summary of the chapter *before* `chapter`, to be
    /// stored as `chapter`'s summary. `None` for the first chapter.
    pub fn chapter_summary_prompt(&self, chapter: usize) -> StoryResult<Option<String>> {
        self.chapter(chapter)?;
        let Some(previous) = chapter.checked_sub(1) else {
            return Ok(None);
        };

        let mut prompt = self.prompt_preamble("\n");
        prompt.push_str("\n\nThe most recent chapter of the story is:");
        for scene in &self.chapters[previous].scenes {
            prompt.push_str("\n\n");
            prompt.push_str(&scene.text);
        }
        prompt.push_str("\n\n");
        prompt.push_str(&self.chapter_summary_prompt);
        prompt.push('\n');
        prompt.push_str(OUTPUT_MARKER);
        Ok(Some(prompt))
    }
}

#[cfg(test)]
mod tests {
    use crate::story::{Story, StoryObject};

    fn story() -> Story {
        let mut story = Story::new("Ashes");
        story.summary = "A city burns.".into();
        story.scene_generation_prompt = "Write it.".into();
        story.chapter_summary_prompt = "Summarize it.".into();
        for (title, summary) in [("One", "c1"), ("Two", "c2")] {
            let c = story.add_chapter(title);
            story.chapters[c].summary = summary.into();
            for s in 0..3 {
                story.add_scene(c).unwrap();
                story.chapters[c].scenes[s].summary = format!("{title}-sum{s}");
                story.chapters[c].scenes[s].text = format!("{title}-text{s}");
            }
        }
        story
    }

    #[test]
    fn first_scene_prompt() {
        let prompt = story().scene_prompt(0, 0).unwrap();
        assert_eq!(
            prompt,
            "{{[INPUT]}}\nYou are to take the role of an author writing a story. \
             The story is titled \"Ashes\".\n\nGeneral background information: A city burns.\
             \n\nThe story so far has had the following major events happen:\n\nc1\
             \n\nThe current chapter is titled \"One\"\
             \n\nYou are now writing the next scene in which the following occurs: One-sum0\
             \n\nWrite it.\n{{[OUTPUT]}}"
        );
    }

    #[test]
    fn later_scene_prompt_includes_history() {
        let mut s = story();
        s.genre = "Noir".into();
        s.story_objects.push(StoryObject {
            name: "Mara".into(),
            tags: "person".into(),
            short_desc: "a firefighter".into(),
            long_desc: String::new(),
        });
        let prompt = s.scene_prompt(1, 2).unwrap();

        assert!(prompt.contains("\n\nGenre: Noir"));
        assert!(prompt.contains("\n\nStory Objects:\n- Mara: a firefighter"));
        assert!(prompt.contains("happen:\n\nc1\n\nc2\n\nThe current chapter is titled \"Two\""));
        assert!(prompt.contains("in this chapter:\nTwo-sum0\n\n"));
        assert!(!prompt.contains("Two-sum1\n\nThe most recent"));
        assert!(prompt.contains("before this one was:\n\nTwo-text1"));
        assert!(prompt.ends_with("occurs: Two-sum2\n\nWrite it.\n{{[OUTPUT]}}"));
    }

    #[test]
    fn second_scene_has_no_scene_list() {
        let prompt = story().scene_prompt(0, 1).unwrap();
        assert!(!prompt.contains("already happened in this chapter"));
        assert!(prompt.contains("before this one was:\n\nOne-text0"));
    }

    #[test]
    fn chapter_summary_prompt_uses_previous_chapter() {
        let s = story();
        assert!(s.chapter_summary_prompt(0).unwrap().is_none());
        let prompt = s.chapter_summary_prompt(1).unwrap().unwrap();
        assert_eq!(
            prompt,
            "{{[INPUT]}}\nYou are to take the role of an author writing a story. \
             The story is titled \"Ashes\".\nGeneral background information: A city burns.\
             \n\nThe most recent chapter of the story is:\
             \n\nOne-text0\n\nOne-text1\n\nOne-text2\n\nSummarize it.\n{{[OUTPUT]}}"
        );
    }

    #[test]
    fn out_of_range_is_error() {
        let s = story();
        assert!(s.scene_prompt(5, 0).is_err());
        assert!(s.scene_prompt(0, 9).is_err());
        assert!(s.chapter_summary_prompt(7).is_err());
    }
}
