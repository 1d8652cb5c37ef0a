//! `storywriter`: manage LLM backends and drive story generation from the
//! command line.

mod edit;
mod session;
mod settings;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use edit::EditAction;
use session::{index_arg, StorySession};
use settings::AppConfig;
use std::path::{Path, PathBuf};
use storywriter_llm::{BackendConfig, BackendKind, BackendRegistry, KoboldConfig, OpenAiConfig};
use storywriter_story::{format_tokens, Story, StoryField};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "storywriter", about = "Storywriter: LLM-assisted fiction writing")]
struct Cli {
    /// Path to settings file
    #[arg(short, long, default_value = "storywriter.toml")]
    config: PathBuf,

    /// Backend list (overrides settings)
    #[arg(long)]
    llm_config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage LLM backends
    Llm {
        #[command(subcommand)]
        action: LlmAction,
    },
    /// Work on a story file
    Story {
        #[command(subcommand)]
        action: StoryAction,
    },
}

#[derive(Subcommand)]
enum LlmAction {
    /// List configured backends
    List,
    /// Test connectivity of one backend, or all of them
    Test { name: Option<String> },
    /// Add a Kobold backend
    AddKobold {
        name: String,
        #[arg(long, default_value = "http://localhost:5001")]
        address: String,
        #[arg(long, default_value = "")]
        system_prompt: String,
    },
    /// Add an OpenAI-compatible backend
    AddOpenai {
        name: String,
        /// API base URL (defaults to the OpenAI API)
        #[arg(long, default_value = "")]
        address: String,
        /// Literal key, or a variable name with --use-env-var
        #[arg(long, default_value = "")]
        api_key: String,
        #[arg(long)]
        use_env_var: bool,
        #[arg(long)]
        model: Option<String>,
        #[arg(long, default_value = "")]
        system_prompt: String,
    },
    /// Remove a backend
    Remove { name: String },
    /// Show or set the backend used for token counting
    TokenCounter {
        name: Option<String>,
        /// Unset the token counter
        #[arg(long, conflicts_with = "name")]
        clear: bool,
    },
}

#[derive(Subcommand)]
enum StoryAction {
    /// Create a new, empty story file
    New {
        file: PathBuf,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        genre: String,
        /// General background information included in every prompt
        #[arg(long, default_value = "")]
        summary: String,
    },
    /// Print chapters, scenes and token counts
    Show { file: PathBuf },
    /// Edit structure, story objects or prompts
    Edit {
        file: PathBuf,
        #[command(subcommand)]
        action: EditAction,
    },
    /// Replace a summary or scene text and recount it
    Set {
        file: PathBuf,
        /// Chapter number, starting at 1
        #[arg(long)]
        chapter: usize,
        /// Scene number, starting at 1; omit for the chapter summary
        #[arg(long)]
        scene: Option<usize>,
        #[arg(value_enum)]
        part: Part,
        text: String,
    },
    /// Recount stale token counts (or all with --all)
    Count {
        file: PathBuf,
        #[arg(long)]
        all: bool,
    },
    /// Generate the text of a scene
    GenerateScene {
        file: PathBuf,
        /// Chapter number, starting at 1
        #[arg(long)]
        chapter: usize,
        /// Scene number, starting at 1
        #[arg(long)]
        scene: usize,
        /// Backend to generate with
        #[arg(long)]
        llm: String,
        #[arg(long)]
        max_length: Option<u32>,
    },
    /// Summarize the previous chapter into this chapter's summary
    SummarizeChapter {
        file: PathBuf,
        /// Chapter number, starting at 2
        #[arg(long)]
        chapter: usize,
        #[arg(long)]
        llm: String,
        #[arg(long)]
        max_length: Option<u32>,
    },
    /// Export as plain text
    Export {
        file: PathBuf,
        /// Output path (defaults to the title next to the story file)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, PartialEq, Eq)]
enum Part {
    Summary,
    Text,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json);
    dotenvy::dotenv().ok();

    let mut config = AppConfig::load(&cli.config)
        .await
        .with_context(|| format!("Failed to load settings '{}'", cli.config.display()))?;
    if let Some(path) = cli.llm_config {
        config.llm_config = path;
    }

    let mut registry = BackendRegistry::load(&config.llm_config, config.client_settings()).await?;
    info!(
        path = %config.llm_config.display(),
        backends = registry.len(),
        "LLM configuration loaded"
    );

    match cli.command {
        Commands::Llm { action } => run_llm(action, &mut registry, &config.llm_config).await,
        Commands::Story { action } => run_story(action, &registry, &config).await,
    }
}

async fn run_llm(
    action: LlmAction,
    registry: &mut BackendRegistry,
    llm_config: &Path,
) -> anyhow::Result<()> {
    match action {
        LlmAction::List => {
            if registry.is_empty() {
                println!("No LLMs configured.");
                println!("Add one with `storywriter llm add-kobold` or `storywriter llm add-openai`");
                return Ok(());
            }
            let counter = registry.token_count_llm_name().unwrap_or_default();
            for config in registry.configs() {
                let marker = if config.name() == counter { " [token counter]" } else { "" };
                let address = match &config {
                    BackendConfig::OpenAi(c) => c.base_url().to_string(),
                    other => other.address().to_string(),
                };
                println!("  {} ({}) {address}{marker}", config.name(), config.kind());
            }
            println!("\nTotal: {} LLM(s)", registry.len());
        }
        LlmAction::Test { name } => {
            let results = match name {
                Some(name) => {
                    let backend = registry
                        .get(&name)
                        .with_context(|| format!("No LLM named '{name}'"))?;
                    vec![(name, backend.test_connection().await)]
                }
                None => registry.verify_all().await,
            };
            for (name, ok) in results {
                println!("  {name}: {}", if ok { "OK" } else { "FAILED" });
            }
        }
        LlmAction::AddKobold {
            name,
            address,
            system_prompt,
        } => {
            registry.add(BackendConfig::Kobold(KoboldConfig {
                name: name.clone(),
                address,
                system_prompt,
            }))?;
            registry.save(llm_config).await?;
            println!("Added {} LLM '{name}'", BackendKind::Kobold);
        }
        LlmAction::AddOpenai {
            name,
            address,
            api_key,
            use_env_var,
            model,
            system_prompt,
        } => {
            registry.add(BackendConfig::OpenAi(OpenAiConfig {
                name: name.clone(),
                address,
                api_key,
                system_prompt,
                use_env_var,
                model,
            }))?;
            registry.save(llm_config).await?;
            println!("Added {} LLM '{name}'", BackendKind::OpenAi);
        }
        LlmAction::Remove { name } => {
            if !registry.remove(&name) {
                anyhow::bail!("No LLM named '{name}'");
            }
            registry.save(llm_config).await?;
            println!("Removed '{name}'");
        }
        LlmAction::TokenCounter { name, clear } => {
            if clear {
                registry.set_token_count_llm_name(None);
                registry.save(llm_config).await?;
                println!("Token counter cleared");
            } else if let Some(name) = name {
                if registry.get(&name).is_none() {
                    anyhow::bail!("No LLM named '{name}'");
                }
                registry.set_token_count_llm_name(Some(name.clone()));
                registry.save(llm_config).await?;
                println!("Token counter set to '{name}'");
            } else {
                match registry.token_counter() {
                    Some(backend) => println!("{}", backend.name()),
                    None => println!("No token counter configured."),
                }
            }
        }
    }
    Ok(())
}

async fn run_story(
    action: StoryAction,
    registry: &BackendRegistry,
    config: &AppConfig,
) -> anyhow::Result<()> {
    match action {
        StoryAction::New {
            file,
            title,
            genre,
            summary,
        } => {
            if tokio::fs::try_exists(&file).await? {
                anyhow::bail!("'{}' already exists", file.display());
            }
            let mut story = Story::new(title);
            story.genre = genre;
            story.summary = summary;
            story.save(&file).await?;
            println!("Created {}", file.display());
        }
        StoryAction::Show { file } => {
            let story = Story::load(&file).await?;
            print!("{}", edit::outline(&story));
        }
        StoryAction::Edit { file, action } => {
            let mut story = Story::load(&file).await?;
            let modifies = action.modifies();
            let message = edit::apply(&mut story, action)?;
            if modifies {
                story.save(&file).await?;
            }
            println!("{message}");
        }
        StoryAction::Set {
            file,
            chapter,
            scene,
            part,
            text,
        } => {
            let chapter = index_arg("Chapter", chapter)?;
            let field = match (scene, part) {
                (None, Part::Summary) => StoryField::ChapterSummary { chapter },
                (None, Part::Text) => anyhow::bail!("Chapters have no text; pass --scene"),
                (Some(scene), Part::Summary) => StoryField::SceneSummary {
                    chapter,
                    scene: index_arg("Scene", scene)?,
                },
                (Some(scene), Part::Text) => StoryField::SceneText {
                    chapter,
                    scene: index_arg("Scene", scene)?,
                },
            };
            let mut session = StorySession::open(&file, registry.token_counter()).await?;
            session.set_text(field, text).await?;
            session.save().await?;
            print_field(session.story(), field);
        }
        StoryAction::Count { file, all } => {
            let mut session = StorySession::open(&file, registry.token_counter()).await?;
            let fields = if all {
                session.story().fields()
            } else {
                session.story().stale_fields()
            };
            let queued = session.recount(fields).await?;
            if queued > 0 {
                session.save().await?;
            }
            let story = session.story();
            println!(
                "Counted {queued} field(s); total {} tokens, {} field(s) unknown",
                story.total_tokens(),
                story.stale_fields().len()
            );
        }
        StoryAction::GenerateScene {
            file,
            chapter,
            scene,
            llm,
            max_length,
        } => {
            let chapter = index_arg("Chapter", chapter)?;
            let scene = index_arg("Scene", scene)?;
            let backend = registry
                .get(&llm)
                .with_context(|| format!("No LLM named '{llm}'"))?;

            let mut session = StorySession::open(&file, registry.token_counter()).await?;
            let prompt = session.story().scene_prompt(chapter, scene)?;
            let field = StoryField::SceneText { chapter, scene };
            session
                .generate(field, prompt, backend, max_length.unwrap_or(config.max_length))
                .await?;
            session.save().await?;
            print_field(session.story(), field);
        }
        StoryAction::SummarizeChapter {
            file,
            chapter,
            llm,
            max_length,
        } => {
            let chapter = index_arg("Chapter", chapter)?;
            let backend = registry
                .get(&llm)
                .with_context(|| format!("No LLM named '{llm}'"))?;

            let mut session = StorySession::open(&file, registry.token_counter()).await?;
            let prompt = session
                .story()
                .chapter_summary_prompt(chapter)?
                .context("The first chapter has no previous chapter to summarize")?;
            let field = StoryField::ChapterSummary { chapter };
            session
                .generate(field, prompt, backend, max_length.unwrap_or(config.max_length))
                .await?;
            session.save().await?;
            print_field(session.story(), field);
        }
        StoryAction::Export { file, out } => {
            let story = Story::load(&file).await?;
            let out = out.unwrap_or_else(|| {
                file.with_file_name(format!("{}.txt", story.file_stem()))
            });
            story.export(&out).await?;
            println!("Exported to {}", out.display());
        }
    }
    Ok(())
}

fn print_field(story: &Story, field: StoryField) {
    if let Some((text, tokens)) = story.field(field) {
        println!("{field} ({} tokens):\n\n{text}", format_tokens(tokens));
    }
}
