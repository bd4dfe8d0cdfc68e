use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::{set_api_key, SUPPORTED_PROVIDER};
use crate::core::llm::{Backend, DEFAULT_SERVICE_URL};
use crate::core::{ContentReport, Engine, PageStatus, WikiSelection, WikiSession, WikiType};

#[derive(Parser)]
#[command(name = "repowiki")]
#[command(about = "Generate a browsable wiki for a local source repository")]
#[command(version)]
pub struct Cli {
    /// Directory holding generator.json, embedder.json and repo.json
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Base URL of the chat completion service
    #[arg(long, global = true, default_value = DEFAULT_SERVICE_URL)]
    pub api_url: String,

    /// Call the provider API directly instead of the completion service
    #[arg(long, global = true)]
    pub direct: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// What to document and with which model
#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    /// Repository to document
    #[arg(short, long, default_value = ".")]
    pub repo: PathBuf,

    /// Model provider
    #[arg(long, default_value = SUPPORTED_PROVIDER)]
    pub provider: String,

    /// Model name (defaults to the provider's default model)
    #[arg(short, long)]
    pub model: Option<String>,

    #[arg(long, value_enum, default_value = "comprehensive")]
    pub wiki_type: WikiType,

    /// API key, exported as OPENAI_API_KEY
    #[arg(long)]
    pub api_key: Option<String>,

    /// Exclude paths containing this text (repeatable)
    #[arg(long = "exclude-dir")]
    pub exclude_dirs: Vec<String>,

    /// Exclude files matching this pattern (repeatable)
    #[arg(long = "exclude-file")]
    pub exclude_files: Vec<String>,

    /// File with one excluded directory per line
    #[arg(long)]
    pub exclude_dirs_file: Option<PathBuf>,

    /// File with one excluded file pattern per line
    #[arg(long)]
    pub exclude_files_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask the model for a wiki structure
    Structure {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Generate content for every page of the saved structure
    Content {
        /// Repository whose saved structure to use
        #[arg(short, long, default_value = ".")]
        repo: PathBuf,

        /// API key, exported as OPENAI_API_KEY
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Structure followed by content
    Generate {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Write an HTML preview of the generated wiki
    Preview {
        #[arg(short, long, default_value = ".")]
        repo: PathBuf,
    },

    /// Show the resolved model configuration
    ModelConfig {
        #[arg(long, default_value = SUPPORTED_PROVIDER)]
        provider: String,

        #[arg(short, long)]
        model: Option<String>,

        /// Print the full merged configuration instead
        #[arg(long)]
        all: bool,
    },
}

impl Cli {
    pub fn backend(&self) -> Backend {
        if self.direct {
            Backend::Direct
        } else {
            Backend::Service {
                base_url: self.api_url.clone(),
            }
        }
    }

    /// Export a key given on the command line before anything reads it
    pub fn export_api_key(&self) {
        let key = match &self.command {
            Commands::Structure { selection } | Commands::Generate { selection } => selection.api_key.as_deref(),
            Commands::Content { api_key, .. } => api_key.as_deref(),
            _ => None,
        };

        if let Some(key) = key {
            set_api_key(key);
        }
    }

    pub async fn execute(self, engine: Engine) -> Result<()> {
        match self.command {
            Commands::Structure { selection } => {
                let session = engine.generate_structure(selection.into_selection()?).await?;
                print_structure(&session)
            }
            Commands::Content { repo, .. } => {
                let mut session = engine.load_session(&repo)?;
                let report = engine.generate_content(&mut session).await?;
                print_report(&report)
            }
            Commands::Generate { selection } => {
                let (session, report) = engine.generate(selection.into_selection()?).await?;
                print_structure(&session)?;
                print_report(&report)
            }
            Commands::Preview { repo } => {
                let path = engine.preview(&repo)?;
                println!("Preview written to {}", path.display());
                Ok(())
            }
            Commands::ModelConfig { provider, model, all } => {
                let json = if all {
                    serde_json::to_string_pretty(engine.settings())?
                } else {
                    serde_json::to_string_pretty(&engine.show_model_config(&provider, model.as_deref())?)?
                };
                println!("{}", json);
                Ok(())
            }
        }
    }
}

impl SelectionArgs {
    pub fn into_selection(self) -> Result<WikiSelection> {
        let mut excluded_dirs = self.exclude_dirs;
        if let Some(path) = &self.exclude_dirs_file {
            excluded_dirs.extend(read_list(path)?);
        }

        let mut excluded_files = self.exclude_files;
        if let Some(path) = &self.exclude_files_file {
            excluded_files.extend(read_list(path)?);
        }

        Ok(WikiSelection {
            repo_path: self.repo,
            provider: self.provider,
            model: self.model.unwrap_or_default(),
            wiki_type: self.wiki_type,
            excluded_dirs,
            excluded_files,
        })
    }
}

/// Newline-separated list, blank lines dropped
fn read_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read exclusion list {}", path.display()))?;

    Ok(content.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn print_structure(session: &WikiSession) -> Result<()> {
    let structure = session.structure()?;

    println!("{}", structure.title);
    if !structure.description.is_empty() {
        println!("{}", structure.description);
    }
    println!();

    for page in &structure.pages {
        let marker = match session.status(&page.id) {
            Some(PageStatus::ContentReady) => "✓",
            Some(PageStatus::ContentFailed(_)) => "✗",
            _ => " ",
        };
        println!("{} {:<24} {} ({})", marker, page.id, page.title, page.importance);
    }

    Ok(())
}

fn print_report(report: &ContentReport) -> Result<()> {
    println!();
    println!("{} pages generated", report.generated.len());

    for failure in &report.failed {
        println!("✗ {}: {}", failure.page_id, failure.reason);
    }
    for failure in &report.persist_failures {
        println!("✗ {} (not written): {}", failure.page_id, failure.reason);
    }

    if !report.is_complete() {
        bail!(
            "{} pages failed, {} could not be written",
            report.failed.len(),
            report.persist_failures.len()
        );
    }

    Ok(())
}
