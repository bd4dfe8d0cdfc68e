// src/core/engine.rs
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{ResolvedModelConfig, Settings, SUPPORTED_PROVIDER};
use crate::error::{Result, WikiError};
use super::llm::{create_client, Backend, CompletionClient, CompletionRequest};
use super::prompts::{PromptBuilder, StructurePromptContext};
use super::render::{MermaidHtmlRenderer, PreviewBuilder};
use super::scanner::RepoScanner;
use super::session::{WikiSelection, WikiSession};
use super::structure::{StructureParser, WikiPage, WikiStructure};
use super::writer::WikiWriter;

const PREVIEW_FILE: &str = "preview.html";

/// A page that did not make it all the way to disk
#[derive(Debug, Clone, PartialEq)]
pub struct PageFailure {
    pub page_id: String,
    pub reason: String,
}

/// Outcome of one content generation run
#[derive(Debug, Default)]
pub struct ContentReport {
    /// Pages whose content was generated and written
    pub generated: Vec<String>,

    /// Pages left without content
    pub failed: Vec<PageFailure>,

    /// Pages with content that could not be written to disk
    pub persist_failures: Vec<PageFailure>,
}

impl ContentReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.persist_failures.is_empty()
    }
}

/// Drives structure discovery and content generation for a repository
pub struct Engine {
    settings: Settings,
    backend: Backend,

    /// Overrides the backend when set
    client: Option<Arc<dyn CompletionClient>>,

    scanner: RepoScanner,
    prompts: PromptBuilder,
    parser: StructureParser,
}

impl Engine {
    pub fn new(settings: Settings, backend: Backend) -> Result<Self> {
        debug!("Loaded configuration from {}", settings.config_dir.display());

        Ok(Self {
            settings,
            backend,
            client: None,
            scanner: RepoScanner::new(),
            prompts: PromptBuilder::new()?,
            parser: StructureParser::new(),
        })
    }

    /// Engine that sends every request to `client`
    pub fn with_client(settings: Settings, client: Arc<dyn CompletionClient>) -> Result<Self> {
        let mut engine = Self::new(settings, Backend::Direct)?;
        engine.client = Some(client);
        Ok(engine)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Fill in the default model and default exclusions.
    ///
    /// Configured exclusions apply only when the caller supplied none of either
    /// kind.
    pub fn resolve_selection(&self, mut selection: WikiSelection) -> Result<(WikiSelection, ResolvedModelConfig)> {
        let model = Some(selection.model.as_str()).filter(|m| !m.trim().is_empty());
        let model_config = self.settings.get_model_config(&selection.provider, model)?;

        selection.provider = SUPPORTED_PROVIDER.to_string();
        selection.model = model_config.model.clone();

        if selection.excluded_dirs.is_empty() && selection.excluded_files.is_empty() {
            selection.excluded_dirs = self.settings.default_excluded_dirs();
            selection.excluded_files = self.settings.default_excluded_files();
        }

        Ok((selection, model_config))
    }

    /// Ask the model for a wiki structure and save it as a fresh session
    pub async fn generate_structure(&self, selection: WikiSelection) -> Result<WikiSession> {
        if !selection.repo_path.is_dir() {
            return Err(WikiError::FileSystem(format!(
                "Repository path does not exist: {}",
                selection.repo_path.display()
            )));
        }

        let (selection, model_config) = self.resolve_selection(selection)?;
        let client = self.client_for(&model_config)?;

        info!(
            "Generating {} wiki structure for {} with {} ({})",
            selection.wiki_type.label(),
            selection.repo_path.display(),
            selection.model,
            client.name()
        );

        let mut session = WikiSession::new(selection);
        session.request_structure();

        match self.request_structure(client.as_ref(), &session.selection).await {
            Ok(structure) => {
                info!("Wiki structure '{}' has {} pages", structure.title, structure.pages.len());
                session.structure_ready(structure)?;
            }
            Err(e) => {
                session.structure_failed();
                return Err(e);
            }
        }

        let path = WikiWriter::new(&session.selection.repo_path).save_session(&session)?;
        info!("Saved wiki structure to {}", path.display());

        Ok(session)
    }

    async fn request_structure(
        &self,
        client: &dyn CompletionClient,
        selection: &WikiSelection,
    ) -> Result<WikiStructure> {
        let root = &selection.repo_path;
        let file_tree = self.scanner.file_tree(root, &selection.excluded_dirs)?;
        let (owner, name) = self.scanner.repo_identity(root);
        debug!("Scanned {} files in {}/{}", file_tree.len(), owner, name);

        let prompt = self.prompts.structure_prompt(&StructurePromptContext {
            owner,
            name,
            file_tree,
            readme: self.scanner.read_readme(root),
            wiki_type: selection.wiki_type,
        })?;

        let raw = client.complete(&request_for(selection, prompt)).await?;

        self.parser.parse(&raw).map_err(|e| {
            error!("{}\nRaw response:\n{}", e, raw);
            e
        })
    }

    /// Generate content for every page, in structure order.
    ///
    /// A page that fails is marked as such and left without content; the
    /// remaining pages are still attempted.
    pub async fn generate_content(&self, session: &mut WikiSession) -> Result<ContentReport> {
        let pages: Vec<WikiPage> = session.structure()?.pages.clone();
        let selection = session.selection.clone();

        let (_, model_config) = self.resolve_selection(selection.clone())?;
        let client = self.client_for(&model_config)?;
        let writer = WikiWriter::new(&selection.repo_path);

        let mut report = ContentReport::default();

        for (index, page) in pages.iter().enumerate() {
            info!("[{}/{}] Generating content for '{}'", index + 1, pages.len(), page.title);
            session.request_content(&page.id)?;

            let content = match self.request_content(client.as_ref(), &selection, page).await {
                Ok(content) => content,
                Err(e) => {
                    error!("Content generation failed for '{}': {}", page.id, e);
                    session.content_failed(&page.id, e.to_string())?;
                    report.failed.push(PageFailure {
                        page_id: page.id.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match writer.write_page(&page.id, &content) {
                Ok(path) => {
                    info!("Wrote {}", path.display());
                    report.generated.push(page.id.clone());
                }
                Err(e) => {
                    error!("Could not write content for '{}': {}", page.id, e);
                    report.persist_failures.push(PageFailure {
                        page_id: page.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }

            session.content_ready(&page.id, content)?;
        }

        if let Err(e) = writer.save_session(session) {
            error!("Could not save wiki session: {}", e);
        }

        info!(
            "Content generation finished: {} generated, {} failed, {} not written",
            report.generated.len(),
            report.failed.len(),
            report.persist_failures.len()
        );

        Ok(report)
    }

    async fn request_content(
        &self,
        client: &dyn CompletionClient,
        selection: &WikiSelection,
        page: &WikiPage,
    ) -> Result<String> {
        let prompt = self.prompts.content_prompt(page)?;
        client.complete(&request_for(selection, prompt)).await
    }

    /// Structure discovery followed by content generation
    pub async fn generate(&self, selection: WikiSelection) -> Result<(WikiSession, ContentReport)> {
        let mut session = self.generate_structure(selection).await?;
        let report = self.generate_content(&mut session).await?;
        Ok((session, report))
    }

    /// Session saved by an earlier structure run
    pub fn load_session(&self, repo_root: &Path) -> Result<WikiSession> {
        WikiWriter::new(repo_root).load_session()
    }

    /// Write an HTML preview of the saved wiki.
    ///
    /// Pages without content in the session fall back to their Markdown file
    /// when one exists.
    pub fn preview(&self, repo_root: &Path) -> Result<PathBuf> {
        let writer = WikiWriter::new(repo_root);
        let session = writer.load_session()?;
        let mut structure = session.structure()?.clone();

        for page in structure.pages.iter_mut().filter(|p| p.content.is_none()) {
            match writer.read_page(&page.id) {
                Ok(content) => page.content = Some(content),
                Err(_) => debug!("No content on disk for '{}'", page.id),
            }
        }

        let html = PreviewBuilder::new()?.build(&structure, &MermaidHtmlRenderer)?;
        let path = writer.write_file(PREVIEW_FILE, &html)?;
        info!("Wrote preview to {}", path.display());
        Ok(path)
    }

    pub fn show_model_config(&self, provider: &str, model: Option<&str>) -> Result<ResolvedModelConfig> {
        self.settings.get_model_config(provider, model)
    }

    fn client_for(&self, model_config: &ResolvedModelConfig) -> Result<Arc<dyn CompletionClient>> {
        if let Some(client) = &self.client {
            return Ok(Arc::clone(client));
        }

        if matches!(self.backend, Backend::Direct) && model_config.parameters.is_empty() {
            warn!("No parameters configured for model {}", model_config.model);
        }

        Ok(Arc::from(create_client(&self.backend, model_config)?))
    }
}

fn request_for(selection: &WikiSelection, prompt: String) -> CompletionRequest {
    CompletionRequest::for_local_repo(
        &selection.repo_path,
        &selection.provider,
        &selection.model,
        &selection.excluded_dirs,
        &selection.excluded_files,
        prompt,
    )
}
