// src/core/render.rs
use regex::Regex;
use serde::Serialize;
use tera::{Context, Tera};
use tracing::warn;

use crate::error::{Result, WikiError};
use super::structure::{WikiPage, WikiStructure};

const PREVIEW_TEMPLATE: &str = "preview.html";

/// Diagram keywords a Mermaid block may start with
const MERMAID_KINDS: &[&str] = &[
    "graph", "flowchart", "sequenceDiagram", "classDiagram", "erDiagram",
    "stateDiagram", "stateDiagram-v2", "gantt", "pie", "journey",
    "mindmap", "timeline", "gitGraph",
];

/// A piece of page content, in document order
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Markdown(String),
    Diagram(String),
}

/// A segment after rendering
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedBlock {
    Markdown(String),

    /// Rendered diagram markup
    Diagram(String),

    /// A diagram that could not be rendered, shown as its source
    RawCode { language: String, source: String },
}

/// External collaborator that draws a diagram from its source
pub trait DiagramRenderer {
    fn render(&self, source: &str) -> Result<String>;
}

/// Emits Mermaid blocks for client-side rendering by mermaid.js
pub struct MermaidHtmlRenderer;

impl DiagramRenderer for MermaidHtmlRenderer {
    fn render(&self, source: &str) -> Result<String> {
        let kind = diagram_kind(source)
            .ok_or_else(|| WikiError::Render("empty diagram".to_string()))?;

        if !MERMAID_KINDS.contains(&kind) {
            return Err(WikiError::Render(format!("unknown diagram type '{}'", kind)));
        }

        Ok(format!("<pre class=\"mermaid\">{}</pre>", tera::escape_html(source)))
    }
}

/// First keyword of the diagram, skipping blank lines and `%%` comments
fn diagram_kind(source: &str) -> Option<&str> {
    source.lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with("%%"))
        .and_then(|line| line.split_whitespace().next())
}

/// Splits Markdown around fenced Mermaid blocks
pub struct ContentSplitter {
    mermaid_regex: Regex,
}

impl ContentSplitter {
    pub fn new() -> Self {
        Self {
            mermaid_regex: Regex::new(r"(?s)```mermaid\r?\n(.*?)\r?\n```")
                .expect("Invalid mermaid block regex"),
        }
    }

    /// Alternate Markdown and diagram segments.
    ///
    /// There is always one more Markdown segment than there are diagrams; some
    /// of them may be empty.
    pub fn split(&self, content: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut last = 0;

        for caps in self.mermaid_regex.captures_iter(content) {
            let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            segments.push(Segment::Markdown(content[last..whole.start()].to_string()));
            segments.push(Segment::Diagram(body.as_str().to_string()));
            last = whole.end();
        }

        segments.push(Segment::Markdown(content[last..].to_string()));
        segments
    }

    /// Render every segment; diagrams that fail fall back to raw code
    pub fn render(&self, content: &str, renderer: &dyn DiagramRenderer) -> Vec<RenderedBlock> {
        self.split(content)
            .into_iter()
            .map(|segment| match segment {
                Segment::Markdown(text) => RenderedBlock::Markdown(text),
                Segment::Diagram(source) => match renderer.render(&source) {
                    Ok(markup) => RenderedBlock::Diagram(markup),
                    Err(e) => {
                        warn!("Could not render diagram: {}", e);
                        RenderedBlock::RawCode {
                            language: "mermaid".to_string(),
                            source,
                        }
                    }
                },
            })
            .collect()
    }
}

impl Default for ContentSplitter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct PreviewBlock {
    kind: &'static str,
    text: String,
}

#[derive(Serialize)]
struct PreviewPage {
    id: String,
    title: String,
    importance: String,
    has_content: bool,
    blocks: Vec<PreviewBlock>,
}

/// Builds a standalone HTML page showing every wiki page
pub struct PreviewBuilder {
    tera: Tera,
    splitter: ContentSplitter,
}

impl PreviewBuilder {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(PREVIEW_TEMPLATE, include_str!("../../templates/preview.html"))?;

        Ok(Self {
            tera,
            splitter: ContentSplitter::new(),
        })
    }

    pub fn build(&self, structure: &WikiStructure, renderer: &dyn DiagramRenderer) -> Result<String> {
        let pages: Vec<PreviewPage> = structure.pages.iter()
            .map(|page| self.preview_page(page, renderer))
            .collect();

        let mut context = Context::new();
        context.insert("title", &structure.title);
        context.insert("description", &structure.description);
        context.insert("pages", &pages);

        Ok(self.tera.render(PREVIEW_TEMPLATE, &context)?)
    }

    fn preview_page(&self, page: &WikiPage, renderer: &dyn DiagramRenderer) -> PreviewPage {
        let blocks = page.content.as_deref()
            .map(|content| {
                self.splitter.render(content, renderer)
                    .into_iter()
                    .map(|block| match block {
                        RenderedBlock::Markdown(text) => PreviewBlock { kind: "markdown", text },
                        RenderedBlock::Diagram(text) => PreviewBlock { kind: "diagram", text },
                        RenderedBlock::RawCode { source, .. } => PreviewBlock { kind: "raw", text: source },
                    })
                    .collect()
            })
            .unwrap_or_default();

        PreviewPage {
            id: page.id.clone(),
            title: page.title.clone(),
            importance: page.importance.to_string().to_uppercase(),
            has_content: page.content.is_some(),
            blocks,
        }
    }
}
