// src/core/prompts.rs
use serde::Serialize;
use tera::{Context, Tera};

use crate::error::Result;
use super::structure::{WikiPage, WikiType};

const STRUCTURE_TEMPLATE: &str = "structure.prompt";
const CONTENT_TEMPLATE: &str = "content.prompt";

/// Pages should cite at least this many distinct source files
pub const MIN_SOURCE_FILES: usize = 5;

/// Everything the structure-discovery prompt is built from
#[derive(Debug, Clone, Serialize)]
pub struct StructurePromptContext {
    pub owner: String,
    pub name: String,
    pub file_tree: Vec<String>,
    pub readme: String,
    pub wiki_type: WikiType,
}

/// Renders the two prompt kinds from the embedded templates
pub struct PromptBuilder {
    tera: Tera,
}

impl PromptBuilder {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (STRUCTURE_TEMPLATE, include_str!("../../templates/structure.prompt")),
            (CONTENT_TEMPLATE, include_str!("../../templates/content.prompt")),
        ])?;

        Ok(Self { tera })
    }

    /// Prompt asking for a wiki structure as XML
    pub fn structure_prompt(&self, ctx: &StructurePromptContext) -> Result<String> {
        let mut context = Context::new();
        context.insert("owner", &ctx.owner);
        context.insert("name", &ctx.name);
        context.insert("file_tree", &ctx.file_tree.join("\n"));
        context.insert("readme", &ctx.readme);
        context.insert("comprehensive", &ctx.wiki_type.is_comprehensive());
        context.insert("page_range", ctx.wiki_type.page_range());
        context.insert("wiki_type", ctx.wiki_type.label());

        Ok(self.tera.render(STRUCTURE_TEMPLATE, &context)?)
    }

    /// Prompt asking for the Markdown body of one page
    pub fn content_prompt(&self, page: &WikiPage) -> Result<String> {
        let mut context = Context::new();
        context.insert("title", &page.title);
        context.insert("description", &page.description);
        context.insert("file_paths", &page.file_paths);
        context.insert("related_pages", &page.related_pages);
        context.insert("min_files", &MIN_SOURCE_FILES);
        context.insert("needs_padding", &(page.file_paths.len() < MIN_SOURCE_FILES));

        Ok(self.tera.render(CONTENT_TEMPLATE, &context)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::structure::Importance;

    fn page(files: &[&str]) -> WikiPage {
        WikiPage {
            id: "page-1".to_string(),
            title: "Request Pipeline".to_string(),
            description: "How requests flow".to_string(),
            importance: Importance::High,
            file_paths: files.iter().map(|f| f.to_string()).collect(),
            related_pages: vec!["page-2".to_string()],
            parent_section: None,
            content: None,
        }
    }

    fn structure_context(wiki_type: WikiType) -> StructurePromptContext {
        StructurePromptContext {
            owner: "acme".to_string(),
            name: "widget".to_string(),
            file_tree: vec!["src/main.rs".to_string(), "Cargo.toml".to_string()],
            readme: "# Widget\nMakes widgets.".to_string(),
            wiki_type,
        }
    }

    #[test]
    fn test_comprehensive_structure_prompt() {
        let builder = PromptBuilder::new().unwrap();
        let prompt = builder.structure_prompt(&structure_context(WikiType::Comprehensive)).unwrap();

        assert!(prompt.starts_with("Analyze this GitHub repository acme/widget"));
        assert!(prompt.contains("<file_tree>\nsrc/main.rs\nCargo.toml\n</file_tree>"));
        assert!(prompt.contains("<readme>\n# Widget\nMakes widgets.\n</readme>"));
        assert!(prompt.contains("<sections>"));
        assert!(prompt.contains("<parent_section>section-1</parent_section>"));
        assert!(prompt.contains("Create 8-12 pages that would make a comprehensive wiki"));
    }

    #[test]
    fn test_concise_structure_prompt() {
        let builder = PromptBuilder::new().unwrap();
        let prompt = builder.structure_prompt(&structure_context(WikiType::Concise)).unwrap();

        assert!(!prompt.contains("<sections>"));
        assert!(prompt.contains("<wiki_structure>"));
        assert!(prompt.contains("Create 4-6 pages that would make a concise wiki"));
        assert!(prompt.contains("Start directly with <wiki_structure>"));
    }

    #[test]
    fn test_content_prompt_lists_files_and_pads() {
        let builder = PromptBuilder::new().unwrap();
        let prompt = builder.content_prompt(&page(&["src/a.rs", "src/b.rs"])).unwrap();

        assert!(prompt.contains("- [src/a.rs](src/a.rs)\n- [src/b.rs](src/b.rs)\n"));
        assert!(prompt.contains("<!-- Add additional relevant files if fewer than 5 were provided -->"));
        assert!(prompt.contains("`# Request Pipeline`"));
        assert!(prompt.contains("Sources: [filename.ext:start_line-end_line]()"));
        assert!(prompt.contains("NEVER use \"graph LR\""));
        assert!(prompt.contains("Related pages in this wiki: page-2."));
    }

    #[test]
    fn test_content_prompt_without_padding() {
        let builder = PromptBuilder::new().unwrap();
        let files = ["a.rs", "b.rs", "c.rs", "d.rs", "e.rs"];
        let prompt = builder.content_prompt(&page(&files)).unwrap();

        assert!(!prompt.contains("Add additional relevant files"));
        assert!(prompt.contains("- [e.rs](e.rs)\n</details>"));
    }
}
