// src/core/structure.rs
use regex::{Captures, Regex};
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

use crate::error::{Result, WikiError};

/// How much wiki to ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WikiType {
    /// 8-12 pages grouped into sections
    #[default]
    Comprehensive,

    /// 4-6 pages, flat
    Concise,
}

impl WikiType {
    pub fn is_comprehensive(&self) -> bool {
        matches!(self, WikiType::Comprehensive)
    }

    pub fn page_range(&self) -> &'static str {
        match self {
            WikiType::Comprehensive => "8-12",
            WikiType::Concise => "4-6",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WikiType::Comprehensive => "comprehensive",
            WikiType::Concise => "concise",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    High,
    #[default]
    Medium,
    Low,
}

impl Importance {
    /// Unknown or empty text is treated as medium
    pub fn from_text(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "high" => Importance::High,
            "low" => Importance::Low,
            _ => Importance::Medium,
        }
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Importance::High => "high",
            Importance::Medium => "medium",
            Importance::Low => "low",
        };
        f.write_str(label)
    }
}

/// One proposed page of the wiki
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WikiPage {
    pub id: String,
    pub title: String,
    pub description: String,
    pub importance: Importance,

    /// Source files the page should be written from, in proposal order
    pub file_paths: Vec<String>,

    /// Ids of pages this one links to
    pub related_pages: Vec<String>,

    /// Owning section (comprehensive wikis only)
    pub parent_section: Option<String>,

    /// Generated Markdown, absent until content generation succeeds
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WikiSection {
    pub id: String,
    pub title: String,
    pub pages: Vec<String>,
    pub subsections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WikiStructure {
    pub title: String,
    pub description: String,
    pub sections: Vec<WikiSection>,
    pub pages: Vec<WikiPage>,
}

impl WikiStructure {
    /// Parse a structure-discovery response
    pub fn parse(raw: &str) -> Result<Self> {
        StructureParser::new().parse(raw)
    }

    pub fn page(&self, id: &str) -> Option<&WikiPage> {
        self.pages.iter().find(|p| p.id == id)
    }

    pub fn page_mut(&mut self, id: &str) -> Option<&mut WikiPage> {
        self.pages.iter_mut().find(|p| p.id == id)
    }
}

/// Turns the model's XML answer into a [`WikiStructure`]
pub struct StructureParser {
    /// Matches an entity/character reference or a lone ampersand
    ampersand_regex: Regex,

    /// Matches a response wrapped in a Markdown code fence
    fence_regex: Regex,
}

const ROOT_TAG: &str = "wiki_structure";

impl StructureParser {
    pub fn new() -> Self {
        Self {
            ampersand_regex: Regex::new(r"&(?:amp|lt|gt|quot|apos|#[0-9]+|#x[0-9A-Fa-f]+);|&")
                .expect("Invalid ampersand regex"),
            fence_regex: Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```$")
                .expect("Invalid fence regex"),
        }
    }

    /// Clean up a raw response so it has a chance of being well-formed XML.
    ///
    /// The `<wiki_structure>` element is cut out of any surrounding chatter,
    /// a wrapping code fence is removed, and every `&` that does not start a
    /// predefined entity or character reference is escaped.
    pub fn normalize(&self, raw: &str) -> String {
        let trimmed = raw.trim();

        let open_tag = format!("<{}", ROOT_TAG);
        let close_tag = format!("</{}>", ROOT_TAG);

        let body = match (trimmed.find(&open_tag), trimmed.rfind(&close_tag)) {
            (Some(start), Some(end)) if end > start => &trimmed[start..end + close_tag.len()],
            _ => self.fence_regex.captures(trimmed)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim())
                .unwrap_or(trimmed),
        };

        self.ampersand_regex
            .replace_all(body, |caps: &Captures| {
                if &caps[0] == "&" {
                    "&amp;".to_string()
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned()
    }

    pub fn parse(&self, raw: &str) -> Result<WikiStructure> {
        let normalized = self.normalize(raw);

        let document = Document::parse(&normalized).map_err(|e| WikiError::StructureParse {
            message: e.to_string(),
            raw: raw.to_string(),
        })?;

        let root = document.root_element();
        if !root.has_tag_name(ROOT_TAG) {
            return Err(WikiError::StructureParse {
                message: format!(
                    "expected <{}> root element, found <{}>",
                    ROOT_TAG,
                    root.tag_name().name()
                ),
                raw: raw.to_string(),
            });
        }

        let sections = root.descendants()
            .filter(|n| n.is_element() && n.has_tag_name("section"))
            .enumerate()
            .map(|(index, node)| parse_section(node, index))
            .collect();

        let page_nodes: Vec<Node> = root.descendants()
            .filter(|n| n.is_element() && n.has_tag_name("page"))
            .collect();

        let declared: HashSet<String> = page_nodes.iter()
            .filter_map(|node| declared_id(*node))
            .collect();
        let mut taken = HashSet::new();

        let pages = page_nodes.iter()
            .enumerate()
            .map(|(index, node)| {
                let id = match declared_id(*node) {
                    Some(id) => unique_id(&id, &declared, &mut taken),
                    None => positional_id(index + 1, &declared, &mut taken),
                };
                parse_page(*node, id)
            })
            .collect();

        Ok(WikiStructure {
            title: child_text(root, "title").unwrap_or_default(),
            description: child_text(root, "description").unwrap_or_default(),
            sections,
            pages,
        })
    }
}

impl Default for StructureParser {
    fn default() -> Self {
        Self::new()
    }
}

fn declared_id(node: Node) -> Option<String> {
    node.attribute("id")
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Keep a declared id, or the first free `id-N` when an earlier page has it
fn unique_id(wanted: &str, declared: &HashSet<String>, taken: &mut HashSet<String>) -> String {
    let mut candidate = wanted.to_string();
    let mut suffix = 1;
    while taken.contains(&candidate) || (candidate != wanted && declared.contains(&candidate)) {
        suffix += 1;
        candidate = format!("{}-{}", wanted, suffix);
    }

    if candidate != wanted {
        warn!("Page id '{}' is repeated, using '{}'", wanted, candidate);
    }
    taken.insert(candidate.clone());
    candidate
}

/// First `page-N` from `position` on that no page declares or already uses
fn positional_id(position: usize, declared: &HashSet<String>, taken: &mut HashSet<String>) -> String {
    let mut n = position;
    let mut candidate = format!("page-{}", n);
    while taken.contains(&candidate) || declared.contains(&candidate) {
        n += 1;
        candidate = format!("page-{}", n);
    }

    taken.insert(candidate.clone());
    candidate
}

fn parse_page(node: Node, id: String) -> WikiPage {
    let title = child_text(node, "title")
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| id.clone());

    WikiPage {
        title,
        description: child_text(node, "description").unwrap_or_default(),
        importance: child_text(node, "importance")
            .map(|text| Importance::from_text(&text))
            .unwrap_or_default(),
        file_paths: descendant_texts(node, "file_path"),
        related_pages: descendant_texts(node, "related"),
        parent_section: child_text(node, "parent_section").filter(|s| !s.is_empty()),
        content: None,
        id,
    }
}

fn parse_section(node: Node, index: usize) -> WikiSection {
    let id = node.attribute("id")
        .map(str::to_string)
        .unwrap_or_else(|| format!("section-{}", index + 1));

    WikiSection {
        title: child_text(node, "title").unwrap_or_else(|| id.clone()),
        pages: descendant_texts(node, "page_ref"),
        subsections: descendant_texts(node, "section_ref"),
        id,
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| c.is_element() && c.has_tag_name(name))
}

fn child_text(node: Node, name: &str) -> Option<String> {
    child(node, name).map(|c| c.text().unwrap_or_default().trim().to_string())
}

fn descendant_texts(node: Node, name: &str) -> Vec<String> {
    node.descendants()
        .filter(|n| n.is_element() && n.has_tag_name(name))
        .filter_map(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
