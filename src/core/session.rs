// src/core/session.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{Result, WikiError};
use super::structure::{WikiStructure, WikiType};

/// What the user asked for; reused by the content phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WikiSelection {
    pub repo_path: PathBuf,
    pub provider: String,
    pub model: String,
    pub wiki_type: WikiType,
    pub excluded_dirs: Vec<String>,
    pub excluded_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum SessionState {
    NoStructure,
    StructureRequested,
    StructureReady,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum PageStatus {
    Pending,
    ContentRequested,
    ContentReady,
    ContentFailed(String),
}

/// One user's generation session.
///
/// `NoStructure -> StructureRequested -> StructureReady`, after which each page
/// independently moves `Pending -> ContentRequested -> ContentReady` or
/// `ContentFailed`. Requesting a new structure discards the old one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiSession {
    pub selection: WikiSelection,
    pub state: SessionState,
    pub structure: Option<WikiStructure>,
    pub page_status: BTreeMap<String, PageStatus>,
    pub updated_at: DateTime<Utc>,
}

impl WikiSession {
    pub fn new(selection: WikiSelection) -> Self {
        Self {
            selection,
            state: SessionState::NoStructure,
            structure: None,
            page_status: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Start a structure request, dropping any previous structure
    pub fn request_structure(&mut self) {
        self.structure = None;
        self.page_status.clear();
        self.state = SessionState::StructureRequested;
        self.touch();
    }

    /// Attach a freshly parsed structure
    pub fn structure_ready(&mut self, structure: WikiStructure) -> Result<()> {
        if self.state != SessionState::StructureRequested {
            return Err(WikiError::State(format!(
                "structure arrived while session is {:?}",
                self.state
            )));
        }

        self.page_status = structure.pages.iter()
            .map(|page| {
                let status = if page.content.is_some() {
                    PageStatus::ContentReady
                } else {
                    PageStatus::Pending
                };
                (page.id.clone(), status)
            })
            .collect();
        self.structure = Some(structure);
        self.state = SessionState::StructureReady;
        self.touch();
        Ok(())
    }

    /// Return to `NoStructure` after a failed structure request
    pub fn structure_failed(&mut self) {
        self.structure = None;
        self.page_status.clear();
        self.state = SessionState::NoStructure;
        self.touch();
    }

    pub fn request_content(&mut self, page_id: &str) -> Result<()> {
        self.ensure_page(page_id)?;
        self.page_status.insert(page_id.to_string(), PageStatus::ContentRequested);
        self.touch();
        Ok(())
    }

    /// Attach generated content to a page
    pub fn content_ready(&mut self, page_id: &str, content: String) -> Result<()> {
        self.ensure_requested(page_id)?;

        let page = self.structure.as_mut()
            .and_then(|s| s.page_mut(page_id))
            .ok_or_else(|| WikiError::State(format!("unknown page '{}'", page_id)))?;
        page.content = Some(content);

        self.page_status.insert(page_id.to_string(), PageStatus::ContentReady);
        self.touch();
        Ok(())
    }

    /// Record a failed content request; the page keeps no content
    pub fn content_failed(&mut self, page_id: &str, reason: String) -> Result<()> {
        self.ensure_requested(page_id)?;

        if let Some(page) = self.structure.as_mut().and_then(|s| s.page_mut(page_id)) {
            page.content = None;
        }

        self.page_status.insert(page_id.to_string(), PageStatus::ContentFailed(reason));
        self.touch();
        Ok(())
    }

    pub fn status(&self, page_id: &str) -> Option<&PageStatus> {
        self.page_status.get(page_id)
    }

    pub fn structure(&self) -> Result<&WikiStructure> {
        match (&self.state, &self.structure) {
            (SessionState::StructureReady, Some(structure)) => Ok(structure),
            _ => Err(WikiError::State(
                "no wiki structure yet; generate the structure first".to_string(),
            )),
        }
    }

    fn ensure_page(&self, page_id: &str) -> Result<()> {
        let structure = self.structure()?;
        if structure.page(page_id).is_none() {
            return Err(WikiError::State(format!("unknown page '{}'", page_id)));
        }
        Ok(())
    }

    fn ensure_requested(&self, page_id: &str) -> Result<()> {
        match self.page_status.get(page_id) {
            Some(PageStatus::ContentRequested) => Ok(()),
            other => Err(WikiError::State(format!(
                "page '{}' has no pending content request ({:?})",
                page_id, other
            ))),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::structure::{Importance, WikiPage};

    fn selection() -> WikiSelection {
        WikiSelection {
            repo_path: PathBuf::from("/tmp/repo"),
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            wiki_type: WikiType::Concise,
            excluded_dirs: vec![],
            excluded_files: vec![],
        }
    }

    fn structure() -> WikiStructure {
        let page = |id: &str| WikiPage {
            id: id.to_string(),
            title: id.to_uppercase(),
            description: String::new(),
            importance: Importance::Medium,
            file_paths: vec![],
            related_pages: vec![],
            parent_section: None,
            content: None,
        };

        WikiStructure {
            title: "Wiki".to_string(),
            description: String::new(),
            sections: vec![],
            pages: vec![page("page-1"), page("page-2")],
        }
    }

    #[test]
    fn test_happy_path() {
        let mut session = WikiSession::new(selection());
        assert_eq!(session.state, SessionState::NoStructure);
        assert!(session.structure().is_err());

        session.request_structure();
        session.structure_ready(structure()).unwrap();
        assert_eq!(session.status("page-1"), Some(&PageStatus::Pending));

        session.request_content("page-1").unwrap();
        session.content_ready("page-1", "# Page 1".to_string()).unwrap();
        session.request_content("page-2").unwrap();
        session.content_failed("page-2", "API error 500".to_string()).unwrap();

        let structure = session.structure().unwrap();
        assert_eq!(structure.pages[0].content.as_deref(), Some("# Page 1"));
        assert!(structure.pages[1].content.is_none());
        assert!(matches!(session.status("page-2"), Some(PageStatus::ContentFailed(_))));
    }

    #[test]
    fn test_content_before_structure_is_rejected() {
        let mut session = WikiSession::new(selection());
        assert!(matches!(session.request_content("page-1"), Err(WikiError::State(_))));
    }

    #[test]
    fn test_content_requires_a_request() {
        let mut session = WikiSession::new(selection());
        session.request_structure();
        session.structure_ready(structure()).unwrap();

        assert!(session.content_ready("page-1", "x".to_string()).is_err());
        assert!(session.request_content("page-9").is_err());
    }

    #[test]
    fn test_new_structure_request_discards_old() {
        let mut session = WikiSession::new(selection());
        session.request_structure();
        session.structure_ready(structure()).unwrap();

        session.request_structure();
        assert!(session.structure.is_none());
        assert!(session.page_status.is_empty());

        session.structure_failed();
        assert_eq!(session.state, SessionState::NoStructure);
    }
}
