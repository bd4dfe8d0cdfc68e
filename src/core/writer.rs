// src/core/writer.rs
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Result, WikiError};
use super::session::WikiSession;

/// Directory under the repository root that receives generated pages
pub const OUTPUT_DIR: &str = "wiki_output";

const SESSION_FILE: &str = "wiki_structure.json";

/// Persists generated pages and the session next to the repository
pub struct WikiWriter {
    output_dir: PathBuf,
}

impl WikiWriter {
    pub fn new<P: AsRef<Path>>(repo_root: P) -> Self {
        Self {
            output_dir: repo_root.as_ref().join(OUTPUT_DIR),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn page_path(&self, page_id: &str) -> PathBuf {
        self.output_dir.join(format!("{}.md", file_stem(page_id)))
    }

    /// Write a page's Markdown exactly as received
    pub fn write_page(&self, page_id: &str, content: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.page_path(page_id);
        std::fs::write(&path, content.as_bytes())?;
        debug!("Wrote {} bytes to {}", content.len(), path.display());
        Ok(path)
    }

    pub fn read_page(&self, page_id: &str) -> Result<String> {
        Ok(std::fs::read_to_string(self.page_path(page_id))?)
    }

    pub fn write_file(&self, name: &str, content: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(name);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    pub fn save_session(&self, session: &WikiSession) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(session)?;
        self.write_file(SESSION_FILE, &json)
    }

    pub fn load_session(&self) -> Result<WikiSession> {
        let path = self.output_dir.join(SESSION_FILE);
        if !path.exists() {
            return Err(WikiError::State(format!(
                "no saved wiki structure at {}; run the structure step first",
                path.display()
            )));
        }

        let json = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Page ids come from the model; keep them inside the output directory
fn file_stem(page_id: &str) -> String {
    let stem: String = page_id.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '-' })
        .collect();

    let stem = stem.trim_matches('.');
    if stem.is_empty() {
        "page".to_string()
    } else {
        stem.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::WikiSelection;
    use crate::core::structure::WikiType;
    use tempfile::TempDir;

    #[test]
    fn test_page_round_trip_is_exact() {
        let dir = TempDir::new().unwrap();
        let writer = WikiWriter::new(dir.path());
        let content = "<details>\n<summary>Relevant source files</summary>\n</details>\n\n# Über → 🚀\r\n\n```mermaid\ngraph TD\n  A-->B\n```\n";

        let path = writer.write_page("page-1", content).unwrap();
        assert_eq!(path, dir.path().join("wiki_output").join("page-1.md"));
        assert_eq!(writer.read_page("page-1").unwrap(), content);
    }

    #[test]
    fn test_page_ids_cannot_escape_output_dir() {
        let writer = WikiWriter::new("/repo");
        assert_eq!(writer.page_path("../../etc/passwd"), PathBuf::from("/repo/wiki_output/-..-etc-passwd.md"));
        assert_eq!(writer.page_path("..."), PathBuf::from("/repo/wiki_output/page.md"));
        assert_eq!(writer.page_path("page 2"), PathBuf::from("/repo/wiki_output/page-2.md"));
    }

    #[test]
    fn test_session_round_trip() {
        let dir = TempDir::new().unwrap();
        let writer = WikiWriter::new(dir.path());
        assert!(writer.load_session().is_err());

        let session = WikiSession::new(WikiSelection {
            repo_path: dir.path().to_path_buf(),
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            wiki_type: WikiType::Comprehensive,
            excluded_dirs: vec![".git".to_string()],
            excluded_files: vec![],
        });
        writer.save_session(&session).unwrap();

        let loaded = writer.load_session().unwrap();
        assert_eq!(loaded.selection, session.selection);
        assert_eq!(loaded.state, session.state);
    }
}
