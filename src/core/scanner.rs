// src/core/scanner.rs
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Result, WikiError};

/// Walks a local repository and collects the context the structure prompt needs
pub struct RepoScanner;

impl RepoScanner {
    pub fn new() -> Self {
        Self
    }

    /// List every file under `root` as a `/`-separated path relative to `root`.
    ///
    /// A path is skipped when its relative form contains any of the excluded
    /// substrings. Matching is plain substring containment, so `.git` also hides
    /// `.github/` and `.gitignore`.
    pub fn file_tree<P: AsRef<Path>>(&self, root: P, excluded_dirs: &[String]) -> Result<Vec<String>> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(WikiError::FileSystem(format!(
                "Repository path is not a directory: {}",
                root.display()
            )));
        }

        let excluded: Vec<&str> = excluded_dirs.iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();

        let mut files = Vec::new();

        for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            // Symlinked files count; symlinked directories are not descended
            if !entry.path().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let relative = relative_display(relative);

            if excluded.iter().any(|pattern| relative.contains(pattern)) {
                continue;
            }

            files.push(relative);
        }

        files.sort();
        debug!("Collected {} files from {}", files.len(), root.display());
        Ok(files)
    }

    /// Root-level `README.md`, or an empty string when absent or unreadable
    pub fn read_readme<P: AsRef<Path>>(&self, root: P) -> String {
        let readme_path = root.as_ref().join("README.md");
        if !readme_path.exists() {
            debug!("No README.md in {}", root.as_ref().display());
            return String::new();
        }

        match std::fs::read_to_string(&readme_path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Could not read {}: {}", readme_path.display(), e);
                String::new()
            }
        }
    }

    /// Owner and name of the repository, taken from the last two path segments
    pub fn repo_identity<P: AsRef<Path>>(&self, root: P) -> (String, String) {
        let normalized = normalize_path(root.as_ref());

        let name = normalized.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let owner = normalized.parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        (owner, name)
    }
}

impl Default for RepoScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn relative_display(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Lexically drop `.` segments, resolve `..` and trailing separators
fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "x").unwrap();
    }

    #[test]
    fn test_file_tree_skips_excluded_substrings() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.py");
        touch(dir.path(), "b/c.py");
        touch(dir.path(), "b/.git/x");

        let scanner = RepoScanner::new();
        let files = scanner.file_tree(dir.path(), &[".git".to_string()]).unwrap();

        assert_eq!(files, vec!["a.py".to_string(), "b/c.py".to_string()]);
    }

    #[test]
    fn test_file_tree_ignores_blank_exclusions() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/main.rs");
        touch(dir.path(), "Cargo.toml");

        let scanner = RepoScanner::new();
        let files = scanner.file_tree(dir.path(), &["".to_string(), "  ".to_string()]).unwrap();

        assert_eq!(files.len(), 2);
        assert!(files.contains(&"src/main.rs".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_tree_includes_symlinked_files() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        touch(outside.path(), "shared/util.py");
        touch(dir.path(), "main.py");

        std::os::unix::fs::symlink(outside.path().join("shared/util.py"), dir.path().join("util.py")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("shared"), dir.path().join("shared")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing.py"), dir.path().join("dangling.py")).unwrap();

        let files = RepoScanner::new().file_tree(dir.path(), &[]).unwrap();
        assert_eq!(files, vec!["main.py".to_string(), "util.py".to_string()]);
    }

    #[test]
    fn test_file_tree_rejects_missing_root() {
        let dir = TempDir::new().unwrap();
        let scanner = RepoScanner::new();
        assert!(scanner.file_tree(dir.path().join("nope"), &[]).is_err());
    }

    #[test]
    fn test_read_readme() {
        let dir = TempDir::new().unwrap();
        let scanner = RepoScanner::new();
        assert_eq!(scanner.read_readme(dir.path()), "");

        std::fs::write(dir.path().join("README.md"), "# Hello\n").unwrap();
        assert_eq!(scanner.read_readme(dir.path()), "# Hello\n");
    }

    #[test]
    fn test_repo_identity() {
        let scanner = RepoScanner::new();
        assert_eq!(
            scanner.repo_identity("/home/alice/projects/widget/"),
            ("projects".to_string(), "widget".to_string())
        );
        assert_eq!(
            scanner.repo_identity("/srv/owner/repo/./src/.."),
            ("owner".to_string(), "repo".to_string())
        );
    }
}
