use crate::error::Result;
use crate::git::Git;
use crate::process::BatchReport;
use crate::resolver::resolve_moves;
use crate::scheduler::{Backend, ScanResult};
use std::collections::BTreeSet;

/// scheduler backend that talks to the real git CLI
#[derive(Debug)]
pub struct GitBackend {
    git: Git,
}

impl GitBackend {
    pub fn new(git: Git) -> Self {
        Self { git }
    }

    pub fn git(&self) -> &Git {
        &self.git
    }
}

impl Backend for GitBackend {
    fn scan(&self, relevant: Option<&BTreeSet<String>>) -> Result<ScanResult> {
        let changes = self.git.scan()?;
        let relevant = relevant.map(|r| resolve_moves(&changes.entries, r, &self.git));
        Ok(ScanResult { changes, relevant })
    }

    fn stage(&self, paths: &[String]) -> Result<BatchReport> {
        self.git.stage(paths)
    }

    fn unstage(&self, paths: &[String]) -> Result<BatchReport> {
        self.git.unstage(paths)
    }

    fn commit(&self, message: &str) -> Result<String> {
        self.git.commit(message)
    }

    fn push(&self) -> Result<String> {
        self.git.push()
    }

    fn project_path(&self, repo_path: &str) -> Option<String> {
        self.git.translator().to_project_path(repo_path)
    }

    fn invalidate_root(&self) {
        self.git.translator().invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SHORT_TIMEOUT;
    use crate::paths::PathTranslator;
    use crate::process::Invoker;
    use crate::resolver::{SelectionOnly, relevant_closure};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn git(root: &Path, args: &[&str]) {
        Invoker::new("git")
            .run_checked(args, root, SHORT_TIMEOUT)
            .unwrap();
    }

    fn write(root: &Path, path: &str, content: &str) {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_scan_recovers_move_by_identity_tag() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        git(root, &["init", "-q"]);
        write(root, "Assets/old/hero.png", "pixels v1");
        write(root, "Assets/old/hero.png.meta", "fileFormatVersion: 2\nguid: 4f2a9c\n");
        write(root, "Assets/other.png", "unrelated");
        git(root, &["add", "-A"]);
        git(
            root,
            &[
                "-c",
                "user.name=Test User",
                "-c",
                "user.email=test@example.com",
                "-c",
                "commit.gpgsign=false",
                "commit",
                "-q",
                "-m",
                "initial",
            ],
        );

        // moved on disk with different content; nothing staged, so git has
        // no rename to report
        fs::remove_dir_all(root.join("Assets/old")).unwrap();
        write(root, "Assets/new/hero.png", "completely different pixels");
        write(root, "Assets/new/hero.png.meta", "fileFormatVersion: 2\nguid: 4f2a9c\n");

        let backend = GitBackend::new(Git::new(PathTranslator::new(Invoker::new("git"), root)));
        let selection = vec!["Assets/new/hero.png".to_string()];
        let relevant = relevant_closure(&selection, &SelectionOnly);
        let result = backend.scan(Some(&relevant)).unwrap();
        let resolved = result.relevant.unwrap();

        assert!(resolved.contains("Assets/new/hero.png"));
        assert!(resolved.contains("Assets/old/hero.png"));
        assert!(resolved.contains("Assets/old/hero.png.meta"));
        assert!(resolved.contains("Assets/old.meta"));
        assert!(!resolved.contains("Assets/other.png"));
    }

    #[test]
    fn test_scan_without_selection_keeps_everything() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        git(root, &["init", "-q"]);
        write(root, "a.txt", "a");

        let backend = GitBackend::new(Git::new(PathTranslator::new(Invoker::new("git"), root)));
        let result = backend.scan(None).unwrap();
        assert!(result.relevant.is_none());
        assert!(result.changes.contains_path("a.txt"));
        assert_eq!(backend.project_path("a.txt"), Some("a.txt".to_string()));
    }
}
