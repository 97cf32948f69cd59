//! Mapping between project-relative paths (the asset namespace) and
//! repository-relative paths (what git prints), plus sidecar helpers.
//!
//! Every translated path is normalised to `/` separators with `.` and `..`
//! resolved, and must land under the expected root. Anything else is treated
//! as unresolvable rather than trusted.

use crate::constants::{META_EXTENSION, SHORT_TIMEOUT};
use crate::error::{Result, StagerError};
use crate::process::Invoker;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};

const GIT_MARKER: &str = ".git";

#[derive(Debug, Default)]
struct RootCache {
    context: Option<PathBuf>,
    // outer None: not looked up yet, inner None: looked up, no repository
    root: Option<Option<PathBuf>>,
}

#[derive(Debug)]
pub struct PathTranslator {
    invoker: Invoker,
    project_root: PathBuf,
    cache: Mutex<RootCache>,
}

impl PathTranslator {
    pub fn new(invoker: Invoker, project_root: &Path) -> Self {
        Self {
            invoker,
            project_root: absolute(project_root),
            cache: Mutex::new(RootCache::default()),
        }
    }

    pub fn invoker(&self) -> &Invoker {
        &self.invoker
    }

    /// point root discovery at a new context directory, dropping the cached
    /// root if the context changed
    pub fn set_context(&self, dir: &Path) {
        let dir = absolute(dir);
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if cache.context.as_deref() != Some(dir.as_path()) {
            cache.context = Some(dir);
            cache.root = None;
        }
    }

    pub fn invalidate(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .root = None;
    }

    /// the repository root, discovered on first use and cached
    pub fn repo_root(&self) -> Option<PathBuf> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(root) = &cache.root {
            return root.clone();
        }
        let context = cache
            .context
            .clone()
            .unwrap_or_else(|| self.project_root.clone());
        let root = self.discover_root(&context);
        match &root {
            Some(root) => tracing::debug!("repository root: {}", root.display()),
            None => tracing::warn!(
                "no repository found from {} or {}",
                context.display(),
                self.project_root.display()
            ),
        }
        cache.root = Some(root.clone());
        root
    }

    pub fn require_repo_root(&self) -> Result<PathBuf> {
        self.repo_root().ok_or(StagerError::RepositoryNotFound)
    }

    fn discover_root(&self, context: &Path) -> Option<PathBuf> {
        find_marker_upwards(context)
            .or_else(|| find_marker_upwards(&self.project_root))
            .or_else(|| self.ask_toplevel(context))
            .or_else(|| self.ask_toplevel(&self.project_root))
    }

    fn ask_toplevel(&self, dir: &Path) -> Option<PathBuf> {
        if !dir.is_dir() {
            return None;
        }
        let output = self
            .invoker
            .run(&["rev-parse", "--show-toplevel"], dir, SHORT_TIMEOUT)
            .ok()?;
        if !output.success() {
            return None;
        }
        let top = output.stdout_lossy();
        let top = top.trim();
        if top.is_empty() {
            None
        } else {
            Some(normalize(Path::new(top)))
        }
    }

    /// project-relative -> repository-relative
    pub fn to_repo_path(&self, project_path: &str) -> Option<String> {
        let root = self.repo_root()?;
        let absolute = normalize(&self.project_root.join(separators(project_path)));
        relative_under(&absolute, &root)
    }

    /// repository-relative -> project-relative
    pub fn to_project_path(&self, repo_path: &str) -> Option<String> {
        let root = self.repo_root()?;
        let absolute = normalize(&root.join(separators(repo_path)));
        relative_under(&absolute, &self.project_root)
    }

    /// absolute on-disk location of a repository-relative path, if it stays
    /// inside the repository
    pub fn repo_to_absolute(&self, repo_path: &str) -> Option<PathBuf> {
        let root = self.repo_root()?;
        let absolute = normalize(&root.join(separators(repo_path)));
        absolute.starts_with(&root).then_some(absolute)
    }

    /// like `to_repo_path`, but with a typed error for callers that need one
    pub fn require_repo_path(&self, project_path: &str) -> Result<String> {
        self.require_repo_root()?;
        self.to_repo_path(project_path)
            .ok_or_else(|| StagerError::PathOutsideRoot(project_path.to_string()))
    }
}

fn find_marker_upwards(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(GIT_MARKER).exists())
        .map(Path::to_path_buf)
}

fn separators(path: &str) -> String {
    path.replace('\\', "/")
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        normalize(&cwd.join(path))
    }
}

/// resolve `.` and `..` lexically, without touching the filesystem
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                ) && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `path` relative to `root` with `/` separators, or None if it escapes `root`
pub fn relative_under(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    if relative.components().any(|c| matches!(c, Component::ParentDir)) {
        return None;
    }
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    Some(parts.join("/"))
}

pub fn is_meta(path: &str) -> bool {
    path.ends_with(META_EXTENSION)
}

/// sidecar path for an asset path
pub fn meta_path(path: &str) -> String {
    format!("{}{META_EXTENSION}", path.trim_end_matches('/'))
}

/// the asset a sidecar belongs to
pub fn asset_for_meta(path: &str) -> Option<&str> {
    path.strip_suffix(META_EXTENSION).filter(|p| !p.is_empty())
}

/// whether a repository path is the pathspec itself or lies under it as a
/// directory; an empty pathspec covers the whole repository
pub fn is_under(path: &str, pathspec: &str) -> bool {
    let pathspec = pathspec.trim_end_matches('/');
    if pathspec.is_empty() || pathspec == "." {
        return true;
    }
    path.strip_prefix(pathspec)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// last `/`-separated segment
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// parent directories of a `/`-separated path, nearest first
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut current = path.trim_end_matches('/');
    while let Some(idx) = current.rfind('/') {
        current = &current[..idx];
        if !current.is_empty() {
            out.push(current);
        }
    }
    out
}
