use crate::changeset::{ChangeSet, normalize_entries};
use crate::constants::{LONG_TIMEOUT, MEDIUM_TIMEOUT, SHORT_TIMEOUT};
use crate::error::Result;
use crate::paths::PathTranslator;
use crate::process::{BatchLimits, BatchReport};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

mod status;

pub use status::parse_status;

const STATUS_ARGS: &[&str] = &[
    "-c",
    "core.quotepath=false",
    "--no-optional-locks",
    "status",
    "--porcelain=v1",
    "-z",
    "--untracked-files=all",
    "--find-renames",
];

/// committer identity from git config
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub email: Option<String>,
    pub name: Option<String>,
}

impl Identity {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.name.is_none()
    }

    /// `--author` arguments; git ORs multiple author filters together
    pub fn author_args(&self) -> Vec<String> {
        self.email
            .iter()
            .chain(self.name.iter())
            .map(|value| format!("--author={value}"))
            .collect()
    }
}

/// the git command line wire protocol, run inside the discovered repository
#[derive(Debug)]
pub struct Git {
    translator: PathTranslator,
    limits: BatchLimits,
}

impl Git {
    pub fn new(translator: PathTranslator) -> Self {
        Self {
            translator,
            limits: BatchLimits::default(),
        }
    }

    pub fn translator(&self) -> &PathTranslator {
        &self.translator
    }

    fn root(&self) -> Result<PathBuf> {
        self.translator.require_repo_root()
    }

    /// scan the working tree; a missing repository yields an empty change set
    pub fn scan(&self) -> Result<ChangeSet> {
        let Some(root) = self.translator.repo_root() else {
            return Ok(ChangeSet::no_repository());
        };

        let output = self
            .translator
            .invoker()
            .run_checked(STATUS_ARGS, &root, SHORT_TIMEOUT)?;

        let mut entries = parse_status(&output.stdout, |path| {
            self.translator.to_project_path(path).is_some()
        });
        for entry in &mut entries {
            entry.working_tree_timestamp = self
                .translator
                .repo_to_absolute(&entry.path)
                .and_then(|p| fs::symlink_metadata(p).ok())
                .and_then(|m| m.modified().ok());
        }

        Ok(ChangeSet {
            entries: normalize_entries(entries),
            repository: Some(root),
        })
    }

    /// stage repository paths; paths missing on disk stage their deletion
    pub fn stage(&self, paths: &[String]) -> Result<BatchReport> {
        let root = self.root()?;
        let (present, missing): (Vec<String>, Vec<String>) = paths.iter().cloned().partition(|p| {
            self.translator
                .repo_to_absolute(p)
                .is_some_and(|abs| fs::symlink_metadata(abs).is_ok())
        });

        let invoker = self.translator.invoker();
        let mut report = BatchReport::default();
        if !present.is_empty() {
            report.merge(invoker.run_batched(
                &["add", "--"],
                &present,
                &root,
                MEDIUM_TIMEOUT,
                self.limits,
            ));
        }
        if !missing.is_empty() {
            report.merge(invoker.run_batched(
                &["add", "-u", "--"],
                &missing,
                &root,
                MEDIUM_TIMEOUT,
                self.limits,
            ));
        }
        Ok(report)
    }

    /// reset the index for the given paths only
    pub fn unstage(&self, paths: &[String]) -> Result<BatchReport> {
        let root = self.root()?;
        Ok(self.translator.invoker().run_batched(
            &["reset", "-q", "--"],
            paths,
            &root,
            MEDIUM_TIMEOUT,
            self.limits,
        ))
    }

    /// commit the index; multi-line messages go through a temporary file
    pub fn commit(&self, message: &str) -> Result<String> {
        let root = self.root()?;
        let message = message.trim();
        let invoker = self.translator.invoker();

        let output = if message.contains('\n') {
            let mut file = tempfile::Builder::new()
                .prefix("commit-message-")
                .suffix(".txt")
                .tempfile()?;
            file.write_all(message.as_bytes())?;
            file.write_all(b"\n")?;
            file.flush()?;
            let path = file.path().to_string_lossy().to_string();
            // the file is removed when `file` drops, whatever the outcome
            invoker.run_checked(&["commit", "-F", path.as_str()], &root, MEDIUM_TIMEOUT)?
        } else {
            invoker.run_checked(&["commit", "-m", message], &root, MEDIUM_TIMEOUT)?
        };

        Ok(first_line(&output.stdout_lossy()))
    }

    pub fn push(&self) -> Result<String> {
        let root = self.root()?;
        let output = self
            .translator
            .invoker()
            .run_checked(&["push"], &root, LONG_TIMEOUT)?;
        // git reports push progress on stderr
        let summary = first_line(&output.stderr);
        Ok(if summary.is_empty() {
            first_line(&output.stdout_lossy())
        } else {
            summary
        })
    }

    pub fn identity(&self) -> Result<Identity> {
        Ok(Identity {
            email: self.config_value("user.email")?,
            name: self.config_value("user.name")?,
        })
    }

    fn config_value(&self, key: &str) -> Result<Option<String>> {
        let root = self.root()?;
        let output = self
            .translator
            .invoker()
            .run(&["config", key], &root, SHORT_TIMEOUT)?;
        let value = output.stdout_lossy().trim().to_string();
        Ok((output.success() && !value.is_empty()).then_some(value))
    }

    /// subjects of recent non-merge commits, newest first
    pub fn recent_subjects(&self, limit: usize, author: Option<&Identity>) -> Result<Vec<String>> {
        let root = self.root()?;
        let mut args = vec![
            "log".to_string(),
            "--no-merges".to_string(),
            "--format=%s".to_string(),
            format!("-n{limit}"),
        ];
        if let Some(author) = author.filter(|a| !a.is_empty()) {
            args.push("--fixed-strings".to_string());
            args.extend(author.author_args());
        }

        let output = self.translator.invoker().run(args.as_slice(), &root, SHORT_TIMEOUT)?;
        if !output.success() {
            // no commits yet
            tracing::debug!("git log failed: {}", output.stderr.trim());
            return Ok(Vec::new());
        }
        Ok(output
            .stdout_lossy()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// file content as committed at `revision`, None if it doesn't exist there
    pub fn show(&self, revision: &str, repo_path: &str) -> Result<Option<String>> {
        let root = self.root()?;
        let object = format!("{revision}:{repo_path}");
        let output = self
            .translator
            .invoker()
            .run(&["show", object.as_str()], &root, SHORT_TIMEOUT)?;
        Ok(output.success().then(|| output.stdout_lossy()))
    }

    /// current on-disk content of a repository path
    pub fn read_working(&self, repo_path: &str) -> Option<String> {
        let path = self.translator.repo_to_absolute(repo_path)?;
        fs::read_to_string(path).ok()
    }
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}
