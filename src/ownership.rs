//! Paths this tool put into the index itself.
//!
//! Anything else found staged was staged by another process, and can be
//! cleaned out when a session opens. The set is stored as a plain JSON list
//! and rewritten on every change. Two sessions against the same repository
//! are not coordinated; the last write wins.

use crate::store::{load_json, save_json};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct OwnershipTracker {
    path: Option<PathBuf>,
    owned: BTreeSet<String>,
}

impl OwnershipTracker {
    /// not backed by a file; used when there is no repository to key it on
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Self {
        let owned: Vec<String> = load_json(path);
        Self {
            path: Some(path.to_path_buf()),
            owned: owned.into_iter().collect(),
        }
    }

    pub fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let list: Vec<&String> = self.owned.iter().collect();
        if let Err(e) = save_json(path, &list) {
            tracing::warn!("failed to save staged ownership: {e}");
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.owned.contains(path)
    }

    pub fn paths(&self) -> &BTreeSet<String> {
        &self.owned
    }

    pub fn len(&self) -> usize {
        self.owned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owned.is_empty()
    }

    pub fn add<I, S>(&mut self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let before = self.owned.len();
        self.owned.extend(paths.into_iter().map(Into::into));
        if self.owned.len() != before {
            self.save();
        }
    }

    pub fn remove<I, S>(&mut self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut changed = false;
        for path in paths {
            changed |= self.owned.remove(path.as_ref());
        }
        if changed {
            self.save();
        }
    }

    /// forget owned paths that are no longer staged; returns what was dropped
    pub fn prune(&mut self, currently_staged: &BTreeSet<String>) -> Vec<String> {
        let stale: Vec<String> = self
            .owned
            .difference(currently_staged)
            .cloned()
            .collect();
        if !stale.is_empty() {
            for path in &stale {
                self.owned.remove(path);
            }
            self.save();
        }
        stale
    }

    /// staged paths this tool did not stage
    pub fn foreign(&self, currently_staged: &BTreeSet<String>) -> Vec<String> {
        currently_staged.difference(&self.owned).cloned().collect()
    }
}
