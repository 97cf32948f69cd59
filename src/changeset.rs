use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::time::SystemTime;

/// kind of change observed for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    Unknown,
}

impl ChangeKind {
    /// map a porcelain status letter; copies and untracked files count as additions
    pub fn from_status_char(c: char) -> Self {
        match c {
            'A' | 'C' | '?' => Self::Added,
            'M' => Self::Modified,
            'D' => Self::Deleted,
            'R' => Self::Renamed,
            _ => Self::Unknown,
        }
    }

    pub fn status_char(self) -> char {
        match self {
            Self::Added => 'A',
            Self::Modified => 'M',
            Self::Deleted => 'D',
            Self::Renamed => 'R',
            Self::Unknown => '?',
        }
    }
}

/// one observed difference between the working tree / index and HEAD
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEntry {
    /// repository-relative, current location
    pub path: String,
    /// set for both halves of a rename: the other side of the move
    pub original_path: Option<String>,
    pub kind: ChangeKind,
    /// mtime on disk; None when the file no longer exists
    pub working_tree_timestamp: Option<SystemTime>,
    pub is_staged: bool,
    pub is_unstaged: bool,
}

impl ChangeEntry {
    pub fn new(path: impl Into<String>, kind: ChangeKind, is_staged: bool, is_unstaged: bool) -> Self {
        Self {
            path: path.into(),
            original_path: None,
            kind,
            working_tree_timestamp: None,
            is_staged,
            is_unstaged,
        }
    }

    pub fn with_original(mut self, original: impl Into<String>) -> Self {
        self.original_path = Some(original.into());
        self
    }

    /// two-column marker for display, e.g. "S " / " U" / "SU"
    pub fn stage_marker(&self) -> &'static str {
        match (self.is_staged, self.is_unstaged) {
            (true, true) => "SU",
            (true, false) => "S ",
            (false, true) => " U",
            (false, false) => "  ",
        }
    }
}

/// sort by (path, kind) and fold duplicates together, OR-ing their flags;
/// entries with neither flag set are dropped
pub fn normalize_entries(entries: Vec<ChangeEntry>) -> Vec<ChangeEntry> {
    let mut merged: Vec<ChangeEntry> = Vec::with_capacity(entries.len());
    let mut index: HashMap<(String, ChangeKind), usize> = HashMap::new();

    for entry in entries {
        if !entry.is_staged && !entry.is_unstaged {
            continue;
        }
        match index.get(&(entry.path.clone(), entry.kind)) {
            Some(&idx) => {
                let existing = &mut merged[idx];
                existing.is_staged |= entry.is_staged;
                existing.is_unstaged |= entry.is_unstaged;
                if existing.original_path.is_none() {
                    existing.original_path = entry.original_path;
                }
                if existing.working_tree_timestamp.is_none() {
                    existing.working_tree_timestamp = entry.working_tree_timestamp;
                }
            }
            None => {
                index.insert((entry.path.clone(), entry.kind), merged.len());
                merged.push(entry);
            }
        }
    }

    merged.sort_by(|a, b| a.path.cmp(&b.path).then(a.kind.cmp(&b.kind)));
    merged
}

/// result of one scan of the working tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub entries: Vec<ChangeEntry>,
    /// None when no repository could be located
    pub repository: Option<PathBuf>,
}

impl ChangeSet {
    pub fn no_repository() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn staged_paths(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter(|e| e.is_staged)
            .map(|e| e.path.clone())
            .collect()
    }

    pub fn unstaged_paths(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter(|e| e.is_unstaged)
            .map(|e| e.path.clone())
            .collect()
    }

    pub fn find(&self, path: &str) -> Option<&ChangeEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.find(path).is_some()
    }
}

/// ui-facing view of a change entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    /// stable while the path keeps showing up in scans
    pub id: u64,
    pub entry: ChangeEntry,
    pub project_path: Option<String>,
    pub last_known_change_time: SystemTime,
}

/// asset list that keeps identities stable across refreshes
#[derive(Debug, Default)]
pub struct AssetList {
    assets: Vec<AssetInfo>,
    next_id: u64,
}

impl AssetList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assets(&self) -> &[AssetInfo] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn clear(&mut self) {
        self.assets.clear();
    }

    /// apply a fresh scan: surviving paths are updated in place, new paths get
    /// a new identity and vanished paths are dropped
    pub fn reconcile<F>(&mut self, entries: &[ChangeEntry], project_path: F, now: SystemTime)
    where
        F: Fn(&str) -> Option<String>,
    {
        // identity follows the path; a change of kind keeps the same asset
        let mut previous: HashMap<String, AssetInfo> = self
            .assets
            .drain(..)
            .map(|a| (a.entry.path.clone(), a))
            .collect();

        for entry in entries {
            let change_time = entry.working_tree_timestamp.unwrap_or(now);
            match previous.remove(&entry.path) {
                Some(mut asset) => {
                    asset.entry = entry.clone();
                    asset.last_known_change_time = change_time;
                    self.assets.push(asset);
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.assets.push(AssetInfo {
                        id,
                        entry: entry.clone(),
                        project_path: project_path(&entry.path),
                        last_known_change_time: change_time,
                    });
                }
            }
        }
    }
}
