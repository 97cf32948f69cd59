//! Recovers moves that git's similarity check reported as an unrelated
//! delete + add, by matching file names and comparing the identity tag in
//! the sidecar file before and after.
//!
//! This is a heuristic: two unrelated assets sharing a file name and a
//! colliding identity tag would be linked as well.

use crate::changeset::{ChangeEntry, ChangeKind};
use crate::constants::GUID_KEY;
use crate::git::Git;
use crate::paths::{ancestors, asset_for_meta, file_name, is_meta, meta_path};
use std::collections::{BTreeSet, HashMap};

/// where sidecar content comes from
pub trait ObjectSource {
    /// content as of the last commit
    fn committed(&self, repo_path: &str) -> Option<String>;
    /// content currently on disk
    fn working(&self, repo_path: &str) -> Option<String>;
}

impl ObjectSource for Git {
    fn committed(&self, repo_path: &str) -> Option<String> {
        match self.show("HEAD", repo_path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!("could not read committed {repo_path}: {e}");
                None
            }
        }
    }

    fn working(&self, repo_path: &str) -> Option<String> {
        self.read_working(repo_path)
    }
}

/// host-provided dependency lookup for a selected asset
pub trait DependencyGraph {
    /// repository paths the given asset depends on
    fn dependencies(&self, repo_path: &str) -> Vec<String>;
}

/// a selection with no dependency information: only what was picked
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionOnly;

impl DependencyGraph for SelectionOnly {
    fn dependencies(&self, _repo_path: &str) -> Vec<String> {
        Vec::new()
    }
}

/// the selection plus its dependencies, each with its sidecar
pub fn relevant_closure<G: DependencyGraph + ?Sized>(
    selection: &[String],
    graph: &G,
) -> BTreeSet<String> {
    let mut relevant = BTreeSet::new();
    let mut pending: Vec<String> = selection.to_vec();
    while let Some(path) = pending.pop() {
        let path = path.trim_end_matches('/').to_string();
        if path.is_empty() || !relevant.insert(path.clone()) {
            continue;
        }
        relevant.insert(sidecar_of(&path));
        pending.extend(graph.dependencies(&path));
    }
    relevant
}

/// identity tag following the `guid:` key in sidecar content
pub fn extract_guid(content: &str) -> Option<&str> {
    content.lines().find_map(|line| {
        let rest = line.trim_start().strip_prefix(GUID_KEY)?;
        rest.split_whitespace().next().filter(|guid| !guid.is_empty())
    })
}

/// extend `relevant` with the other half of reported renames and with
/// deletions whose sidecar identity matches a relevant asset
pub fn resolve_moves<S: ObjectSource + ?Sized>(
    entries: &[ChangeEntry],
    relevant: &BTreeSet<String>,
    objects: &S,
) -> BTreeSet<String> {
    let mut resolved = relevant.clone();

    // renames git did detect: either side pulls in the other
    for entry in entries {
        if let Some(original) = &entry.original_path
            && (is_relevant(&resolved, &entry.path) || is_relevant(&resolved, original))
        {
            resolved.insert(entry.path.clone());
            resolved.insert(original.clone());
        }
    }

    // candidates grouped by asset file name
    let mut by_name: HashMap<&str, Vec<&str>> = HashMap::new();
    for path in relevant {
        by_name
            .entry(asset_name(file_name(path)))
            .or_default()
            .push(path.as_str());
    }

    let mut current_guids: HashMap<String, Option<String>> = HashMap::new();
    for entry in entries {
        if entry.kind != ChangeKind::Deleted
            || entry.original_path.is_some()
            || resolved.contains(&entry.path)
        {
            continue;
        }
        let Some(candidates) = by_name.get(asset_name(file_name(&entry.path))) else {
            continue;
        };

        let Some(previous) = objects.committed(&sidecar_of(&entry.path)) else {
            continue;
        };
        let Some(previous_guid) = extract_guid(&previous) else {
            continue;
        };

        let matched = candidates.iter().any(|candidate| {
            let sidecar = sidecar_of(candidate);
            let guid = current_guids.entry(sidecar.clone()).or_insert_with(|| {
                objects
                    .working(&sidecar)
                    .and_then(|content| extract_guid(&content).map(str::to_string))
            });
            guid.as_deref() == Some(previous_guid)
        });

        if matched {
            tracing::debug!("{} matched a relevant asset by identity tag", entry.path);
            resolved.insert(entry.path.clone());
            resolved.insert(sidecar_of(&entry.path));
            if let Some(asset) = asset_for_meta(&entry.path) {
                resolved.insert(asset.to_string());
            }
            for dir in ancestors(&entry.path) {
                resolved.insert(meta_path(dir));
            }
        }
    }

    resolved
}

/// keep entries that are relevant, or inside a relevant directory
pub fn filter_relevant(entries: &[ChangeEntry], relevant: &BTreeSet<String>) -> Vec<ChangeEntry> {
    entries
        .iter()
        .filter(|e| is_relevant(relevant, &e.path))
        .cloned()
        .collect()
}

fn is_relevant(relevant: &BTreeSet<String>, path: &str) -> bool {
    relevant.contains(path)
        || ancestors(path)
            .into_iter()
            .any(|dir| relevant.contains(dir))
}

fn sidecar_of(path: &str) -> String {
    if is_meta(path) {
        path.to_string()
    } else {
        meta_path(path)
    }
}

fn asset_name(name: &str) -> &str {
    asset_for_meta(name).unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeObjects {
        committed: HashMap<String, String>,
        working: HashMap<String, String>,
    }

    impl ObjectSource for FakeObjects {
        fn committed(&self, repo_path: &str) -> Option<String> {
            self.committed.get(repo_path).cloned()
        }

        fn working(&self, repo_path: &str) -> Option<String> {
            self.working.get(repo_path).cloned()
        }
    }

    fn meta(guid: &str) -> String {
        format!("fileFormatVersion: 2\nguid: {guid}\nTextureImporter:\n  spriteMode: 1\n")
    }

    fn set(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_extract_guid() {
        assert_eq!(extract_guid(&meta("0f3c9e")), Some("0f3c9e"));
        assert_eq!(extract_guid("  guid:   abc  \n"), Some("abc"));
        assert_eq!(extract_guid("fileFormatVersion: 2\n"), None);
        assert_eq!(extract_guid("guid:\n"), None);
    }

    #[test]
    fn test_closure_includes_dependencies_and_sidecars() {
        struct Graph;
        impl DependencyGraph for Graph {
            fn dependencies(&self, repo_path: &str) -> Vec<String> {
                match repo_path {
                    "A/Hero.prefab" => vec!["A/Hero.png".into(), "A/Hero.mat".into()],
                    "A/Hero.mat" => vec!["A/Hero.png".into()],
                    _ => Vec::new(),
                }
            }
        }
        let relevant = relevant_closure(&["A/Hero.prefab".to_string()], &Graph);
        assert_eq!(
            relevant,
            set(&[
                "A/Hero.mat",
                "A/Hero.mat.meta",
                "A/Hero.png",
                "A/Hero.png.meta",
                "A/Hero.prefab",
                "A/Hero.prefab.meta",
            ])
        );
        let plain = relevant_closure(&["A/Sprites/".to_string()], &SelectionOnly);
        assert_eq!(plain, set(&["A/Sprites", "A/Sprites.meta"]));
    }

    #[test]
    fn test_undetected_move_is_recovered_by_identity() {
        // Hero.png moved from Old/ to New/ but git saw a delete + add
        let entries = vec![
            ChangeEntry::new("Assets/New/Hero.png", ChangeKind::Added, false, true),
            ChangeEntry::new("Assets/New/Hero.png.meta", ChangeKind::Added, false, true),
            ChangeEntry::new("Assets/Old/Hero.png", ChangeKind::Deleted, false, true),
            ChangeEntry::new("Assets/Old/Hero.png.meta", ChangeKind::Deleted, false, true),
            ChangeEntry::new("Assets/Other/Hero.png", ChangeKind::Deleted, false, true),
        ];
        let mut objects = FakeObjects::default();
        objects
            .committed
            .insert("Assets/Old/Hero.png.meta".into(), meta("guid-1"));
        objects
            .committed
            .insert("Assets/Other/Hero.png.meta".into(), meta("guid-2"));
        objects
            .working
            .insert("Assets/New/Hero.png.meta".into(), meta("guid-1"));

        let relevant = set(&["Assets/New/Hero.png", "Assets/New/Hero.png.meta"]);
        let resolved = resolve_moves(&entries, &relevant, &objects);

        assert!(resolved.contains("Assets/Old/Hero.png"));
        assert!(resolved.contains("Assets/Old/Hero.png.meta"));
        assert!(resolved.contains("Assets/Old.meta"));
        assert!(resolved.contains("Assets.meta"));
        // same name, different identity
        assert!(!resolved.contains("Assets/Other/Hero.png"));

        let visible = filter_relevant(&entries, &resolved);
        let paths: Vec<_> = visible.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "Assets/New/Hero.png",
                "Assets/New/Hero.png.meta",
                "Assets/Old/Hero.png",
                "Assets/Old/Hero.png.meta",
            ]
        );
    }

    #[test]
    fn test_name_match_without_identity_is_ignored() {
        let entries = vec![ChangeEntry::new(
            "Assets/Old/Hero.png",
            ChangeKind::Deleted,
            false,
            true,
        )];
        let objects = FakeObjects::default();
        let relevant = set(&["Assets/New/Hero.png"]);
        assert_eq!(resolve_moves(&entries, &relevant, &objects), relevant);
    }

    #[test]
    fn test_detected_rename_pulls_in_other_side() {
        let entries = vec![
            ChangeEntry::new("B/x.txt", ChangeKind::Renamed, true, false).with_original("A/x.txt"),
            ChangeEntry::new("A/x.txt", ChangeKind::Deleted, true, false).with_original("B/x.txt"),
        ];
        let resolved = resolve_moves(&entries, &set(&["B/x.txt"]), &FakeObjects::default());
        assert!(resolved.contains("A/x.txt"));
    }

    #[test]
    fn test_filter_matches_directory_contents() {
        let entries = vec![
            ChangeEntry::new("A/Sprites/a.png", ChangeKind::Added, false, true),
            ChangeEntry::new("A/SpritesOld/b.png", ChangeKind::Added, false, true),
        ];
        let visible = filter_relevant(&entries, &set(&["A/Sprites"]));
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].path, "A/Sprites/a.png");
    }
}
