use crate::error::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// read a small JSON document; a missing file is a first run and a
/// malformed one is logged and treated as empty
pub fn load_json<T: DeserializeOwned + Default>(path: &Path) -> T {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return T::default(),
        Err(e) => {
            tracing::warn!("failed to read {}: {e}", path.display());
            return T::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("ignoring malformed {}: {e}", path.display());
            T::default()
        }
    }
}

/// rewrite a document wholesale via a temporary file in the same directory
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(json.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// per-repository directory for persisted state
pub fn repo_state_dir(data_dir: &Path, repo_root: &Path) -> PathBuf {
    let key: String = repo_root
        .to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    data_dir.join(key.trim_matches('_'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_and_malformed_are_empty() {
        let dir = TempDir::new().unwrap();
        let missing: Vec<String> = load_json(&dir.path().join("nope.json"));
        assert!(missing.is_empty());

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{ not json").unwrap();
        let malformed: Vec<String> = load_json(&bad);
        assert!(malformed.is_empty());
    }

    #[test]
    fn test_save_creates_directories_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/doc.json");
        save_json(&path, &vec!["one".to_string()]).unwrap();
        save_json(&path, &vec!["two".to_string()]).unwrap();
        let loaded: Vec<String> = load_json(&path);
        assert_eq!(loaded, vec!["two".to_string()]);
    }

    #[test]
    fn test_repo_state_dir_is_flat() {
        let dir = repo_state_dir(Path::new("/data"), Path::new("/home/me/My Game"));
        assert_eq!(dir, PathBuf::from("/data/home_me_My_Game"));
        assert_ne!(
            repo_state_dir(Path::new("/data"), Path::new("/repos/a")),
            repo_state_dir(Path::new("/data"), Path::new("/repos/b"))
        );
    }
}
