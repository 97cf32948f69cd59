use crate::constants::MAX_COMMIT_HISTORY;
use crate::store::{load_json, save_json};
use std::path::{Path, PathBuf};

/// recently used commit messages, most recent first
#[derive(Debug, Default)]
pub struct CommitHistory {
    path: Option<PathBuf>,
    messages: Vec<String>,
}

impl CommitHistory {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Self {
        let mut messages: Vec<String> = load_json(path);
        messages.truncate(MAX_COMMIT_HISTORY);
        Self {
            path: Some(path.to_path_buf()),
            messages,
        }
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn latest(&self) -> Option<&str> {
        self.messages.first().map(String::as_str)
    }

    /// move `message` to the front, dropping an exact duplicate and the oldest
    /// entry past the cap
    pub fn record(&mut self, message: &str) {
        let message = message.trim();
        if message.is_empty() {
            return;
        }
        self.messages.retain(|m| m != message);
        self.messages.insert(0, message.to_string());
        self.messages.truncate(MAX_COMMIT_HISTORY);

        if let Some(path) = &self.path
            && let Err(e) = save_json(path, &self.messages)
        {
            tracing::warn!("failed to save commit history: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_orders_dedupes_and_caps() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");

        let mut history = CommitHistory::load(&path);
        for i in 0..25 {
            history.record(&format!("message {i}"));
        }
        history.record("message 10");
        history.record("   ");

        assert_eq!(history.messages().len(), MAX_COMMIT_HISTORY);
        assert_eq!(history.latest(), Some("message 10"));
        assert_eq!(history.messages()[1], "message 24");
        assert_eq!(
            history
                .messages()
                .iter()
                .filter(|m| *m == "message 10")
                .count(),
            1
        );

        let reloaded = CommitHistory::load(&path);
        assert_eq!(reloaded.messages(), history.messages());
    }
}
