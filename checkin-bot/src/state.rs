use chrono::Utc;
use shared::BotState;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::error::{BotError, BotResult};

/// Bot state persisted as JSON, written back after every change.
pub struct StateStore {
    path: PathBuf,
    state: Mutex<BotState>,
}

impl StateStore {
    /// Load the state file. A missing or corrupt file starts from empty state.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring corrupt state file {}: {}", path.display(), e);
                BotState::default()
            }),
            Err(e) => {
                tracing::debug!("No state file at {}: {}", path.display(), e);
                BotState::default()
            }
        };

        Self {
            path,
            state: Mutex::new(state),
        }
    }

    pub async fn last_event(&self, calendar: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .last_event(calendar)
            .map(str::to_string)
    }

    pub async fn snapshot(&self) -> BotState {
        self.state.lock().await.clone()
    }

    /// Record `uid` as the last announced event and persist immediately
    pub async fn set_last_event(&self, calendar: &str, uid: &str) -> BotResult<()> {
        let mut state = self.state.lock().await;
        state.record_event(calendar, uid, Utc::now());
        write_atomically(&self.path, &serde_json::to_vec_pretty(&*state)?).await
    }
}

async fn write_atomically(path: &Path, contents: &[u8]) -> BotResult<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| BotError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| BotError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::load(dir.path().join("data.json"));
        assert_eq!(store.last_event("main").await, None);
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = StateStore::load(&path);
        assert!(store.snapshot().await.calendars.is_empty());
    }

    #[tokio::test]
    async fn test_last_event_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");

        let store = StateStore::load(&path);
        assert_ok!(store.set_last_event("main", "evt-1").await);
        assert_ok!(store.set_last_event("lab", "evt-9").await);
        assert_ok!(store.set_last_event("main", "evt-2").await);

        let reloaded = StateStore::load(&path);
        assert_eq!(reloaded.last_event("main").await.as_deref(), Some("evt-2"));
        assert_eq!(reloaded.last_event("lab").await.as_deref(), Some("evt-9"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::load(dir.path().join("missing-dir").join("data.json"));

        let err = store.set_last_event("main", "evt-1").await.unwrap_err();
        assert!(matches!(err, BotError::Io { .. }));
        // In-memory state still moves forward
        assert_eq!(store.last_event("main").await.as_deref(), Some("evt-1"));
    }
}
