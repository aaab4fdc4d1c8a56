//! Persisted tracking state.
//!
//! Session counters and notification history survive restarts in a small
//! JSON file under the user data directory. A missing or unreadable file is
//! treated as a fresh start, never as a fatal error.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

use crate::notify::{ThresholdKind, TrackingEntry};

/// Everything that persists across restarts, keyed by the current local date
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    /// Local date (`YYYY-MM-DD`) the daily counters belong to
    #[serde(default)]
    pub day: String,
    /// Date a session was last observed starting
    #[serde(default)]
    pub last_session_date: Option<String>,
    /// Sessions started on `day`
    #[serde(default)]
    pub sessions_started_today: u32,
    /// Id of the most recently observed active block
    #[serde(default)]
    pub last_active_session_id: Option<String>,
    /// Per-kind notification firing history
    #[serde(default)]
    pub thresholds: HashMap<ThresholdKind, TrackingEntry>,
    /// Per-kind snooze expiries
    #[serde(default)]
    pub snoozes: HashMap<ThresholdKind, DateTime<Local>>,
    /// When "disable today" was requested, if at all
    #[serde(default)]
    pub disabled_at: Option<DateTime<Local>>,
}

/// Load/save handle for the tracking file
pub struct TrackingStore {
    path: PathBuf,
}

impl TrackingStore {
    /// Store at the default location (`<data dir>/cctray/state.json`)
    pub fn new() -> Self {
        let path = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cctray/state.json");
        Self { path }
    }

    /// Store at an explicit path
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load persisted state, falling back to defaults on any problem
    pub fn load(&self) -> PersistedState {
        match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(state) => state,
                Err(e) => {
                    warn!("Corrupt tracking file {:?}, starting fresh: {e}", self.path);
                    PersistedState::default()
                }
            },
            Err(_) => PersistedState::default(),
        }
    }

    /// Save persisted state via a temp file + rename
    pub fn save(&self, state: &PersistedState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create state directory {parent:?}"))?;
        }

        let content = serde_json::to_string_pretty(state).context("Failed to serialize state")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).with_context(|| format!("Failed to write {tmp:?}"))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to move state into place at {:?}", self.path))?;
        Ok(())
    }
}

impl Default for TrackingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_load_missing_file_is_default() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = TrackingStore::with_path(tmp.path().join("state.json"));
        let state = store.load();
        assert_eq!(state.sessions_started_today, 0);
        assert!(state.thresholds.is_empty());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = TrackingStore::with_path(tmp.path().join("nested/state.json"));

        let mut state = PersistedState {
            day: "2026-08-26".to_string(),
            sessions_started_today: 3,
            last_active_session_id: Some("b7".to_string()),
            ..Default::default()
        };
        state.thresholds.insert(
            ThresholdKind::Warning,
            TrackingEntry {
                last_fired_at: Some(Local::now()),
                last_fired_percent: Some(78.5),
                count_fired_today: 2,
            },
        );

        store.save(&state).expect("save should succeed");
        let loaded = store.load();
        assert_eq!(loaded.day, "2026-08-26");
        assert_eq!(loaded.sessions_started_today, 3);
        assert_eq!(loaded.last_active_session_id.as_deref(), Some("b7"));
        let entry = loaded
            .thresholds
            .get(&ThresholdKind::Warning)
            .expect("entry");
        assert_eq!(entry.count_fired_today, 2);
        assert_eq!(entry.last_fired_percent, Some(78.5));
    }

    #[test]
    fn test_corrupt_file_starts_fresh() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("state.json");
        fs::write(&path, "{not json").expect("write");
        let store = TrackingStore::with_path(path);
        let state = store.load();
        assert_eq!(state.sessions_started_today, 0);
    }
}
