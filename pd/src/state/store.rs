//! JSON file store for scheduler state

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{SchedulerState, StateError};

/// File-backed store for [`SchedulerState`]
///
/// The scheduler is the only writer. Saves go to a temporary sibling file
/// that is renamed over the target, so a reader (or a restart after a crash)
/// sees either the old or the new state, never a partial write.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        debug!(?path, "StateStore::new: called");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load state, falling back to an empty state on any error
    pub fn load(&self) -> SchedulerState {
        match self.try_load() {
            Ok(state) => state,
            Err(e) if e.is_corrupt() => {
                warn!(error = %e, "State file is corrupt, starting with empty state");
                SchedulerState::new()
            }
            Err(e) => {
                warn!(error = %e, "Failed to read state file, starting with empty state");
                SchedulerState::new()
            }
        }
    }

    /// Load state, reporting unreadable or unparseable files
    ///
    /// A missing file is not an error: it yields an empty state.
    pub fn try_load(&self) -> Result<SchedulerState, StateError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No state file found, starting fresh");
                return Ok(SchedulerState::new());
            }
            Err(e) => return Err(StateError::io(&self.path, e)),
        };

        let state: SchedulerState = serde_json::from_str(&content).map_err(|source| StateError::CorruptState {
            path: self.path.clone(),
            source,
        })?;

        debug!(tasks = state.len(), path = %self.path.display(), "Loaded delivery state");
        Ok(state)
    }

    /// Atomically replace the state file
    pub fn save(&self, state: &SchedulerState) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;
        }

        let mut content = serde_json::to_string_pretty(state)?;
        content.push('\n');

        let tmp_path = self.tmp_path();
        let write_tmp = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()
        };
        if let Err(e) = write_tmp() {
            let _ = fs::remove_file(&tmp_path);
            return Err(StateError::io(&tmp_path, e));
        }

        fs::rename(&tmp_path, &self.path).map_err(|e| StateError::io(&self.path, e))?;

        debug!(tasks = state.len(), path = %self.path.display(), "Saved delivery state");
        Ok(())
    }

    /// Operator reset: forget one task, or every task when `task_id` is None
    ///
    /// Returns whether anything was removed.
    pub fn reset(&self, task_id: Option<&str>) -> Result<bool, StateError> {
        match task_id {
            Some(id) => {
                let mut state = self.try_load()?;
                if state.remove(id).is_none() {
                    return Ok(false);
                }
                self.save(&state)?;
                info!(task = %id, "Reset delivery state for task");
                Ok(true)
            }
            None => match fs::remove_file(&self.path) {
                Ok(()) => {
                    info!(path = %self.path.display(), "Removed state file");
                    Ok(true)
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(StateError::io(&self.path, e)),
            },
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "state".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DeliveryState;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn sample_state() -> SchedulerState {
        let mut state = SchedulerState::new();
        state.record_failure("weather", Utc.timestamp_opt(1_700_000_000, 5).unwrap());
        state.record_failure("weather", Utc.timestamp_opt(1_700_000_600, 0).unwrap());
        state.record_success("solar", Utc.timestamp_opt(1_700_000_100, 999_000_000).unwrap());
        state.insert("never", DeliveryState::default());
        state
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().join("state.json"));

        let state = sample_state();
        store.save(&state).unwrap();

        assert_eq!(store.load(), state);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().join("missing.json"));

        assert!(store.try_load().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_falls_back_to_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        fs::write(&path, "{\"weather\": {\"consecutive_fail").unwrap();

        let store = StateStore::new(&path);
        let err = store.try_load().unwrap_err();
        assert!(err.is_corrupt());
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_empty_file_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        fs::write(&path, "").unwrap();

        let store = StateStore::new(&path);
        assert!(store.try_load().unwrap_err().is_corrupt());
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_creates_parent_dirs_and_leaves_no_tmp() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("dir").join("state.json");
        let store = StateStore::new(&path);

        store.save(&sample_state()).unwrap();

        assert!(path.exists());
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(leftovers, vec!["state.json".to_string()]);
    }

    #[test]
    fn test_save_is_human_readable() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        let store = StateStore::new(&path);
        store.save(&sample_state()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\n  \"weather\": {"));
        assert!(content.contains("\"consecutive_failures\": 2"));
    }

    #[test]
    fn test_save_overwrites_corrupt_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        fs::write(&path, "garbage").unwrap();

        let store = StateStore::new(&path);
        let state = sample_state();
        store.save(&state).unwrap();
        assert_eq!(store.try_load().unwrap(), state);
    }

    #[test]
    fn test_reset_single_task() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().join("state.json"));
        store.save(&sample_state()).unwrap();

        assert!(store.reset(Some("weather")).unwrap());
        assert!(!store.reset(Some("weather")).unwrap());

        let state = store.load();
        assert!(state.get("weather").is_none());
        assert!(state.get("solar").is_some());
    }

    #[test]
    fn test_reset_all_removes_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        let store = StateStore::new(&path);
        store.save(&sample_state()).unwrap();

        assert!(store.reset(None).unwrap());
        assert!(!path.exists());
        assert!(!store.reset(None).unwrap());
        assert!(store.load().is_empty());
    }

    fn arb_delivery_state() -> impl Strategy<Value = DeliveryState> {
        (
            proptest::option::of((0i64..4_000_000_000, 0u32..1_000_000_000)),
            any::<u32>(),
        )
            .prop_map(|(attempt, consecutive_failures)| DeliveryState {
                last_attempt_time: attempt.map(|(secs, nanos)| Utc.timestamp_opt(secs, nanos).unwrap()),
                consecutive_failures,
            })
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            tasks in proptest::collection::btree_map("[a-zA-Z0-9_.-]{1,24}", arb_delivery_state(), 0..8)
        ) {
            let temp = TempDir::new().unwrap();
            let store = StateStore::new(temp.path().join("state.json"));

            let mut state = SchedulerState::new();
            for (id, entry) in tasks {
                state.insert(id, entry);
            }

            store.save(&state).unwrap();
            prop_assert_eq!(store.try_load().unwrap(), state);
        }
    }
}
