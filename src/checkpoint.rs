use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CheckpointError;
use crate::record::{FoodId, ValidatedRecord};

pub const DEFAULT_CHECKPOINT_DIR: &str = "data/checkpoints";

/// Durable snapshot of scrape progress. `completed_ids` is exactly the set
/// of ids whose outcomes (possibly zero records) are reflected in `records`.
/// Unknown fields from other schema versions are ignored on load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointState {
    #[serde(default)]
    pub completed_ids: BTreeSet<FoodId>,
    #[serde(default)]
    pub records: Vec<ValidatedRecord>,
    #[serde(default)]
    pub last_saved: Option<DateTime<Utc>>,
}

impl CheckpointState {
    pub fn is_completed(&self, id: FoodId) -> bool {
        self.completed_ids.contains(&id)
    }

    /// Record the outcome of one id: append its rows and mark it done.
    /// A second call for the same id is a no-op, so records are never
    /// duplicated.
    pub fn complete(&mut self, id: FoodId, records: Vec<ValidatedRecord>) {
        if self.completed_ids.insert(id) {
            self.records.extend(records);
        }
    }

    /// Forget an id's outcome so it can be reprocessed (retry of a skipped
    /// item).
    pub fn reopen(&mut self, id: FoodId) {
        if self.completed_ids.remove(&id) {
            self.records.retain(|r| r.food_id != id);
        }
    }
}

/// JSON checkpoint file with a rotated backup copy. Writes are atomic
/// (temp file + rename), so a crash mid-save never destroys both the
/// last-good state and its backup.
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join("checkpoint.json"),
        }
    }

    fn backup_path(&self) -> PathBuf {
        self.path.with_extension("json.bak")
    }

    /// Load the last durable state: primary first, backup if the primary is
    /// unreadable, `Corrupt` when neither can be read. A missing checkpoint
    /// is `None`, not an error.
    pub fn load(&self) -> Result<Option<CheckpointState>, CheckpointError> {
        if !self.path.exists() {
            return Ok(None);
        }

        match read_state(&self.path) {
            Ok(state) => {
                info!(
                    "Loaded checkpoint: {} ids completed, {} records",
                    state.completed_ids.len(),
                    state.records.len()
                );
                Ok(Some(state))
            }
            Err(primary_err) => {
                warn!("Checkpoint unreadable ({}), trying backup", primary_err);
                let backup = self.backup_path();
                if !backup.exists() {
                    return Err(CheckpointError::Corrupt(format!(
                        "primary: {primary_err}; no backup present"
                    )));
                }
                match read_state(&backup) {
                    Ok(state) => {
                        info!(
                            "Recovered checkpoint from backup: {} ids completed",
                            state.completed_ids.len()
                        );
                        Ok(Some(state))
                    }
                    Err(backup_err) => Err(CheckpointError::Corrupt(format!(
                        "primary: {primary_err}; backup: {backup_err}"
                    ))),
                }
            }
        }
    }

    /// Atomically persist `state`, rotating the previous primary into the
    /// backup slot first.
    pub fn save(&self, state: &CheckpointState) -> Result<(), CheckpointError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        if self.path.exists() {
            fs::copy(&self.path, self.backup_path())?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        fs::rename(&tmp, &self.path)?;

        debug!(
            "Checkpoint saved: {} ids, {} records",
            state.completed_ids.len(),
            state.records.len()
        );
        Ok(())
    }

    /// Delete both checkpoint files. Only reached by an explicit user
    /// action, never as part of a run.
    pub fn reset(&self) -> Result<(), CheckpointError> {
        for path in [self.path.clone(), self.backup_path()] {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

fn read_state(path: &Path) -> Result<CheckpointState, CheckpointError> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::source_url;

    fn record(id: FoodId) -> ValidatedRecord {
        ValidatedRecord {
            food_id: id,
            food_name: format!("Food {id}"),
            unit_label: "g".to_string(),
            unit_value: Some(100.0),
            calories: Some(150.0),
            carbs_g: Some(20.0),
            protein_g: Some(5.0),
            fat_g: Some(3.0),
            fiber_g: Some(2.0),
            source_url: source_url(id),
        }
    }

    fn state_with(ids: &[FoodId]) -> CheckpointState {
        let mut state = CheckpointState::default();
        for &id in ids {
            state.complete(id, vec![record(id)]);
        }
        state
    }

    #[test]
    fn missing_checkpoint_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        store.save(&state_with(&[3, 4, 5])).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.completed_ids, BTreeSet::from([3, 4, 5]));
        assert_eq!(loaded.records.len(), 3);
    }

    #[test]
    fn saving_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let state = state_with(&[3, 4]);

        store.save(&state).unwrap();
        store.save(&state).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.completed_ids, state.completed_ids);
        assert_eq!(loaded.records, state.records);
    }

    #[test]
    fn corrupt_primary_recovers_from_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        store.save(&state_with(&[3])).unwrap();
        store.save(&state_with(&[3, 4])).unwrap();

        // Clobber the primary mid-write style: garbage where JSON should be.
        fs::write(dir.path().join("checkpoint.json"), "{ not json").unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.completed_ids, BTreeSet::from([3]));
    }

    #[test]
    fn corrupt_primary_and_backup_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        store.save(&state_with(&[3])).unwrap();
        store.save(&state_with(&[3, 4])).unwrap();
        fs::write(dir.path().join("checkpoint.json"), "garbage").unwrap();
        fs::write(dir.path().join("checkpoint.json.bak"), "garbage").unwrap();

        assert!(matches!(store.load(), Err(CheckpointError::Corrupt(_))));
    }

    #[test]
    fn unknown_fields_ignored_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(
            dir.path().join("checkpoint.json"),
            r#"{ "completed_ids": [7], "records": [], "future_field": 42 }"#,
        )
        .unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert!(loaded.is_completed(7));
        assert!(loaded.last_saved.is_none());
    }

    #[test]
    fn complete_never_duplicates() {
        let mut state = CheckpointState::default();
        state.complete(3, vec![record(3)]);
        state.complete(3, vec![record(3)]);
        assert_eq!(state.records.len(), 1);
    }

    #[test]
    fn reopen_drops_records_for_id() {
        let mut state = state_with(&[3, 4]);
        state.reopen(3);
        assert!(!state.is_completed(3));
        assert!(state.records.iter().all(|r| r.food_id != 3));
        assert!(state.is_completed(4));
    }

    #[test]
    fn reset_removes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.save(&state_with(&[3])).unwrap();
        store.save(&state_with(&[3, 4])).unwrap();

        store.reset().unwrap();
        assert!(!dir.path().join("checkpoint.json").exists());
        assert!(!dir.path().join("checkpoint.json.bak").exists());
    }
}
