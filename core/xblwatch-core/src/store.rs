//! File-backed checkpoint of the most recent status change.
//!
//! One small JSON record per monitored gamertag: `{changed_at, status}`.
//! This is deliberately minimal; session counters are in-memory only and
//! reset on restart. The file is rewritten wholesale on every status change
//! and committed via temp file + rename, so a concurrent reader never
//! observes a torn write.
//!
//! # Defensive Loading
//!
//! - Missing file: empty store (first run).
//! - Empty or corrupt file: empty store, warning logged. A damaged
//!   checkpoint only costs bootstrap precision, never the monitor.

use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Result, WatchError};
use crate::types::PresenceStatus;

/// The persisted record: when the current status started, and what it is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub changed_at: DateTime<Utc>,
    pub status: PresenceStatus,
}

/// Single-record store, optionally backed by a file.
///
/// Create with [`StatusStore::load`] to read the checkpoint file, or
/// [`StatusStore::new_in_memory`] for tests.
pub struct StatusStore {
    record: Option<StatusRecord>,
    path: Option<PathBuf>,
}

impl StatusStore {
    pub fn new_in_memory() -> Self {
        StatusStore {
            record: None,
            path: None,
        }
    }

    /// Deterministic checkpoint file name for a gamertag, in the working
    /// directory (`xblwatch_<gamertag>_last_status.json`).
    pub fn path_for(gamertag: &str) -> PathBuf {
        PathBuf::from(format!("xblwatch_{}_last_status.json", gamertag))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(StatusStore {
                record: None,
                path: Some(path.to_path_buf()),
            });
        }

        let content = fs::read_to_string(path)
            .map_err(|err| WatchError::io(format!("read {}", path.display()), err))?;

        let record = if content.trim().is_empty() {
            warn!(path = %path.display(), "Empty status checkpoint, starting fresh");
            None
        } else {
            match serde_json::from_str::<StatusRecord>(&content) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "Unreadable status checkpoint, starting fresh"
                    );
                    None
                }
            }
        };

        Ok(StatusStore {
            record,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn record(&self) -> Option<StatusRecord> {
        self.record
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Replaces the record and commits it to disk (temp file + rename).
    /// In-memory stores skip the disk write.
    pub fn save(&mut self, record: StatusRecord) -> Result<()> {
        self.record = Some(record);

        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };

        let payload = serde_json::to_string_pretty(&record)
            .map_err(|err| WatchError::json("serialize status checkpoint", err))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|err| WatchError::io(format!("create {}", parent.display()), err))?;
        }

        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, payload)
            .map_err(|err| WatchError::io(format!("write {}", tmp_path.display()), err))?;
        fs::rename(&tmp_path, path)
            .map_err(|err| WatchError::io(format!("commit {}", path.display()), err))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn record() -> StatusRecord {
        StatusRecord {
            changed_at: Utc.with_ymd_and_hms(2024, 4, 21, 15, 8, 45).unwrap(),
            status: PresenceStatus::Online,
        }
    }

    #[test]
    fn load_nonexistent_file_returns_empty_store() {
        let temp = tempdir().unwrap();
        let store = StatusStore::load(&temp.path().join("missing.json")).unwrap();
        assert!(store.record().is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("last_status.json");

        let mut store = StatusStore::load(&file).unwrap();
        store.save(record()).unwrap();

        let reloaded = StatusStore::load(&file).unwrap();
        assert_eq!(reloaded.record(), Some(record()));
    }

    #[test]
    fn resave_of_loaded_record_is_byte_identical() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("last_status.json");

        let mut store = StatusStore::load(&file).unwrap();
        store.save(record()).unwrap();
        let first = std::fs::read(&file).unwrap();

        let mut reloaded = StatusStore::load(&file).unwrap();
        let loaded = reloaded.record().unwrap();
        reloaded.save(loaded).unwrap();
        let second = std::fs::read(&file).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn load_empty_file_returns_empty_store() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("empty.json");
        std::fs::write(&file, "").unwrap();

        let store = StatusStore::load(&file).unwrap();
        assert!(store.record().is_none());
    }

    #[test]
    fn load_corrupt_file_returns_empty_store() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("corrupt.json");
        std::fs::write(&file, "{not json}").unwrap();

        let store = StatusStore::load(&file).unwrap();
        assert!(store.record().is_none());
    }

    #[test]
    fn in_memory_store_keeps_record_without_disk() {
        let mut store = StatusStore::new_in_memory();
        store.save(record()).unwrap();
        assert_eq!(store.record(), Some(record()));
        assert!(store.file_path().is_none());
    }

    #[test]
    fn checkpoint_file_name_is_deterministic() {
        assert_eq!(
            StatusStore::path_for("SomeTag"),
            PathBuf::from("xblwatch_SomeTag_last_status.json")
        );
    }
}
