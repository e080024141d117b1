//! Per-session checkpoint persistence with a monotonic guard

use crate::error::StoreError;
use crate::io::atomic_write;
use crate::lock::LockGuard;
use crate::paths::Paths;
use hooktrace_core::{Checkpoint, CheckpointRead};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize)]
struct StoredCheckpoint {
    session_id: String,
    #[serde(flatten)]
    checkpoint: Checkpoint,
}

/// Result of a checkpoint write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointWrite {
    Written,
    /// The stored checkpoint was already further along; it is left as is
    Rejected { stored: Checkpoint },
}

/// One JSON file per session under `<state_dir>/checkpoints`
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    lock_path: PathBuf,
}

impl CheckpointStore {
    pub fn new(paths: &Paths) -> Self {
        Self {
            dir: paths.checkpoints_dir(),
            lock_path: paths.checkpoints_lock(),
        }
    }

    fn file_for(&self, session_id: &str) -> PathBuf {
        let name: String = session_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }

    /// Stored checkpoint, `None` when the session has never been processed
    pub fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        let path = self.file_for(session_id);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&path)(e)),
        };

        let stored: StoredCheckpoint =
            serde_json::from_slice(&data).map_err(|e| StoreError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        if stored.session_id != session_id {
            return Err(StoreError::Corrupt {
                path,
                reason: format!("belongs to session {}", stored.session_id),
            });
        }
        Ok(Some(stored.checkpoint))
    }

    /// Stored checkpoint or the zero default; unreadable state is logged and
    /// treated as empty so the session is reprocessed from the start
    pub fn get(&self, session_id: &str) -> Checkpoint {
        match self.load(session_id) {
            Ok(checkpoint) => checkpoint.unwrap_or_default(),
            Err(e) => {
                tracing::error!(session = %session_id, error = %e, "checkpoint unreadable, reprocessing from start");
                Checkpoint::default()
            }
        }
    }

    /// Atomically replace the session's checkpoint unless that would move it backwards
    pub fn set(&self, session_id: &str, checkpoint: Checkpoint) -> Result<CheckpointWrite, StoreError> {
        let _lock = LockGuard::acquire(&self.lock_path).map_err(StoreError::io(&self.lock_path))?;

        if let Ok(Some(stored)) = self.load(session_id) {
            if checkpoint.regresses(&stored) {
                tracing::warn!(
                    session = %session_id,
                    stored_offset = stored.offset,
                    offset = checkpoint.offset,
                    "refusing checkpoint write that would regress"
                );
                return Ok(CheckpointWrite::Rejected { stored });
            }
        }

        let path = self.file_for(session_id);
        let data = serde_json::to_vec_pretty(&StoredCheckpoint {
            session_id: session_id.to_string(),
            checkpoint,
        })?;
        atomic_write(&path, &data).map_err(StoreError::io(&path))?;
        Ok(CheckpointWrite::Written)
    }

    /// Number of sessions with a stored checkpoint
    pub fn count(&self) -> usize {
        std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("json"))
                    .count()
            })
            .unwrap_or(0)
    }
}

impl CheckpointRead for CheckpointStore {
    fn checkpoint(&self, session_id: &str) -> Checkpoint {
        self.get(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn store(temp: &tempfile::TempDir) -> CheckpointStore {
        CheckpointStore::new(&Paths::at(temp.path().join("state"), temp.path().join("projects")))
    }

    fn checkpoint(offset: u64, secs: i64) -> Checkpoint {
        Checkpoint {
            offset,
            last_updated_at: at(secs),
            turn_count: offset / 10,
        }
    }

    #[test]
    fn test_missing_checkpoint_is_default() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = store(&temp);
        assert_eq!(store.get("abc"), Checkpoint::default());
        assert_eq!(store.load("abc").unwrap(), None);
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_set_then_get() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = store(&temp);
        let cp = checkpoint(120, 5);
        assert_eq!(store.set("abc", cp).unwrap(), CheckpointWrite::Written);
        assert_eq!(store.get("abc"), cp);
        assert_eq!(store.get("other"), Checkpoint::default());
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_regressing_write_is_rejected() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = store(&temp);
        store.set("abc", checkpoint(200, 10)).unwrap();

        let outcome = store.set("abc", checkpoint(100, 20)).unwrap();
        assert_eq!(
            outcome,
            CheckpointWrite::Rejected {
                stored: checkpoint(200, 10)
            }
        );
        assert_eq!(store.get("abc").offset, 200);

        assert_eq!(store.set("abc", checkpoint(200, 10)).unwrap(), CheckpointWrite::Written);
        assert_eq!(store.set("abc", checkpoint(300, 30)).unwrap(), CheckpointWrite::Written);
        assert_eq!(store.get("abc").offset, 300);
    }

    #[test]
    fn test_corrupt_checkpoint_reads_as_default_and_is_isolated() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = store(&temp);
        store.set("good", checkpoint(50, 1)).unwrap();
        store.set("bad", checkpoint(50, 1)).unwrap();
        std::fs::write(store.file_for("bad"), "{ not json").unwrap();

        assert!(matches!(store.load("bad"), Err(StoreError::Corrupt { .. })));
        assert_eq!(store.get("bad"), Checkpoint::default());
        assert_eq!(store.get("good").offset, 50);

        // a corrupt file does not block a fresh write
        assert_eq!(store.set("bad", checkpoint(10, 2)).unwrap(), CheckpointWrite::Written);
        assert_eq!(store.get("bad").offset, 10);
    }

    #[test]
    fn test_session_ids_are_sanitized() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = store(&temp);
        store.set("../escape/id", checkpoint(1, 1)).unwrap();
        assert_eq!(store.get("../escape/id").offset, 1);
        assert!(temp.path().join("state/checkpoints/.._escape_id.json").exists());
    }

    #[test]
    fn test_checkpoint_without_turn_count_field() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = store(&temp);
        std::fs::create_dir_all(temp.path().join("state/checkpoints")).unwrap();
        std::fs::write(
            store.file_for("legacy"),
            r#"{"session_id":"legacy","offset":42,"last_updated_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let cp = store.get("legacy");
        assert_eq!(cp.offset, 42);
        assert_eq!(cp.turn_count, 0);
    }
}
