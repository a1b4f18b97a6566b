//! Backup stores persist the last installed snapshot so that a restarted process can serve
//! decisions before it reaches a remote source.
use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use crate::{models::Snapshot, Result};

/// Pluggable key-value store for snapshots, keyed by application name.
///
/// Only "eventually readable after a successful write" is required; there are no transactional
/// guarantees.
pub trait BackupStore: Send + Sync {
    /// Read the snapshot stored under `key`, or `None` if nothing was stored yet.
    fn get(&self, key: &str) -> Result<Option<Snapshot>>;

    /// Store `snapshot` under `key`, replacing any previous value.
    fn set(&self, key: &str, snapshot: &Snapshot) -> Result<()>;
}

/// Process-local backup store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    snapshots: Mutex<HashMap<String, Snapshot>>,
}

impl InMemoryStorage {
    /// Create an empty store.
    pub fn new() -> InMemoryStorage {
        InMemoryStorage::default()
    }
}

impl BackupStore for InMemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Snapshot>> {
        let snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(snapshots.get(key).cloned())
    }

    fn set(&self, key: &str, snapshot: &Snapshot) -> Result<()> {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots.insert(key.to_owned(), snapshot.clone());
        Ok(())
    }
}

/// Stores each snapshot as a JSON file `toggle-backup-{key}.json` in a directory.
///
/// Path separators in the key are replaced with `_`. Writes go to a temporary file that is then
/// renamed over the target, so readers never see a half-written file.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Store backups in `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> FileStorage {
        FileStorage { dir: dir.into() }
    }

    /// Path of the backup file for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let safe_key = key.replace(['/', '\\'], "_");
        self.dir.join(format!("toggle-backup-{safe_key}.json"))
    }

    /// The directory holding the backup files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl BackupStore for FileStorage {
    fn get(&self, key: &str) -> Result<Option<Snapshot>> {
        let path = self.path_for(key);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn set(&self, key: &str, snapshot: &Snapshot) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(snapshot)?)?;
        std::fs::rename(&tmp, &path)?;
        log::trace!(target: "toggle_engine", path:? = path; "persisted backup");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::{
        models::{ClientFeatures, FeatureDefinition, StrategyBinding},
        Error,
    };

    fn snapshot() -> Snapshot {
        ClientFeatures::new(
            vec![FeatureDefinition::new("f", true).with_strategy(StrategyBinding::new("default"))],
            vec![],
        )
        .into()
    }

    #[test]
    fn in_memory_round_trip() {
        let storage = InMemoryStorage::new();
        assert!(storage.get("app").unwrap().is_none());

        storage.set("app", &snapshot()).unwrap();

        assert_eq!(storage.get("app").unwrap(), Some(snapshot()));
        assert!(storage.get("other").unwrap().is_none());
    }

    #[test]
    fn file_storage_missing_file_is_none() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        assert!(storage.get("app").unwrap().is_none());
    }

    #[test]
    fn file_storage_persists_across_instances() {
        let dir = tempdir().unwrap();
        FileStorage::new(dir.path()).set("app", &snapshot()).unwrap();

        let restored = FileStorage::new(dir.path()).get("app").unwrap();

        assert_eq!(restored, Some(snapshot()));
    }

    #[test]
    fn file_storage_creates_the_directory() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("nested").join("backups"));
        storage.set("app", &snapshot()).unwrap();
        assert!(storage.get("app").unwrap().is_some());
    }

    #[test]
    fn file_storage_sanitizes_keys() {
        let storage = FileStorage::new("/backups");
        assert_eq!(
            storage.path_for("team/app\\x"),
            PathBuf::from("/backups/toggle-backup-team_app_x.json")
        );
    }

    #[test]
    fn file_storage_reports_corrupt_files() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        std::fs::write(storage.path_for("app"), "{ not json").unwrap();

        assert!(matches!(storage.get("app"), Err(Error::Json(_))));
    }
}
