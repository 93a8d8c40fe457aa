use super::storage::{ConsensusStorage, LogStore, SnapshotStore, StorageError};
use log::info;
use std::io;
use std::path::PathBuf;
use std::{fs, path::Path};
use thiserror::Error;

/// Passive reset failed partway; the error names the step so operators can
/// tell a wedged delete from a failed rebuild. Any of these is fatal; the
/// process cannot run on half-reset storage.
#[derive(Debug, Error)]
pub enum ResetError {
    #[error("failed to remove consensus storage at {path}: {source}")]
    Remove { path: PathBuf, source: io::Error },
    #[error("failed to recreate consensus storage at {path}: {source}")]
    Recreate { path: PathBuf, source: io::Error },
    #[error("failed to rebuild log store: {0}")]
    LogStore(#[source] StorageError),
    #[error("failed to rebuild snapshot store: {0}")]
    SnapshotStore(#[source] StorageError),
}

/// Recovery strategy invoked by the consensus engine when its on-disk state
/// is unusable: discard everything and resynchronize from peers.
///
/// Resetting is a function of the directory alone, so the strategy can be
/// exercised directly against a scratch directory.
#[derive(Debug, Clone)]
pub struct PassiveReset {
    dir: PathBuf,
    retain: usize,
}

impl PassiveReset {
    pub fn new(dir: impl Into<PathBuf>, retain: usize) -> Self {
        Self {
            dir: dir.into(),
            retain,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Wipe and rebuild the consensus storage.
    ///
    /// Strictly ordered: the directory is fully removed before recreation,
    /// and recreation completes before either store is rebuilt. Running it
    /// against an already-empty directory yields the same structure, so a
    /// repeated invocation is harmless.
    pub fn reset(&self) -> Result<ConsensusStorage, ResetError> {
        info!("event=consensus_passive_reset dir={}", self.dir.display());

        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ResetError::Remove {
                    path: self.dir.clone(),
                    source,
                })
            }
        }

        fs::create_dir_all(&self.dir).map_err(|source| ResetError::Recreate {
            path: self.dir.clone(),
            source,
        })?;

        let log = LogStore::open(&self.dir).map_err(ResetError::LogStore)?;
        let snapshots =
            SnapshotStore::open(&self.dir, self.retain).map_err(ResetError::SnapshotStore)?;
        Ok(ConsensusStorage::from_parts(self.dir.clone(), log, snapshots))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::storage::{LogEntry, LogMetadata, SnapshotMeta, SNAPSHOT_RETAIN};
    use tempfile::TempDir;

    #[test]
    fn reset_discards_existing_state() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("raft.d");
        {
            let mut storage = ConsensusStorage::open(&dir).unwrap();
            storage
                .log
                .append(&LogEntry::new(3, 9, b"stale".to_vec()))
                .unwrap();
            storage
                .snapshots
                .save(SnapshotMeta { index: 9, term: 3 }, b"stale")
                .unwrap();
        }

        let storage = PassiveReset::new(&dir, SNAPSHOT_RETAIN).reset().unwrap();
        assert_eq!(storage.log.metadata(), &LogMetadata::default());
        assert!(storage.log.entries().unwrap().is_empty());
        assert!(storage.snapshots.list().unwrap().is_empty());
    }

    #[test]
    fn reset_is_idempotent_on_final_state() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("raft.d");
        let reset = PassiveReset::new(&dir, SNAPSHOT_RETAIN);

        reset.reset().unwrap();
        let listing_once: Vec<_> = list_names(&dir);

        // second run starts from an already-empty directory
        let storage = reset.reset().unwrap();
        assert_eq!(list_names(&dir), listing_once);
        assert!(storage.log.entries().unwrap().is_empty());
    }

    #[test]
    fn reset_handles_missing_directory() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("never-created");
        let storage = PassiveReset::new(&dir, SNAPSHOT_RETAIN).reset().unwrap();
        assert_eq!(storage.dir(), dir);
        assert!(dir.exists());
    }

    fn list_names(dir: &std::path::Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
