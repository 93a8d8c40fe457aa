use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Append-only log file under the consensus storage directory.
pub const LOG_FILE: &str = "state.bin";
/// Sidecar metadata persisted alongside the log.
pub const LOG_META_FILE: &str = "log.meta.json";
/// Snapshots retained on disk; older ones are pruned after each save.
pub const SNAPSHOT_RETAIN: usize = 5;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("log entry index {index} not after {last}")]
    OutOfOrder { index: u64, last: u64 },
}

/// Durable term/vote/log-position record for the replicated-log engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LogMetadata {
    pub current_term: u64,
    pub voted_for: Option<String>,
    pub last_log_term: u64,
    pub last_log_index: u64,
}

/// Logical log entry; the payload is opaque to the bootstrap layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub term: u64,
    pub index: u64,
    pub payload: Vec<u8>,
}

impl LogEntry {
    pub fn new(term: u64, index: u64, payload: Vec<u8>) -> Self {
        Self {
            term,
            index,
            payload,
        }
    }
}

/// File-backed log store handed to the consensus engine: JSON-lines entries
/// in `state.bin`, metadata persisted atomically beside it.
#[derive(Debug)]
pub struct LogStore {
    log_path: PathBuf,
    meta_path: PathBuf,
    metadata: LogMetadata,
}

impl LogStore {
    /// Open (creating if absent) the log store inside `dir`.
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)?;
        let log_path = dir.join(LOG_FILE);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        let meta_path = dir.join(LOG_META_FILE);
        let metadata = match fs::read(&meta_path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => LogMetadata::default(),
            Err(err) => return Err(StorageError::Io(err)),
        };
        Ok(Self {
            log_path,
            meta_path,
            metadata,
        })
    }

    pub fn metadata(&self) -> &LogMetadata {
        &self.metadata
    }

    /// Append one entry and advance the durable metadata.
    pub fn append(&mut self, entry: &LogEntry) -> Result<(), StorageError> {
        if entry.index <= self.metadata.last_log_index {
            return Err(StorageError::OutOfOrder {
                index: entry.index,
                last: self.metadata.last_log_index,
            });
        }
        let mut file = OpenOptions::new().append(true).open(&self.log_path)?;
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        file.write_all(&line)?;
        file.sync_all()?;

        let mut metadata = self.metadata.clone();
        metadata.last_log_index = entry.index;
        metadata.last_log_term = entry.term;
        self.persist_metadata(metadata)
    }

    /// Replace the durable metadata (term changes, votes).
    pub fn persist_metadata(&mut self, metadata: LogMetadata) -> Result<(), StorageError> {
        let tmp = self.meta_path.with_extension("tmp");
        let mut file = File::create(&tmp)?;
        let payload = serde_json::to_vec_pretty(&metadata)?;
        file.write_all(&payload)?;
        file.sync_all()?;
        fs::rename(tmp, &self.meta_path)?;
        self.metadata = metadata;
        Ok(())
    }

    /// All entries currently on disk, in append order.
    pub fn entries(&self) -> Result<Vec<LogEntry>, StorageError> {
        let file = File::open(&self.log_path)?;
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }
}

/// Position metadata parsed from a snapshot filename.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct SnapshotMeta {
    pub index: u64,
    pub term: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRecord {
    index: u64,
    term: u64,
    payload: Vec<u8>,
}

/// Snapshot files in the consensus storage directory, bounded to
/// [`SNAPSHOT_RETAIN`] retained files.
#[derive(Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
    retain: usize,
}

impl SnapshotStore {
    pub fn open(dir: &Path, retain: usize) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            retain: retain.max(1),
        })
    }

    fn file_name(meta: SnapshotMeta) -> String {
        format!("snap-{:020}-{:020}.json", meta.index, meta.term)
    }

    fn parse_file_name(name: &str) -> Option<SnapshotMeta> {
        let rest = name.strip_prefix("snap-")?.strip_suffix(".json")?;
        let (index, term) = rest.split_once('-')?;
        Some(SnapshotMeta {
            index: index.parse().ok()?,
            term: term.parse().ok()?,
        })
    }

    /// Persist a snapshot and prune beyond the retention bound.
    pub fn save(&self, meta: SnapshotMeta, payload: &[u8]) -> Result<PathBuf, StorageError> {
        let path = self.dir.join(Self::file_name(meta));
        let tmp = path.with_extension("tmp");
        let record = SnapshotRecord {
            index: meta.index,
            term: meta.term,
            payload: payload.to_vec(),
        };
        let mut file = File::create(&tmp)?;
        file.write_all(&serde_json::to_vec(&record)?)?;
        file.sync_all()?;
        fs::rename(&tmp, &path)?;
        self.prune()?;
        Ok(path)
    }

    /// Snapshot positions on disk, newest first.
    pub fn list(&self) -> Result<Vec<SnapshotMeta>, StorageError> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(meta) = entry
                .file_name()
                .to_str()
                .and_then(Self::parse_file_name)
            {
                found.push(meta);
            }
        }
        found.sort();
        found.reverse();
        Ok(found)
    }

    /// The newest snapshot's position and payload, if any.
    pub fn load_latest(&self) -> Result<Option<(SnapshotMeta, Vec<u8>)>, StorageError> {
        let newest = match self.list()?.first().copied() {
            Some(meta) => meta,
            None => return Ok(None),
        };
        let bytes = fs::read(self.dir.join(Self::file_name(newest)))?;
        let record: SnapshotRecord = serde_json::from_slice(&bytes)?;
        Ok(Some((newest, record.payload)))
    }

    fn prune(&self) -> Result<(), StorageError> {
        let listed = self.list()?;
        for meta in listed.iter().skip(self.retain) {
            fs::remove_file(self.dir.join(Self::file_name(*meta)))?;
        }
        Ok(())
    }
}

/// Exclusive handle over the on-disk consensus state. Constructed at
/// initializer startup; invalidated and rebuilt only by a passive reset.
#[derive(Debug)]
pub struct ConsensusStorage {
    dir: PathBuf,
    pub log: LogStore,
    pub snapshots: SnapshotStore,
}

impl ConsensusStorage {
    /// Open the storage directory, creating it when absent.
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)?;
        let log = LogStore::open(dir)?;
        let snapshots = SnapshotStore::open(dir, SNAPSHOT_RETAIN)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            log,
            snapshots,
        })
    }

    pub(crate) fn from_parts(dir: PathBuf, log: LogStore, snapshots: SnapshotStore) -> Self {
        Self {
            dir,
            log,
            snapshots,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
