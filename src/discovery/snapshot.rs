use super::{PeerSource, SourceError};
use crate::config::peer_set_digest;
use crate::membership::Membership;
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Snapshot file name under the agent root.
pub const SNAPSHOT_FILE: &str = "peers.snapshot.json";

/// Persisted membership addresses from a previous run; the joiner's
/// bootstrap fallback when live discovery yields nothing.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSnapshot {
    #[serde(default)]
    pub peers: Vec<SocketAddr>,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable store for the peer snapshot, written atomically.
#[derive(Debug, Clone)]
pub struct PeerSnapshotStore {
    path: PathBuf,
}

impl PeerSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the conventional location under the agent root.
    pub fn in_root(root: impl AsRef<Path>) -> Self {
        Self::new(root.as_ref().join(SNAPSHOT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty snapshot, not an error; a fresh agent has
    /// never persisted one.
    pub fn load_or_default(&self) -> Result<PeerSnapshot, SnapshotError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(PeerSnapshot::default()),
            Err(err) => Err(SnapshotError::Io(err)),
        }
    }

    pub fn persist(&self, snapshot: &PeerSnapshot) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        let mut tmp_file = File::create(&tmp_path)?;
        let payload = serde_json::to_vec_pretty(snapshot)?;
        tmp_file.write_all(&payload)?;
        tmp_file.sync_all()?;
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl PeerSource for PeerSnapshotStore {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    async fn peers(&self) -> Result<Vec<SocketAddr>, SourceError> {
        Ok(self.load_or_default()?.peers)
    }
}

/// Background task persisting the live membership view at a fixed cadence.
///
/// Fire-and-forget: a failed write is logged and the next tick retries; the
/// task never blocks the gossip or consensus hot path and stops promptly on
/// the shutdown signal without waiting for another tick.
pub struct Snapshotter {
    store: PeerSnapshotStore,
    frequency: Duration,
}

impl Snapshotter {
    pub fn new(store: PeerSnapshotStore, frequency: Duration) -> Self {
        Self { store, frequency }
    }

    pub async fn run(
        self,
        membership: Arc<dyn Membership>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(self.frequency);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let members = membership.members();
                    let digest = peer_set_digest(&members);
                    let snapshot = PeerSnapshot {
                        peers: members.into_iter().map(|peer| peer.addr).collect(),
                    };
                    match self.store.persist(&snapshot) {
                        Ok(()) => debug!(
                            "event=peer_snapshot_persisted path={} peers={} digest={digest:016x}",
                            self.store.path().display(),
                            snapshot.peers.len()
                        ),
                        Err(err) => warn!(
                            "event=peer_snapshot_write_failed path={} err={err}",
                            self.store.path().display()
                        ),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("event=peer_snapshotter_stopped");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Peer;
    use crate::membership::{JoinMode, MembershipError};
    use tempfile::TempDir;

    struct FixedMembership {
        members: Vec<Peer>,
    }

    #[async_trait]
    impl Membership for FixedMembership {
        fn local(&self) -> Peer {
            self.members[0].clone()
        }

        fn members(&self) -> Vec<Peer> {
            self.members.clone()
        }

        async fn join(
            &self,
            _addrs: &[SocketAddr],
            _mode: JoinMode,
        ) -> Result<usize, MembershipError> {
            Ok(self.members.len())
        }
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = PeerSnapshotStore::in_root(dir.path());
        assert!(store.load_or_default().unwrap().peers.is_empty());
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = PeerSnapshotStore::in_root(dir.path());
        let snapshot = PeerSnapshot {
            peers: vec![addr("10.0.0.1:2001"), addr("10.0.0.2:2001")],
        };
        store.persist(&snapshot).unwrap();
        assert_eq!(store.load_or_default().unwrap(), snapshot);
        // no stray tmp file after the atomic rename
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[test]
    fn corrupt_snapshot_surfaces_as_error() {
        let dir = TempDir::new().unwrap();
        let store = PeerSnapshotStore::in_root(dir.path());
        fs::write(store.path(), b"{ not json").unwrap();
        assert!(matches!(
            store.load_or_default(),
            Err(SnapshotError::Serialization(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn snapshotter_persists_and_stops_on_signal() {
        let dir = TempDir::new().unwrap();
        let store = PeerSnapshotStore::in_root(dir.path());
        let membership = Arc::new(FixedMembership {
            members: vec![
                Peer::new("a", addr("10.0.0.1:2001")),
                Peer::new("b", addr("10.0.0.2:2001")),
            ],
        });
        let (stop, stop_recv) = watch::channel(false);
        let task = tokio::spawn(
            Snapshotter::new(store.clone(), Duration::from_secs(60))
                .run(membership, stop_recv),
        );

        // the first tick fires immediately
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(
            store.load_or_default().unwrap().peers,
            vec![addr("10.0.0.1:2001"), addr("10.0.0.2:2001")]
        );

        stop.send(true).unwrap();
        task.await.unwrap();
    }
}
