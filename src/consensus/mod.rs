//! Consensus-log initialization over an external replicated-log engine.
//!
//! The engine (leader election, log matching, replication) is a
//! collaborator consumed through [`ConsensusEngine`]. This module owns what
//! surrounds it: on-disk storage construction, quorum policy, and the
//! passive-reset recovery path the engine invokes when it finds its state
//! unusable after a crash.

pub mod reset;
pub mod storage;

pub use reset::{PassiveReset, ResetError};
pub use storage::{
    ConsensusStorage, LogEntry, LogMetadata, LogStore, SnapshotMeta, SnapshotStore, StorageError,
    LOG_FILE, LOG_META_FILE, SNAPSHOT_RETAIN,
};

use crate::config::{Peer, QuorumPolicy};
use crate::membership::Membership;
use async_trait::async_trait;
use log::{error, info};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Consensus storage directory under the agent root.
pub const CONSENSUS_DIR: &str = "raft.d";

/// Lifecycle of the initializer and the protocol it stood up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializerState {
    Uninitialized,
    Running,
    ResetInProgress,
    Fatal,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("consensus engine failed to start: {0}")]
    Start(String),
    #[error("replicated log unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("failed to prepare consensus storage: {0}")]
    Storage(#[from] StorageError),
    #[error("consensus engine failed: {0}")]
    Engine(#[from] EngineError),
    #[error("passive reset failed: {0}")]
    Reset(#[from] ResetError),
}

/// Everything the external engine needs to come up: freshly-opened storage,
/// the local identity and current members from the live membership handle,
/// quorum policy, and the recovery strategy to invoke on detected
/// corruption.
pub struct EngineBootstrap {
    pub local: Peer,
    pub members: Vec<Peer>,
    pub quorum: QuorumPolicy,
    pub storage: ConsensusStorage,
    pub recovery: RecoveryHandle,
}

/// The external replicated-log engine.
#[async_trait]
pub trait ConsensusEngine: Send + Sync {
    /// Start the protocol; resolves once the engine is ready to serve.
    async fn start(&self, bootstrap: EngineBootstrap)
        -> Result<Box<dyn ConsensusHandle>, EngineError>;
}

/// A running replicated-log protocol instance.
#[async_trait]
pub trait ConsensusHandle: Send + Sync {
    fn is_leader(&self) -> bool;

    /// Replicate one command, returning its log index.
    async fn apply(&self, payload: Vec<u8>) -> Result<u64, EngineError>;
}

/// Recovery entry point handed to the engine. Invoking it runs the passive
/// reset under the initializer's state machine: Running → ResetInProgress →
/// Running, or Fatal when the filesystem sequence fails.
#[derive(Clone)]
pub struct RecoveryHandle {
    strategy: PassiveReset,
    state: Arc<Mutex<InitializerState>>,
}

impl RecoveryHandle {
    /// Discard unusable on-disk state and hand back rebuilt stores. The
    /// engine resumes from empty state and resynchronizes from peers.
    pub fn run(&self) -> Result<ConsensusStorage, ResetError> {
        *self.state.lock() = InitializerState::ResetInProgress;
        match self.strategy.reset() {
            Ok(storage) => {
                info!(
                    "event=consensus_reset_complete dir={}",
                    self.strategy.dir().display()
                );
                *self.state.lock() = InitializerState::Running;
                Ok(storage)
            }
            Err(err) => {
                error!("event=consensus_reset_failed err={err}");
                *self.state.lock() = InitializerState::Fatal;
                Err(err)
            }
        }
    }
}

/// Stands up the replicated log on top of a live membership handle.
pub struct ConsensusInitializer {
    dir: PathBuf,
    policy: QuorumPolicy,
    state: Arc<Mutex<InitializerState>>,
}

impl ConsensusInitializer {
    pub fn new(dir: impl Into<PathBuf>, policy: QuorumPolicy) -> Self {
        Self {
            dir: dir.into(),
            policy,
            state: Arc::new(Mutex::new(InitializerState::Uninitialized)),
        }
    }

    pub fn state(&self) -> InitializerState {
        *self.state.lock()
    }

    /// Construct storage (creating the directory if absent) and start the
    /// engine. Blocks until the engine reports ready or fails.
    pub async fn start(
        &self,
        membership: &dyn Membership,
        engine: &dyn ConsensusEngine,
    ) -> Result<RunningConsensus, ConsensusError> {
        let storage = ConsensusStorage::open(&self.dir)?;
        let recovery = RecoveryHandle {
            strategy: PassiveReset::new(&self.dir, SNAPSHOT_RETAIN),
            state: self.state.clone(),
        };
        let members = membership.members();
        info!(
            "event=consensus_start dir={} members={} quorum_minimum={} single_node={}",
            self.dir.display(),
            members.len(),
            self.policy.minimum_nodes,
            self.policy.single_node
        );

        let bootstrap = EngineBootstrap {
            local: membership.local(),
            members,
            quorum: self.policy,
            storage,
            recovery,
        };
        match engine.start(bootstrap).await {
            Ok(handle) => {
                *self.state.lock() = InitializerState::Running;
                Ok(RunningConsensus {
                    handle,
                    state: self.state.clone(),
                })
            }
            Err(err) => {
                *self.state.lock() = InitializerState::Fatal;
                Err(ConsensusError::Engine(err))
            }
        }
    }
}

/// Running protocol instance plus the shared lifecycle state observable by
/// the enclosing process.
pub struct RunningConsensus {
    handle: Box<dyn ConsensusHandle>,
    state: Arc<Mutex<InitializerState>>,
}

impl std::fmt::Debug for RunningConsensus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningConsensus").finish_non_exhaustive()
    }
}

impl RunningConsensus {
    pub fn is_leader(&self) -> bool {
        self.handle.is_leader()
    }

    pub async fn apply(&self, payload: Vec<u8>) -> Result<u64, EngineError> {
        self.handle.apply(payload).await
    }

    pub fn state(&self) -> InitializerState {
        *self.state.lock()
    }
}
