//! Bootstrap layer for a clustered agent.
//!
//! The pieces compose in dependency order: [`keyring::derive_keyring`]
//! turns operator-configured cluster tokens into the symmetric keys the
//! gossip layer encrypts with; the gossip layer (an external collaborator
//! behind [`membership::Membership`]) comes up on those keys; discovery
//! sources feed the [`join::ClusterJoiner`], which produces a live
//! membership view; that view is the sole input to the
//! [`consensus::ConsensusInitializer`], which stands up the replicated log
//! with crash recovery via passive reset.
//!
//! ```no_run
//! # use muster::*;
//! # use std::sync::Arc;
//! # async fn bring_up(
//! #     membership: Arc<dyn Membership>,
//! #     engine: Box<dyn ConsensusEngine>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default()
//!     .with([
//!         ConfigOverride::Root("/var/lib/agent".into()),
//!         ConfigOverride::ClusterTokens(vec!["current-token".into()]),
//!         ConfigOverride::MinimumNodes(3),
//!     ])
//!     .ensure_defaults();
//!
//! let keyring = derive_keyring(&config.cluster_tokens, &config.server_name)?;
//! // ... hand `keyring` to the gossip layer, obtaining `membership` ...
//! # let _ = keyring;
//!
//! let (shutdown_tx, mut shutdown) = tokio::sync::watch::channel(false);
//! let outcome = join_cluster(
//!     &config,
//!     membership.as_ref(),
//!     &DiscoveryBackends::default(),
//!     &mut shutdown,
//! )
//! .await?;
//!
//! let running = start_consensus(&config, membership.as_ref(), engine.as_ref()).await?;
//! # let _ = (outcome, running, shutdown_tx);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod consensus;
pub mod credentials;
pub mod discovery;
pub mod join;
pub mod keyring;
pub mod membership;
pub mod util;

pub use config::{
    BootstrapBudget, Config, ConfigOverride, Peer, PeerRole, QuorumPolicy, DEFAULT_MINIMUM_NODES,
    DEFAULT_P2P_PORT, DEFAULT_SNAPSHOT_FREQUENCY,
};
pub use consensus::{
    ConsensusEngine, ConsensusError, ConsensusHandle, ConsensusInitializer, ConsensusStorage,
    EngineBootstrap, EngineError, InitializerState, PassiveReset, RecoveryHandle, ResetError,
    RunningConsensus, CONSENSUS_DIR, SNAPSHOT_RETAIN,
};
pub use credentials::{AgentSigner, CredentialsError, TlsIdentity, TrustStore};
pub use discovery::{
    assemble, Aggregate, AggregateError, AutoscalingPeers, DiscoveryBackends, DiscoveryDialer,
    DnsPeers, InstanceInventory, PeerSnapshot, PeerSnapshotStore, PeerSource, SecuredPeers,
    Snapshotter, SourceError, StaticPeers,
};
pub use join::{ClusterJoiner, JoinError, JoinOutcome};
pub use keyring::{derive_keyring, GossipKeyring, KeyringError};
pub use membership::{JoinMode, Membership, MembershipError};

use tokio::sync::watch;

/// Join an existing cluster (or bootstrap a new one when quorum policy
/// permits), assembling discovery sources from configuration.
///
/// On success the passed membership handle is live; spawn a
/// [`Snapshotter`] against it so the next restart has a bootstrap set even
/// if discovery is down.
pub async fn join_cluster(
    config: &Config,
    membership: &dyn Membership,
    backends: &DiscoveryBackends,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<JoinOutcome, JoinError> {
    let sources = discovery::assemble(config, backends);
    let snapshot = PeerSnapshotStore::in_root(&config.root);
    let joiner = ClusterJoiner::from_config(config, snapshot, Aggregate::new(sources));
    joiner.join(membership, shutdown).await
}

/// Stand up the replicated log on a live membership handle.
pub async fn start_consensus(
    config: &Config,
    membership: &dyn Membership,
    engine: &dyn ConsensusEngine,
) -> Result<RunningConsensus, ConsensusError> {
    let initializer = ConsensusInitializer::new(
        config.root.join(CONSENSUS_DIR),
        config.quorum_policy(),
    );
    initializer.start(membership, engine).await
}
