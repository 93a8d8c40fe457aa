//! Cluster join: bounded discovery+join cycles against an existing cluster.
//!
//! Candidate order within a cycle is deterministic (configured static
//! addresses, then the persisted peer snapshot, then live discovery) so the
//! common restart case, where a static or snapshot peer is still alive,
//! joins without waiting on network discovery.

use crate::config::{Config, QuorumPolicy};
use crate::discovery::{Aggregate, PeerSnapshotStore};
use crate::membership::{JoinMode, Membership, MembershipError};
use crate::util::retry::RetryPolicy;
use log::{info, warn};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::sleep;

/// Base delay between join cycles; grows exponentially with jitter.
pub const JOIN_BACKOFF_BASE: Duration = Duration::from_secs(1);
/// Ceiling on the delay between join cycles.
pub const JOIN_BACKOFF_MAX: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("cluster unreachable: {attempts} join attempts exhausted with no reachable peer")]
    ClusterUnreachable { attempts: usize },
    #[error("join canceled by shutdown signal")]
    Canceled,
}

/// How the agent ended up a cluster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Joined an existing cluster through `contacted` reachable peers.
    Joined { contacted: usize },
    /// No peers were reachable and quorum policy permits operating alone;
    /// the agent forms a brand-new single-member cluster.
    Bootstrapped,
}

/// Attempts to join an existing cluster within a configurable budget of
/// full discovery+join cycles.
pub struct ClusterJoiner {
    static_peers: Vec<SocketAddr>,
    snapshot: PeerSnapshotStore,
    discovery: Aggregate,
    policy: QuorumPolicy,
    retry: RetryPolicy,
    read_only: bool,
}

impl ClusterJoiner {
    pub fn new(
        static_peers: Vec<SocketAddr>,
        snapshot: PeerSnapshotStore,
        discovery: Aggregate,
        policy: QuorumPolicy,
        attempts: usize,
    ) -> Self {
        Self {
            static_peers,
            snapshot,
            discovery,
            policy,
            retry: RetryPolicy::exponential(attempts, JOIN_BACKOFF_BASE)
                .with_max_delay(JOIN_BACKOFF_MAX)
                .with_jitter(0.2),
            read_only: false,
        }
    }

    /// Wire the joiner from agent configuration plus an assembled discovery
    /// aggregate.
    pub fn from_config(config: &Config, snapshot: PeerSnapshotStore, discovery: Aggregate) -> Self {
        Self::new(
            config.static_peers.clone(),
            snapshot,
            discovery,
            config.quorum_policy(),
            config.bootstrap.attempts,
        )
        .read_only(config.bootstrap.read_only)
    }

    /// Attach as an observer instead of registering as a voter.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Replace the backoff schedule; tests tighten it.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run join cycles until one succeeds, the budget is spent, or the
    /// shutdown signal flips.
    pub async fn join(
        &self,
        membership: &dyn Membership,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<JoinOutcome, JoinError> {
        let mode = if self.read_only {
            JoinMode::Observer
        } else {
            JoinMode::Voting
        };
        let mut retry = self.retry.handle();

        loop {
            if *shutdown.borrow() {
                return Err(JoinError::Canceled);
            }

            let candidates = self.candidates().await;
            if candidates.is_empty() {
                if self.policy.single_node {
                    info!("event=cluster_bootstrap reason=no_candidates single_node=true");
                    return Ok(JoinOutcome::Bootstrapped);
                }
                warn!("event=cluster_join_retry reason=no_candidates");
            } else {
                match membership.join(&candidates, mode).await {
                    Ok(contacted) if contacted > 0 => {
                        info!(
                            "event=cluster_join_ok contacted={contacted} candidates={} cycle={}",
                            candidates.len(),
                            retry.cycles()
                        );
                        return Ok(JoinOutcome::Joined { contacted });
                    }
                    Ok(_) => warn!(
                        "event=cluster_join_retry reason=no_peers_reached candidates={}",
                        candidates.len()
                    ),
                    Err(MembershipError::NoPeersReached { candidates }) => {
                        warn!("event=cluster_join_retry reason=no_peers_reached candidates={candidates}")
                    }
                    Err(err) => warn!("event=cluster_join_retry reason=membership err={err}"),
                }
            }

            match retry.next_delay() {
                Some(delay) => {
                    tokio::select! {
                        _ = sleep(delay) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                return Err(JoinError::Canceled);
                            }
                        }
                    }
                }
                None => {
                    return if self.policy.single_node {
                        info!("event=cluster_bootstrap reason=attempts_exhausted single_node=true");
                        Ok(JoinOutcome::Bootstrapped)
                    } else {
                        Err(JoinError::ClusterUnreachable {
                            attempts: retry.cycles(),
                        })
                    };
                }
            }
        }
    }

    /// One cycle's candidate list: static, then snapshot, then discovery,
    /// deduplicated with first occurrence winning.
    async fn candidates(&self) -> Vec<SocketAddr> {
        let mut ordered = self.static_peers.clone();

        match self.snapshot.load_or_default() {
            Ok(snapshot) => ordered.extend(snapshot.peers),
            Err(err) => warn!(
                "event=peer_snapshot_unreadable path={} err={err}",
                self.snapshot.path().display()
            ),
        }

        match self.discovery.discover().await {
            Ok(addrs) => ordered.extend(addrs),
            Err(err) => warn!("event=discovery_cycle_failed err={err}"),
        }

        let mut seen = HashSet::with_capacity(ordered.len());
        ordered.retain(|addr| seen.insert(*addr));
        ordered
    }
}
