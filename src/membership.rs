//! Capability boundary for the gossip membership layer.
//!
//! The gossip protocol itself (failure detection, dissemination) is an
//! external collaborator: it is constructed elsewhere from a
//! [`GossipKeyring`](crate::keyring::GossipKeyring) and a bind address, and
//! consumed here only through [`Membership`]. The trait object returned by a
//! successful join is the live membership handle handed to the consensus
//! initializer.

use crate::config::Peer;
use async_trait::async_trait;
use std::net::SocketAddr;
use thiserror::Error;

/// How the local agent registers itself when joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    /// Full member, eligible to vote in consensus.
    Voting,
    /// Attach without registering as a writer/voter.
    Observer,
}

#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("none of the {candidates} candidate peers could be contacted")]
    NoPeersReached { candidates: usize },
    #[error("gossip transport error: {0}")]
    Transport(String),
}

/// Live view of the cluster as maintained by the gossip layer.
///
/// `members` must be safe for concurrent readers; the gossip layer is the
/// sole writer of the underlying peer set.
#[async_trait]
pub trait Membership: Send + Sync {
    /// The local agent as registered with the gossip layer.
    fn local(&self) -> Peer;

    /// Current known members, the local agent included.
    fn members(&self) -> Vec<Peer>;

    /// Contact the given addresses and merge into the cluster, returning how
    /// many peers answered.
    async fn join(&self, addrs: &[SocketAddr], mode: JoinMode) -> Result<usize, MembershipError>;
}
