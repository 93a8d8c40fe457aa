//! Peer discovery sources and their aggregation.
//!
//! Each mechanism for learning candidate peer addresses (static list,
//! secured peer query, DNS, cloud autoscaling groups) implements
//! [`PeerSource`]. [`assemble`] builds the active set once at startup from
//! configuration flags; a disabled mechanism contributes a no-op source so
//! its absence never blocks aggregation. [`Aggregate`] queries the set with
//! per-source fault isolation.

pub mod aggregate;
pub mod cloud;
pub mod dns;
pub mod p2p;
pub mod snapshot;
pub mod static_peers;

pub use aggregate::{Aggregate, AggregateError, SourceFailure};
pub use cloud::{AutoscalingPeers, InstanceInventory};
pub use dns::DnsPeers;
pub use p2p::{DiscoveryDialer, SecuredPeers};
pub use snapshot::{PeerSnapshot, PeerSnapshotStore, Snapshotter};
pub use static_peers::StaticPeers;

use crate::config::Config;
use async_trait::async_trait;
use log::{info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on any single source query; discovery must never wedge the
/// join loop on one slow backend.
pub const SOURCE_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("inventory backend error: {0}")]
    Inventory(String),
    #[error("discovery dial failed: {0}")]
    Dial(String),
    #[error("peer snapshot unreadable: {0}")]
    Snapshot(#[from] snapshot::SnapshotError),
    #[error("no records resolved: {0}")]
    Unresolved(String),
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
}

/// A mechanism that can produce the current set of candidate peer
/// addresses, or fail.
#[async_trait]
pub trait PeerSource: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Current candidate addresses. Implementations are network-bound and
    /// fallible; callers bound them with [`SOURCE_QUERY_TIMEOUT`].
    async fn peers(&self) -> Result<Vec<SocketAddr>, SourceError>;
}

/// External backends consumed by discovery sources. Both are optional:
/// absence disables the corresponding source.
#[derive(Clone, Default)]
pub struct DiscoveryBackends {
    /// Cloud instance inventory for autoscaling-group discovery.
    pub inventory: Option<Arc<dyn InstanceInventory>>,
    /// Transport for the secured peer-to-peer discovery RPC.
    pub dialer: Option<Arc<dyn DiscoveryDialer>>,
}

/// Build the active source set from configuration flags.
///
/// The secured source requires credential material; when it cannot be
/// constructed, discovery degrades to the remaining sources with a warning
/// rather than failing startup.
pub fn assemble(config: &Config, backends: &DiscoveryBackends) -> Vec<Box<dyn PeerSource>> {
    let mut sources: Vec<Box<dyn PeerSource>> = Vec::new();

    match &backends.dialer {
        Some(dialer) => match SecuredPeers::from_config(config, dialer.clone()) {
            Ok(source) => sources.push(Box::new(source)),
            Err(err) => {
                warn!("event=p2p_discovery_degraded err={err}");
                sources.push(Box::new(StaticPeers::disabled()));
            }
        },
        None => sources.push(Box::new(StaticPeers::disabled())),
    }

    if config.dns_enabled {
        info!("event=dns_discovery_enabled names={}", config.dns_bootstrap.len() + 1);
        let mut names = config.dns_bootstrap.clone();
        names.push(config.server_name.clone());
        sources.push(Box::new(DnsPeers::new(config.p2p_bind.port(), names)));
    } else {
        sources.push(Box::new(StaticPeers::disabled()));
    }

    if config.cloud_enabled {
        match &backends.inventory {
            Some(inventory) => {
                info!(
                    "event=cloud_discovery_enabled groups={}",
                    config.autoscaling_groups.len()
                );
                sources.push(Box::new(AutoscalingPeers::new(
                    config.p2p_bind.port(),
                    config.autoscaling_groups.clone(),
                    inventory.clone(),
                )));
            }
            None => {
                warn!("event=cloud_discovery_degraded reason=no_inventory_backend");
                sources.push(Box::new(StaticPeers::disabled()));
            }
        }
    } else {
        sources.push(Box::new(StaticPeers::disabled()));
    }

    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOverride;
    use crate::credentials::AgentSigner;
    use tempfile::TempDir;
    use tokio_rustls::rustls::ClientConfig;

    struct UnusedDialer;

    #[async_trait]
    impl DiscoveryDialer for UnusedDialer {
        async fn current_peers(
            &self,
            _address: &str,
            _signer: &AgentSigner,
            _tls: Arc<ClientConfig>,
        ) -> Result<Vec<SocketAddr>, SourceError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn everything_disabled_yields_noop_sources() {
        let sources = assemble(&Config::default(), &DiscoveryBackends::default());
        assert_eq!(sources.len(), 3);
        assert!(sources.iter().all(|source| source.name() == "noop"));
    }

    #[test]
    fn missing_credentials_degrade_p2p_to_noop() {
        let root = TempDir::new().unwrap();
        let config = Config::default()
            .with([ConfigOverride::Root(root.path().to_path_buf())])
            .ensure_defaults();
        let backends = DiscoveryBackends {
            inventory: None,
            dialer: Some(Arc::new(UnusedDialer)),
        };
        let sources = assemble(&config, &backends);
        assert_eq!(sources[0].name(), "noop");
    }

    #[test]
    fn dns_flag_activates_the_dns_source() {
        let config = Config::default().with([ConfigOverride::DnsDiscovery(true)]);
        let sources = assemble(&config, &DiscoveryBackends::default());
        assert_eq!(sources[1].name(), "dns");
    }

    #[test]
    fn cloud_flag_without_backend_degrades_to_noop() {
        let config = Config::default().with([ConfigOverride::CloudDiscovery(true)]);
        let sources = assemble(&config, &DiscoveryBackends::default());
        assert_eq!(sources[2].name(), "noop");
    }
}
