//! Agent configuration and identity types.
//!
//! Configuration is an immutable value: defaults come from [`Config::default`],
//! and deployments customize it by applying a finite set of named
//! [`ConfigOverride`]s through [`Config::with`], which returns a new value.
//! Nothing mutates a configuration in place after process start.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Default port for the peer-to-peer gossip/discovery plane.
pub const DEFAULT_P2P_PORT: u16 = 2001;
/// Default minimum voting members required to form a working cluster.
pub const DEFAULT_MINIMUM_NODES: usize = 3;
/// Default cadence for the background peer snapshotter.
pub const DEFAULT_SNAPSHOT_FREQUENCY: Duration = Duration::from_secs(3600);
/// Subdirectory of the agent root holding TLS credential material.
pub const CREDENTIALS_DIR: &str = "credentials";

/// Distinguishes a voting cluster member from a read-only observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerRole {
    Voter,
    Observer,
}

/// A cluster member: configured local identity or a discovered remote.
///
/// Identity is the advertised address; two peers with the same address and
/// port are the same peer regardless of name or role.
#[derive(Debug, Clone)]
pub struct Peer {
    pub name: String,
    pub addr: SocketAddr,
    pub role: PeerRole,
}

impl Peer {
    pub fn new(name: impl Into<String>, addr: SocketAddr) -> Self {
        Self {
            name: name.into(),
            addr,
            role: PeerRole::Voter,
        }
    }

    pub fn observer(name: impl Into<String>, addr: SocketAddr) -> Self {
        Self {
            name: name.into(),
            addr,
            role: PeerRole::Observer,
        }
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for Peer {}

impl Hash for Peer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

/// Join/bootstrap budget for the cluster joiner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapBudget {
    /// Full discovery+join cycles to attempt before giving up.
    pub attempts: usize,
    /// Attach to the cluster without registering as a voter.
    pub read_only: bool,
}

impl Default for BootstrapBudget {
    fn default() -> Self {
        Self {
            attempts: usize::MAX,
            read_only: false,
        }
    }
}

/// Agent process configuration, fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Node name advertised to the cluster.
    pub name: String,
    /// Logical cluster/server name; DNS discovery target and keyring fallback.
    pub server_name: String,
    /// Root directory for long-term state (consensus storage, snapshots).
    pub root: PathBuf,
    /// Directory holding TLS credential material; defaults under `root`.
    pub credentials_dir: PathBuf,
    /// Shared cluster tokens, newest first. The first is the active gossip
    /// encryption key; the rest are retained for rotation.
    pub cluster_tokens: Vec<String>,
    pub minimum_nodes: usize,
    pub snapshot_frequency: Duration,
    pub bootstrap: BootstrapBudget,
    /// Address the gossip plane binds to.
    pub p2p_bind: SocketAddr,
    /// Address advertised to peers; defaults to the bind address.
    pub p2p_advertised: Option<SocketAddr>,
    /// Explicit peer addresses tried before any live discovery.
    pub static_peers: Vec<SocketAddr>,
    /// Additional DNS names queried by DNS discovery.
    pub dns_bootstrap: Vec<String>,
    pub dns_enabled: bool,
    /// Autoscaling group names queried by cloud discovery.
    pub autoscaling_groups: Vec<String>,
    pub cloud_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "localhost".to_string(),
            server_name: "localhost".to_string(),
            root: PathBuf::new(),
            credentials_dir: PathBuf::new(),
            cluster_tokens: Vec::new(),
            minimum_nodes: DEFAULT_MINIMUM_NODES,
            snapshot_frequency: DEFAULT_SNAPSHOT_FREQUENCY,
            bootstrap: BootstrapBudget::default(),
            p2p_bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_P2P_PORT),
            p2p_advertised: None,
            static_peers: Vec::new(),
            dns_bootstrap: Vec::new(),
            dns_enabled: false,
            autoscaling_groups: Vec::new(),
            cloud_enabled: false,
        }
    }
}

/// Named configuration overrides. This is the whole vocabulary: there is no
/// open-ended mutation hook.
#[derive(Debug, Clone)]
pub enum ConfigOverride {
    Name(String),
    ServerName(String),
    Root(PathBuf),
    CredentialsDir(PathBuf),
    ClusterTokens(Vec<String>),
    MinimumNodes(usize),
    SnapshotFrequency(Duration),
    BootstrapAttempts(usize),
    ReadOnly(bool),
    Bind(SocketAddr),
    Advertised(SocketAddr),
    StaticPeers(Vec<SocketAddr>),
    DnsBootstrap(Vec<String>),
    DnsDiscovery(bool),
    AutoscalingGroups(Vec<String>),
    CloudDiscovery(bool),
}

impl Config {
    /// Apply overrides, returning the resulting configuration. The receiver
    /// is consumed; callers keeping the original clone first.
    pub fn with(self, overrides: impl IntoIterator<Item = ConfigOverride>) -> Self {
        let mut config = self;
        for value in overrides {
            match value {
                ConfigOverride::Name(name) => config.name = name,
                ConfigOverride::ServerName(name) => config.server_name = name,
                ConfigOverride::Root(root) => config.root = root,
                ConfigOverride::CredentialsDir(dir) => config.credentials_dir = dir,
                ConfigOverride::ClusterTokens(tokens) => config.cluster_tokens = tokens,
                ConfigOverride::MinimumNodes(n) => config.minimum_nodes = n,
                ConfigOverride::SnapshotFrequency(frequency) => {
                    config.snapshot_frequency = frequency
                }
                ConfigOverride::BootstrapAttempts(attempts) => {
                    config.bootstrap.attempts = attempts
                }
                ConfigOverride::ReadOnly(read_only) => config.bootstrap.read_only = read_only,
                ConfigOverride::Bind(addr) => config.p2p_bind = addr,
                ConfigOverride::Advertised(addr) => config.p2p_advertised = Some(addr),
                ConfigOverride::StaticPeers(addrs) => config.static_peers = addrs,
                ConfigOverride::DnsBootstrap(names) => config.dns_bootstrap = names,
                ConfigOverride::DnsDiscovery(enabled) => config.dns_enabled = enabled,
                ConfigOverride::AutoscalingGroups(groups) => {
                    config.autoscaling_groups = groups
                }
                ConfigOverride::CloudDiscovery(enabled) => config.cloud_enabled = enabled,
            }
        }
        config
    }

    /// Fill derived defaults left empty by the operator: the advertised
    /// address falls back to the bind address, the credentials directory to
    /// `<root>/credentials`.
    pub fn ensure_defaults(self) -> Self {
        let mut config = self;
        if config.p2p_advertised.is_none() {
            config.p2p_advertised = Some(config.p2p_bind);
        }
        if config.credentials_dir.as_os_str().is_empty() {
            config.credentials_dir = config.root.join(CREDENTIALS_DIR);
        }
        config
    }

    /// Copy safe to log or echo in diagnostics: cluster tokens are cleared.
    pub fn sanitized(&self) -> Self {
        let mut dup = self.clone();
        dup.cluster_tokens = Vec::new();
        dup
    }

    /// The local agent's identity as seen by the rest of the cluster.
    pub fn local_peer(&self) -> Peer {
        let addr = self.p2p_advertised.unwrap_or(self.p2p_bind);
        if self.bootstrap.read_only {
            Peer::observer(self.name.clone(), addr)
        } else {
            Peer::new(self.name.clone(), addr)
        }
    }

    pub fn quorum_policy(&self) -> QuorumPolicy {
        QuorumPolicy::from_minimum(self.minimum_nodes)
    }
}

/// Minimum node count for a working cluster, computed once at consensus
/// startup. A change requires a fresh initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuorumPolicy {
    pub minimum_nodes: usize,
    /// Degenerate clusters of at most one node may operate alone.
    pub single_node: bool,
}

impl QuorumPolicy {
    pub fn from_minimum(minimum_nodes: usize) -> Self {
        Self {
            minimum_nodes,
            single_node: minimum_nodes <= 1,
        }
    }
}

/// Stable hash of a peer set, useful for change detection in logs.
pub fn peer_set_digest(peers: &[Peer]) -> u64 {
    let mut sorted: Vec<_> = peers.iter().map(|p| p.addr).collect();
    sorted.sort();
    let mut hasher = DefaultHasher::new();
    sorted.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn overrides_produce_new_value() {
        let base = Config::default();
        let derived = base.clone().with([
            ConfigOverride::Name("agent-1".into()),
            ConfigOverride::MinimumNodes(5),
            ConfigOverride::ReadOnly(true),
        ]);
        assert_eq!(derived.name, "agent-1");
        assert_eq!(derived.minimum_nodes, 5);
        assert!(derived.bootstrap.read_only);
        assert_eq!(base.name, "localhost");
        assert_eq!(base.minimum_nodes, DEFAULT_MINIMUM_NODES);
    }

    #[test]
    fn ensure_defaults_fills_advertised_and_credentials() {
        let config = Config::default()
            .with([
                ConfigOverride::Root(PathBuf::from("/var/lib/agent")),
                ConfigOverride::Bind(addr("10.0.0.7:4004")),
            ])
            .ensure_defaults();
        assert_eq!(config.p2p_advertised, Some(addr("10.0.0.7:4004")));
        assert_eq!(
            config.credentials_dir,
            PathBuf::from("/var/lib/agent/credentials")
        );
    }

    #[test]
    fn ensure_defaults_keeps_explicit_values() {
        let config = Config::default()
            .with([
                ConfigOverride::Advertised(addr("192.168.1.4:9000")),
                ConfigOverride::CredentialsDir(PathBuf::from("/etc/agent/keys")),
            ])
            .ensure_defaults();
        assert_eq!(config.p2p_advertised, Some(addr("192.168.1.4:9000")));
        assert_eq!(config.credentials_dir, PathBuf::from("/etc/agent/keys"));
    }

    #[test]
    fn sanitized_clears_tokens_only() {
        let config = Config::default().with([
            ConfigOverride::ClusterTokens(vec!["secret".into()]),
            ConfigOverride::Name("agent-2".into()),
        ]);
        let scrubbed = config.sanitized();
        assert!(scrubbed.cluster_tokens.is_empty());
        assert_eq!(scrubbed.name, "agent-2");
        assert_eq!(config.cluster_tokens, vec!["secret".to_string()]);
    }

    #[test]
    fn quorum_policy_single_node_boundary() {
        assert!(QuorumPolicy::from_minimum(0).single_node);
        assert!(QuorumPolicy::from_minimum(1).single_node);
        assert!(!QuorumPolicy::from_minimum(2).single_node);
        assert_eq!(QuorumPolicy::from_minimum(3).minimum_nodes, 3);
    }

    #[test]
    fn peer_equality_is_by_address() {
        let a = Peer::new("alpha", addr("10.0.0.1:2001"));
        let b = Peer::observer("beta", addr("10.0.0.1:2001"));
        let c = Peer::new("alpha", addr("10.0.0.2:2001"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn local_peer_reflects_read_only_mode() {
        let config = Config::default()
            .with([ConfigOverride::ReadOnly(true)])
            .ensure_defaults();
        assert_eq!(config.local_peer().role, PeerRole::Observer);
    }
}
