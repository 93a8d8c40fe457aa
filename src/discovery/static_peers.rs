use super::{PeerSource, SourceError};
use async_trait::async_trait;
use std::net::SocketAddr;

/// Fixed peer addresses from configuration. Also serves as the no-op
/// substitute for a disabled or degraded mechanism: an empty set that never
/// errors, so aggregation is never blocked by an absent source.
#[derive(Debug, Clone)]
pub struct StaticPeers {
    name: &'static str,
    addrs: Vec<SocketAddr>,
}

impl StaticPeers {
    pub fn new(addrs: impl Into<Vec<SocketAddr>>) -> Self {
        Self {
            name: "static",
            addrs: addrs.into(),
        }
    }

    /// The no-op source standing in for a disabled mechanism.
    pub fn disabled() -> Self {
        Self {
            name: "noop",
            addrs: Vec::new(),
        }
    }
}

#[async_trait]
impl PeerSource for StaticPeers {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn peers(&self) -> Result<Vec<SocketAddr>, SourceError> {
        Ok(self.addrs.clone())
    }
}
