use super::{PeerSource, SourceError};
use async_trait::async_trait;
use log::debug;
use std::net::SocketAddr;
use tokio::net::lookup_host;

/// Resolves configured bootstrap names to peer addresses, forcing the
/// cluster's p2p port onto every resolved address.
#[derive(Debug, Clone)]
pub struct DnsPeers {
    port: u16,
    names: Vec<String>,
}

impl DnsPeers {
    pub fn new(port: u16, names: impl Into<Vec<String>>) -> Self {
        Self {
            port,
            names: names.into(),
        }
    }
}

#[async_trait]
impl PeerSource for DnsPeers {
    fn name(&self) -> &'static str {
        "dns"
    }

    async fn peers(&self) -> Result<Vec<SocketAddr>, SourceError> {
        let mut resolved = Vec::new();
        let mut failures = Vec::new();
        for name in &self.names {
            match lookup_host((name.as_str(), self.port)).await {
                Ok(addrs) => resolved.extend(addrs),
                Err(err) => {
                    debug!("event=dns_lookup_failed name={name} err={err}");
                    failures.push(format!("{name}: {err}"));
                }
            }
        }
        // A partially-failing record set is still usable; only a cycle where
        // nothing resolved counts as a source failure.
        if resolved.is_empty() && !failures.is_empty() {
            return Err(SourceError::Unresolved(failures.join("; ")));
        }
        Ok(resolved)
    }
}
