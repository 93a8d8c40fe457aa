use super::{PeerSource, SourceError};
use crate::config::Config;
use crate::credentials::{self, AgentSigner, CredentialsError};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_rustls::rustls::ClientConfig;

/// Wire transport for the secured discovery RPC: asks one cluster endpoint
/// for the peer addresses it currently knows. The RPC protocol itself lives
/// outside this crate; implementations authenticate with the signer and the
/// provided TLS client configuration.
#[async_trait]
pub trait DiscoveryDialer: Send + Sync {
    async fn current_peers(
        &self,
        address: &str,
        signer: &AgentSigner,
        tls: Arc<ClientConfig>,
    ) -> Result<Vec<SocketAddr>, SourceError>;
}

/// Secured peer-to-peer discovery: queries the cluster's discovery endpoint
/// over mutually-authenticated TLS.
///
/// Construction loads the signing seed and TLS credential material and
/// fails when either is absent; the assembler substitutes a no-op source in
/// that case so startup degrades instead of aborting.
#[derive(Clone)]
pub struct SecuredPeers {
    address: String,
    signer: AgentSigner,
    tls: Arc<ClientConfig>,
    dialer: Arc<dyn DiscoveryDialer>,
}

impl std::fmt::Debug for SecuredPeers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecuredPeers")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl SecuredPeers {
    pub fn from_config(
        config: &Config,
        dialer: Arc<dyn DiscoveryDialer>,
    ) -> Result<Self, CredentialsError> {
        let signer = AgentSigner::from_root(&config.root)?;
        let identity = credentials::load_identity(&config.credentials_dir)?;
        let trust = credentials::load_trust(&config.credentials_dir)?;
        let tls = Arc::new(identity.client_config(&trust)?);
        let address = format!("{}:{}", config.server_name, config.p2p_bind.port());
        Ok(Self {
            address,
            signer,
            tls,
            dialer,
        })
    }

    /// Discovery endpoint this source dials.
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl PeerSource for SecuredPeers {
    fn name(&self) -> &'static str {
        "p2p"
    }

    async fn peers(&self) -> Result<Vec<SocketAddr>, SourceError> {
        self.dialer
            .current_peers(&self.address, &self.signer, self.tls.clone())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOverride;
    use tempfile::TempDir;

    struct NeverDialed;

    #[async_trait]
    impl DiscoveryDialer for NeverDialed {
        async fn current_peers(
            &self,
            _address: &str,
            _signer: &AgentSigner,
            _tls: Arc<ClientConfig>,
        ) -> Result<Vec<SocketAddr>, SourceError> {
            panic!("dialer must not be used during construction");
        }
    }

    #[tokio::test]
    async fn construction_fails_without_credentials() {
        let root = TempDir::new().unwrap();
        let config = Config::default()
            .with([ConfigOverride::Root(root.path().to_path_buf())])
            .ensure_defaults();
        let err = SecuredPeers::from_config(&config, Arc::new(NeverDialed)).unwrap_err();
        assert!(matches!(err, CredentialsError::Io { .. }));
    }
}
