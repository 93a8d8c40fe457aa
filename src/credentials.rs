//! Credential material for the secured discovery plane.
//!
//! Credential issuance and rotation happen outside this crate; this module
//! only loads what an issuer has already placed in the credentials
//! directory: a PEM identity (`agent.crt`/`agent.key`), a trust bundle
//! (`ca.crt`), and the agent signing seed (`agent.seed`) used to
//! authenticate outbound discovery RPCs. Every loader is fallible; the
//! discovery assembler degrades to a no-op source when material is missing.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_rustls::rustls::{
    self, Certificate, ClientConfig, PrivateKey, RootCertStore, ServerConfig,
};
use tokio_rustls::rustls::server::AllowAnyAuthenticatedClient;

pub const AGENT_CERT_FILE: &str = "agent.crt";
pub const AGENT_KEY_FILE: &str = "agent.key";
pub const TRUST_BUNDLE_FILE: &str = "ca.crt";
pub const AGENT_SEED_FILE: &str = "agent.seed";

/// Minimum bytes of seed material accepted for the agent signer.
pub const MIN_SEED_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("I/O error reading {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("credential material malformed: {0}")]
    Malformed(String),
    #[error("TLS configuration rejected: {0}")]
    Tls(#[from] rustls::Error),
}

fn io_err(path: &Path, source: io::Error) -> CredentialsError {
    CredentialsError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Local TLS identity presented on the discovery plane.
#[derive(Clone, Debug)]
pub struct TlsIdentity {
    pub chain: Vec<Certificate>,
    pub private_key: PrivateKey,
}

/// Roots trusted when dialing peers.
#[derive(Clone, Debug)]
pub struct TrustStore {
    pub roots: RootCertStore,
}

impl TlsIdentity {
    /// Client-side TLS for outbound discovery dials, authenticating with the
    /// agent certificate.
    pub fn client_config(&self, trust: &TrustStore) -> Result<ClientConfig, CredentialsError> {
        ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(trust.roots.clone())
            .with_client_auth_cert(self.chain.clone(), self.private_key.clone())
            .map_err(CredentialsError::from)
    }

    /// Server-side TLS requiring client certificates from the same trust
    /// domain.
    pub fn server_config(&self, trust: &TrustStore) -> Result<ServerConfig, CredentialsError> {
        let verifier = Arc::new(AllowAnyAuthenticatedClient::new(trust.roots.clone()));
        ServerConfig::builder()
            .with_safe_defaults()
            .with_client_cert_verifier(verifier)
            .with_single_cert(self.chain.clone(), self.private_key.clone())
            .map_err(CredentialsError::from)
    }
}

/// Load `agent.crt`/`agent.key` from the credentials directory.
pub fn load_identity(dir: &Path) -> Result<TlsIdentity, CredentialsError> {
    let cert_path = dir.join(AGENT_CERT_FILE);
    let chain = load_cert_chain(&cert_path)?;
    if chain.is_empty() {
        return Err(CredentialsError::Malformed(format!(
            "{} holds no certificates",
            cert_path.display()
        )));
    }
    let private_key = load_private_key(&dir.join(AGENT_KEY_FILE))?;
    Ok(TlsIdentity { chain, private_key })
}

/// Load the `ca.crt` trust bundle from the credentials directory.
pub fn load_trust(dir: &Path) -> Result<TrustStore, CredentialsError> {
    let path = dir.join(TRUST_BUNDLE_FILE);
    let file = File::open(&path).map_err(|err| io_err(&path, err))?;
    let mut reader = BufReader::new(file);
    let raw = rustls_pemfile::certs(&mut reader)
        .map_err(|_| CredentialsError::Malformed(format!("{} is not PEM", path.display())))?;
    if raw.is_empty() {
        return Err(CredentialsError::Malformed(format!(
            "{} holds no certificates",
            path.display()
        )));
    }
    let mut roots = RootCertStore::empty();
    let (added, _skipped) = roots.add_parsable_certificates(&raw);
    if added == 0 {
        return Err(CredentialsError::Malformed(format!(
            "no parsable certificates in {}",
            path.display()
        )));
    }
    Ok(TrustStore { roots })
}

/// Signing identity used to authenticate outbound discovery RPCs.
///
/// Holds the raw seed for the transport layer to key its request digests;
/// only the fingerprint is ever logged or advertised.
#[derive(Clone)]
pub struct AgentSigner {
    seed: Vec<u8>,
    fingerprint: String,
}

impl AgentSigner {
    /// Load the signing seed from `<root>/agent.seed`.
    pub fn from_root(root: &Path) -> Result<Self, CredentialsError> {
        let path = root.join(AGENT_SEED_FILE);
        let seed = std::fs::read(&path).map_err(|err| io_err(&path, err))?;
        if seed.len() < MIN_SEED_LEN {
            return Err(CredentialsError::Malformed(format!(
                "{} holds {} bytes of seed material, need at least {MIN_SEED_LEN}",
                path.display(),
                seed.len()
            )));
        }
        let fingerprint = hex::encode(Sha256::digest(&seed));
        Ok(Self { seed, fingerprint })
    }

    /// Stable public identifier for this signer.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Seed material for the transport's request authenticator.
    pub fn seed(&self) -> &[u8] {
        &self.seed
    }
}

impl fmt::Debug for AgentSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSigner")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

fn load_cert_chain(path: &Path) -> Result<Vec<Certificate>, CredentialsError> {
    let file = File::open(path).map_err(|err| io_err(path, err))?;
    let mut reader = BufReader::new(file);
    let raw = rustls_pemfile::certs(&mut reader).map_err(|_| {
        CredentialsError::Malformed(format!("invalid certificate chain in {}", path.display()))
    })?;
    Ok(raw.into_iter().map(Certificate).collect())
}

fn load_private_key(path: &Path) -> Result<PrivateKey, CredentialsError> {
    let pem = std::fs::read(path).map_err(|err| io_err(path, err))?;

    let mut reader = Cursor::new(&pem);
    if let Some(key) = rustls_pemfile::pkcs8_private_keys(&mut reader)
        .map_err(|_| CredentialsError::Malformed("invalid PKCS#8 key".into()))?
        .into_iter()
        .next()
    {
        return Ok(PrivateKey(key));
    }

    let mut reader = Cursor::new(&pem);
    if let Some(key) = rustls_pemfile::rsa_private_keys(&mut reader)
        .map_err(|_| CredentialsError::Malformed("invalid RSA key".into()))?
        .into_iter()
        .next()
    {
        return Ok(PrivateKey(key));
    }

    let mut reader = Cursor::new(&pem);
    if let Some(key) = rustls_pemfile::ec_private_keys(&mut reader)
        .map_err(|_| CredentialsError::Malformed("invalid SEC1 EC key".into()))?
        .into_iter()
        .next()
    {
        return Ok(PrivateKey(key));
    }

    Err(CredentialsError::Malformed(format!(
        "{} holds no supported private key (expected PKCS#8, PKCS#1 RSA, or SEC1 EC)",
        path.display()
    )))
}
